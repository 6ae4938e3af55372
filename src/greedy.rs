use ordered_float::OrderedFloat;

use crate::decoder::{Decoder, DecoderConfig};
use crate::error::DecodeError;
use crate::hypothesis::{Arena, Hypothesis};
use crate::model::LanguageModel;
use crate::output::{Derivation, Translation};
use crate::tm::TranslationModel;

/// Left-to-right decoder that commits to the best next phrase at each
/// step. Much faster than [`crate::StackDecoder`], and never reorders.
pub struct GreedyDecoder<'m, T, L> {
    tm: &'m T,
    lm: &'m L,
    /// Phrases tried per source span
    max_candidates_per_span: usize,
}

impl<'m, T, L> GreedyDecoder<'m, T, L>
where
    T: TranslationModel,
    L: LanguageModel,
{
    /// Only `max_candidates_per_span` is used from `config`.
    pub fn new(tm: &'m T, lm: &'m L, config: DecoderConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            tm,
            lm,
            max_candidates_per_span: config.max_candidates_per_span,
        })
    }

    pub fn search(&self, sentence: &[String]) -> Result<Derivation<'m, L::State>, DecodeError> {
        let tm: &'m T = self.tm;
        let len = sentence.len();
        let mut arena = Arena::new();
        let mut current = arena.push(Hypothesis::initial(self.lm.begin(), len));
        let mut position = 0;
        while position < len {
            let mut best: Option<Hypothesis<'m, L::State>> = None;
            for end in position + 1..=len {
                let phrases = tm.phrases(&sentence[position..end]);
                for phrase in phrases.iter().take(self.max_candidates_per_span) {
                    let next = arena[current].extend(current, self.lm, phrase, position, end);
                    let better = match &best {
                        Some(b) => OrderedFloat(next.logprob) > OrderedFloat(b.logprob),
                        None => true,
                    };
                    if better {
                        best = Some(next);
                    }
                }
            }
            let best = best.ok_or(DecodeError::NoCompleteTranslation { length: len })?;
            position = best.frontier + 1;
            current = arena.push(best);
        }
        Ok(Derivation::new(arena, current))
    }
}

impl<'m, T, L> Decoder for GreedyDecoder<'m, T, L>
where
    T: TranslationModel,
    L: LanguageModel,
{
    fn decode(&self, sentence: &[String]) -> Result<Translation, DecodeError> {
        self.search(sentence).map(|derivation| derivation.translation())
    }
}
