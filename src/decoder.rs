use log::debug;
use rayon::prelude::*;

use crate::error::DecodeError;
use crate::hypothesis::{Arena, Coverage, Hypothesis, HypothesisId};
use crate::model::LanguageModel;
use crate::output::{Derivation, Translation};
use crate::stack::{Recombination, Stack};
use crate::tm::TranslationModel;

/// Search limits shared by the decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Hypotheses expanded per stack
    pub beam_width: usize,
    /// Widest source span translated in one step. 0 allows no
    /// reordering: each step starts at the first untranslated word.
    pub distortion_limit: usize,
    /// Phrases tried per source span
    pub max_candidates_per_span: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_width: 1,
            distortion_limit: 6,
            max_candidates_per_span: 1,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.beam_width == 0 {
            return Err(DecodeError::InvalidConfig {
                reason: "beam width must be at least 1".to_string(),
            });
        }
        if self.max_candidates_per_span == 0 {
            return Err(DecodeError::InvalidConfig {
                reason: "at least one candidate per span is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Translate one tokenized sentence.
pub trait Decoder {
    fn decode(&self, sentence: &[String]) -> Result<Translation, DecodeError>;
}

/// Decode `sentences` in parallel, keeping their order.
pub fn decode_all<D>(
    decoder: &D,
    sentences: &[Vec<String>],
) -> Vec<Result<Translation, DecodeError>>
where
    D: Decoder + Sync,
{
    sentences
        .par_iter()
        .map(|sentence| decoder.decode(sentence))
        .collect()
}

/// Beam search over stacks of partial translations, one stack per
/// number of translated source words.
///
/// Hypotheses are ranked by their score so far only, with no estimate of
/// the cost of the words left to translate.
pub struct StackDecoder<'m, T, L> {
    tm: &'m T,
    lm: &'m L,
    config: DecoderConfig,
}

impl<'m, T, L> StackDecoder<'m, T, L>
where
    T: TranslationModel,
    L: LanguageModel,
{
    pub fn new(tm: &'m T, lm: &'m L, config: DecoderConfig) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self { tm, lm, config })
    }

    /// Find the best scoring translation of `sentence` reachable within
    /// the beam.
    pub fn search(&self, sentence: &[String]) -> Result<Derivation<'m, L::State>, DecodeError> {
        let len = sentence.len();
        let mut arena = Arena::new();
        let mut stacks: Vec<Stack<L::State>> = (0..=len).map(|_| Stack::new()).collect();
        stacks[0].insert(&mut arena, Hypothesis::initial(self.lm.begin(), len));

        for i in 0..=len {
            // Stack i is final here: expansions only add to larger stacks
            let beam = stacks[i].beam(&arena, self.config.beam_width);
            debug!(
                "Stack {}: expanding {} of {} hypotheses ({} recombined)",
                i,
                beam.len(),
                stacks[i].len(),
                stacks[i].recombined()
            );
            let mut discarded = 0;
            for id in beam {
                discarded += self.expand(sentence, id, &mut arena, &mut stacks);
            }
            debug!("Stack {}: {} expansions discarded by recombination", i, discarded);
        }

        let winner = stacks[len]
            .best(&arena)
            .ok_or(DecodeError::NoCompleteTranslation { length: len })?;
        debug!(
            "Best of {} complete hypotheses: {} ({} created)",
            stacks[len].len(),
            arena[winner].logprob,
            arena.len()
        );
        Ok(Derivation::new(arena, winner))
    }

    /// Push every extension of `id` onto its stack. Returns the number of
    /// extensions that lost to a stored hypothesis.
    fn expand(
        &self,
        sentence: &[String],
        id: HypothesisId,
        arena: &mut Arena<'m, L::State>,
        stacks: &mut [Stack<L::State>],
    ) -> usize {
        let tm: &'m T = self.tm;
        let mut discarded = 0;
        for (start, end) in self.spans(&arena[id].coverage) {
            let phrases = tm.phrases(&sentence[start..end]);
            for phrase in phrases.iter().take(self.config.max_candidates_per_span) {
                let hypothesis = arena[id].extend(id, self.lm, phrase, start, end);
                let covered = hypothesis.coverage.count();
                if stacks[covered].insert(arena, hypothesis) == Recombination::Discarded {
                    discarded += 1;
                }
            }
        }
        discarded
    }

    /// Source spans `(start, end)` that may be translated next.
    fn spans(&self, coverage: &Coverage) -> Vec<(usize, usize)> {
        let limit = self.config.distortion_limit;
        let starts: Vec<usize> = if limit == 0 {
            coverage.first_uncovered().into_iter().collect()
        } else {
            coverage.uncovered().collect()
        };
        starts
            .into_iter()
            .flat_map(|start| {
                let gap = coverage.gap_at(start);
                let width = if limit == 0 { gap } else { gap.min(limit) };
                (start + 1..=start + width).map(move |end| (start, end))
            })
            .collect()
    }
}

impl<'m, T, L> Decoder for StackDecoder<'m, T, L>
where
    T: TranslationModel,
    L: LanguageModel,
{
    fn decode(&self, sentence: &[String]) -> Result<Translation, DecodeError> {
        self.search(sentence).map(|derivation| derivation.translation())
    }
}
