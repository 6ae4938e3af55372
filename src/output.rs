use std::fmt;

use crate::hypothesis::{Arena, Hypothesis, HypothesisId};
use crate::tm::Phrase;

/// Score of a translation split by model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub language_model: f64,
    pub translation_model: f64,
    pub total: f64,
}

impl fmt::Display for Scores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LM = {:.6}, TM = {:.6}, Total = {:.6}",
            self.language_model, self.translation_model, self.total
        )
    }
}

/// Decoder output for one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Target words separated by single spaces
    pub text: String,
    pub scores: Scores,
}

/// The winning hypothesis of a search, together with the arena holding
/// its predecessors.
#[derive(Debug)]
pub struct Derivation<'a, S> {
    arena: Arena<'a, S>,
    winner: HypothesisId,
}

impl<'a, S> Derivation<'a, S> {
    pub fn new(arena: Arena<'a, S>, winner: HypothesisId) -> Self {
        Self { arena, winner }
    }

    pub fn arena(&self) -> &Arena<'a, S> {
        &self.arena
    }

    pub fn winner(&self) -> &Hypothesis<'a, S> {
        &self.arena[self.winner]
    }

    /// Phrases applied to build the winner, in target order.
    pub fn phrases(&self) -> Vec<&'a Phrase> {
        let mut phrases: Vec<&'a Phrase> = self
            .arena
            .chain(self.winner)
            .filter_map(|h| h.phrase)
            .collect();
        phrases.reverse();
        phrases
    }

    pub fn target(&self) -> String {
        self.phrases()
            .iter()
            .map(|p| p.target.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sum of the translation log-probabilities of the phrases used.
    pub fn translation_model_logprob(&self) -> f64 {
        self.arena
            .chain(self.winner)
            .filter_map(|h| h.phrase)
            .map(|p| p.logprob)
            .sum()
    }

    /// Split the winner's score; the language model part is whatever the
    /// phrases do not account for.
    pub fn scores(&self) -> Scores {
        let total = self.winner().logprob;
        let translation_model = self.translation_model_logprob();
        Scores {
            language_model: total - translation_model,
            translation_model,
            total,
        }
    }

    pub fn translation(&self) -> Translation {
        Translation {
            text: self.target(),
            scores: self.scores(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LanguageModel;
    use crate::testing::TableLm;

    #[test]
    fn it_extracts_target_order() {
        let lm = TableLm::new(-1.0);
        let first = Phrase::new("a b", -0.5);
        let second = Phrase::new("c", -0.25);
        let mut arena = Arena::new();
        let root = arena.push(Hypothesis::initial(lm.begin(), 3));
        // Translate the last source word first
        let next = arena[root].extend(root, &lm, &second, 2, 3);
        let next = arena.push(next);
        let last = arena[next].extend(next, &lm, &first, 0, 2);
        let last = arena.push(last);
        let derivation = Derivation::new(arena, last);
        assert_eq!(derivation.target(), "c a b");
        let scores = derivation.scores();
        // three words and the sentence end at -1 each
        assert!((scores.translation_model - -0.75).abs() < 1e-9);
        assert!((scores.language_model - -4.0).abs() < 1e-9);
        assert!((scores.total - -4.75).abs() < 1e-9);
        assert_eq!(
            scores.to_string(),
            "LM = -4.000000, TM = -0.750000, Total = -4.750000"
        );
    }

    #[test]
    fn it_extracts_the_empty_translation() {
        let lm = TableLm::new(-1.0);
        let mut arena = Arena::new();
        let root = arena.push(Hypothesis::initial(lm.begin(), 0));
        let translation = Derivation::new(arena, root).translation();
        assert_eq!(translation.text, "");
        assert_eq!(translation.scores.total, 0.0);
        assert_eq!(translation.scores.translation_model, 0.0);
    }
}
