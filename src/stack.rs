use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use crate::hypothesis::{Arena, Coverage, Hypothesis, HypothesisId};

/// What happened to a hypothesis offered to a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recombination {
    /// First hypothesis with its key
    Inserted(HypothesisId),
    /// Beat the hypothesis previously stored under its key
    Replaced(HypothesisId),
    /// Not better than the stored hypothesis, not stored
    Discarded,
}

/// Best hypothesis per `(lm_state, coverage)` among hypotheses with the
/// same number of covered positions.
///
/// Entries keep the slot of the first hypothesis seen for their key, so
/// that equal scores are always resolved in favour of the earliest one.
#[derive(Debug)]
pub struct Stack<S> {
    /// Stored hypotheses in slot order
    slots: Vec<HypothesisId>,
    /// Map recombination keys to slots
    index: HashMap<(S, Coverage), usize>,
    /// Number of hypotheses merged into an existing entry
    recombined: usize,
}

impl<S: Clone + Eq + Hash> Stack<S> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            recombined: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn recombined(&self) -> usize {
        self.recombined
    }

    /// Store `hypothesis` in `arena` unless a hypothesis with the same
    /// language model state and coverage scores at least as well.
    pub fn insert<'a>(
        &mut self,
        arena: &mut Arena<'a, S>,
        hypothesis: Hypothesis<'a, S>,
    ) -> Recombination {
        let key = (hypothesis.lm_state.clone(), hypothesis.coverage.clone());
        match self.index.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(self.slots.len());
                let id = arena.push(hypothesis);
                self.slots.push(id);
                Recombination::Inserted(id)
            }
            Entry::Occupied(entry) => {
                self.recombined += 1;
                let slot = *entry.get();
                let stored = arena[self.slots[slot]].logprob;
                if OrderedFloat(hypothesis.logprob) > OrderedFloat(stored) {
                    let id = arena.push(hypothesis);
                    self.slots[slot] = id;
                    Recombination::Replaced(id)
                } else {
                    Recombination::Discarded
                }
            }
        }
    }

    /// The `width` best hypotheses, best first.
    pub fn beam(&self, arena: &Arena<S>, width: usize) -> Vec<HypothesisId> {
        let mut ids = self.slots.clone();
        // stable, so ties stay in slot order
        ids.sort_by_key(|&id| Reverse(OrderedFloat(arena[id].logprob)));
        ids.truncate(width);
        ids
    }

    /// Highest scoring hypothesis, the first one on ties.
    pub fn best(&self, arena: &Arena<S>) -> Option<HypothesisId> {
        let mut best: Option<HypothesisId> = None;
        for &id in &self.slots {
            match best {
                Some(b) if OrderedFloat(arena[id].logprob) <= OrderedFloat(arena[b].logprob) => {}
                _ => best = Some(id),
            }
        }
        best
    }
}

impl<S: Clone + Eq + Hash> Default for Stack<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tm::Phrase;

    fn hypothesis<'a>(logprob: f64, state: &str, coverage: &Coverage) -> Hypothesis<'a, String> {
        Hypothesis {
            logprob,
            lm_state: state.to_string(),
            predecessor: Some(0),
            phrase: None,
            coverage: coverage.clone(),
            frontier: 0,
        }
    }

    #[test]
    fn it_recombines_hypotheses() {
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let coverage = Coverage::new(3).with_span(0, 1);
        let first = stack.insert(&mut arena, hypothesis(-2.0, "x", &coverage));
        assert_eq!(first, Recombination::Inserted(0));
        // Equal score: the first one stays
        let tie = stack.insert(&mut arena, hypothesis(-2.0, "x", &coverage));
        assert_eq!(tie, Recombination::Discarded);
        let better = stack.insert(&mut arena, hypothesis(-1.0, "x", &coverage));
        assert_eq!(better, Recombination::Replaced(1));
        let worse = stack.insert(&mut arena, hypothesis(-3.0, "x", &coverage));
        assert_eq!(worse, Recombination::Discarded);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.recombined(), 3);
        assert_eq!(stack.beam(&arena, 10), vec![1]);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn it_keeps_distinct_keys() {
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let a = Coverage::new(3).with_span(0, 1);
        let b = Coverage::new(3).with_span(1, 2);
        stack.insert(&mut arena, hypothesis(-2.0, "x", &a));
        stack.insert(&mut arena, hypothesis(-2.0, "y", &a));
        stack.insert(&mut arena, hypothesis(-2.0, "x", &b));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.recombined(), 0);
    }

    #[test]
    fn it_prunes_to_the_beam() {
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        for (i, logprob) in [-3.0, -1.0, -2.0, -1.0, f64::NEG_INFINITY].iter().enumerate() {
            let coverage = Coverage::new(5).with_span(i, i + 1);
            stack.insert(&mut arena, hypothesis(*logprob, "x", &coverage));
        }
        assert_eq!(stack.beam(&arena, 3), vec![1, 3, 2]);
        assert_eq!(stack.beam(&arena, 10), vec![1, 3, 2, 0, 4]);
        assert_eq!(stack.best(&arena), Some(1));
    }

    #[test]
    fn it_prefers_finite_scores() {
        let phrase = Phrase::new("z", 0.0);
        let mut arena = Arena::new();
        let mut stack = Stack::new();
        let coverage = Coverage::new(1).with_span(0, 1);
        let mut impossible = hypothesis(f64::NEG_INFINITY, "x", &coverage);
        impossible.phrase = Some(&phrase);
        stack.insert(&mut arena, impossible);
        stack.insert(&mut arena, hypothesis(-1000.0, "y", &coverage));
        assert_eq!(stack.best(&arena), Some(1));
        assert_eq!(Stack::<String>::new().best(&arena), None);
    }
}
