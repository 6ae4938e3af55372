use std::ops::Index;

use crate::model::LanguageModel;
use crate::tm::Phrase;

const BLOCK_BITS: usize = u64::BITS as usize;

/// Source positions already translated, one bit per token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coverage {
    /// Position `i` is bit `i % 64` of block `i / 64`. Bits past `len`
    /// are always zero.
    blocks: Box<[u64]>,
    /// Number of source positions
    len: usize,
    /// Number of covered positions
    count: usize,
}

impl Coverage {
    pub fn new(len: usize) -> Self {
        let blocks = vec![0u64; (len + BLOCK_BITS - 1) / BLOCK_BITS].into_boxed_slice();
        Self {
            blocks,
            len,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// True for the coverage of an empty sentence.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of covered positions.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_complete(&self) -> bool {
        self.count == self.len
    }

    pub fn is_covered(&self, pos: usize) -> bool {
        pos < self.len && (self.blocks[pos / BLOCK_BITS] >> (pos % BLOCK_BITS)) & 1 == 1
    }

    /// Lowest position not yet covered.
    pub fn first_uncovered(&self) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .find(|(_, block)| **block != u64::MAX)
            .map(|(idx, block)| idx * BLOCK_BITS + (!block).trailing_zeros() as usize)
            .filter(|&pos| pos < self.len)
    }

    /// All positions not yet covered, ascending.
    pub fn uncovered(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&pos| !self.is_covered(pos))
    }

    /// Length of the run of uncovered positions starting at `start`.
    pub fn gap_at(&self, start: usize) -> usize {
        (start..self.len)
            .take_while(|&pos| !self.is_covered(pos))
            .count()
    }

    /// Copy of this coverage with `start..end` set. The span must be
    /// uncovered.
    pub fn with_span(&self, start: usize, end: usize) -> Self {
        debug_assert!(end <= self.len);
        debug_assert!(self.gap_at(start) >= end - start);
        let mut next = self.clone();
        for pos in start..end {
            next.blocks[pos / BLOCK_BITS] |= 1u64 << (pos % BLOCK_BITS);
        }
        next.count += end - start;
        next
    }

    pub fn is_subset(&self, other: &Coverage) -> bool {
        self.len == other.len
            && self
                .blocks
                .iter()
                .zip(other.blocks.iter())
                .all(|(a, b)| a & !b == 0)
    }
}

/// Index of a hypothesis in its sentence's arena
pub type HypothesisId = usize;

/// A partial translation. Never modified once it is in an arena.
#[derive(Debug, Clone)]
pub struct Hypothesis<'a, S> {
    /// Accumulated translation and language model log-probability
    pub logprob: f64,
    /// Language model context after the last target word
    pub lm_state: S,
    /// Hypothesis this one extends, `None` for the initial hypothesis
    pub predecessor: Option<HypothesisId>,
    /// Phrase applied to the predecessor
    pub phrase: Option<&'a Phrase>,
    /// Source positions translated so far
    pub coverage: Coverage,
    /// Last source position translated by `phrase`
    pub frontier: usize,
}

impl<'a, S: Clone> Hypothesis<'a, S> {
    /// Empty translation of a sentence of `len` tokens.
    pub fn initial(lm_state: S, len: usize) -> Self {
        Self {
            logprob: 0.0,
            lm_state,
            predecessor: None,
            phrase: None,
            coverage: Coverage::new(len),
            frontier: 0,
        }
    }

    /// Translate source span `start..end` of this hypothesis (stored as
    /// `id`) with `phrase`. The sentence-end score is added once the
    /// span completes the coverage.
    pub fn extend<L>(
        &self,
        id: HypothesisId,
        lm: &L,
        phrase: &'a Phrase,
        start: usize,
        end: usize,
    ) -> Self
    where
        L: LanguageModel<State = S> + ?Sized,
    {
        let mut logprob = self.logprob + phrase.logprob;
        let mut lm_state = self.lm_state.clone();
        for word in phrase.words() {
            let (next_state, word_logprob) = lm.score(&lm_state, word);
            lm_state = next_state;
            logprob += word_logprob;
        }
        let coverage = self.coverage.with_span(start, end);
        if coverage.is_complete() {
            logprob += lm.end(&lm_state);
        }
        Self {
            logprob,
            lm_state,
            predecessor: Some(id),
            phrase: Some(phrase),
            coverage,
            frontier: end - 1,
        }
    }
}

/// Storage for every hypothesis created while decoding one sentence.
#[derive(Debug)]
pub struct Arena<'a, S> {
    hypotheses: Vec<Hypothesis<'a, S>>,
}

impl<'a, S> Arena<'a, S> {
    pub fn new() -> Self {
        Self {
            hypotheses: Vec::new(),
        }
    }

    pub fn push(&mut self, hypothesis: Hypothesis<'a, S>) -> HypothesisId {
        self.hypotheses.push(hypothesis);
        self.hypotheses.len() - 1
    }

    pub fn get(&self, id: HypothesisId) -> Option<&Hypothesis<'a, S>> {
        self.hypotheses.get(id)
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hypothesis<'a, S>> {
        self.hypotheses.iter()
    }

    /// Walk from `id` back to the initial hypothesis.
    pub fn chain(&self, id: HypothesisId) -> Chain<'_, 'a, S> {
        Chain {
            arena: self,
            next: Some(id),
        }
    }
}

impl<'a, S> Default for Arena<'a, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S> Index<HypothesisId> for Arena<'a, S> {
    type Output = Hypothesis<'a, S>;

    fn index(&self, id: HypothesisId) -> &Self::Output {
        &self.hypotheses[id]
    }
}

/// Iterator over a hypothesis and its predecessors, newest first
pub struct Chain<'r, 'a, S> {
    arena: &'r Arena<'a, S>,
    next: Option<HypothesisId>,
}

impl<'r, 'a, S> Iterator for Chain<'r, 'a, S> {
    type Item = &'r Hypothesis<'a, S>;

    fn next(&mut self) -> Option<Self::Item> {
        let hypothesis = self.arena.get(self.next?)?;
        self.next = hypothesis.predecessor;
        Some(hypothesis)
    }
}
