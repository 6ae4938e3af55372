use anyhow::Result;
use log::info;
use rustfst::prelude::*;
use rustfst::semirings::Semiring;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;

use crate::StdVectorFst;

/// Cost (negated log10 probability) of a word the model cannot predict
/// at all, used when there is no `<unk>` unigram
const KINFBACKOFF: f64 = 99.00;

/// Stateful scorer for target word sequences.
///
/// Implementations must be deterministic: equal states and words give
/// equal results, so that states can key hypothesis recombination.
pub trait LanguageModel {
    /// Context needed to score the next word
    type State: Clone + Eq + Hash;

    /// Context before any output.
    fn begin(&self) -> Self::State;

    /// Extend `state` by `word`, returning the new context and the
    /// log-probability of `word` in the old one.
    fn score(&self, state: &Self::State, word: &str) -> (Self::State, f64);

    /// Log-probability of ending the sentence in `state`.
    fn end(&self, state: &Self::State) -> f64;
}

/// Backoff N-Gram model stored as a weighted FST.
///
/// Each state is an N-Gram history. Arcs are labelled with the predicted
/// word, weighted with its negated log10 probability, and lead to the
/// longest history the model knows for the extended context. Each
/// non-empty history also has an epsilon arc to its backoff history,
/// and a final weight if it predicts `</s>`.
pub struct NGramModel {
    /// Underlying FST, arcs sorted by input label
    fst: StdVectorFst,
    /// Word labels
    symbols: Arc<SymbolTable>,
    /// Highest order in the model
    hi_order: u8,
    /// State for the empty history
    unigram: StateId,
    /// Cost of an unknown word at the empty history
    unk_cost: f64,
}

impl NGramModel {
    /// Wrap an FST built as described above. Arcs must be sorted by
    /// input label.
    pub fn new(
        fst: StdVectorFst,
        symbols: Arc<SymbolTable>,
        hi_order: u8,
        unigram: StateId,
    ) -> Self {
        let mut model = Self {
            fst,
            symbols,
            hi_order,
            unigram,
            unk_cost: KINFBACKOFF,
        };
        let unk = model
            .symbols
            .get_label("<unk>")
            .and_then(|label| model.find_tr(unigram, label));
        if let Some((_, cost)) = unk {
            model.unk_cost = cost;
        }
        model
    }

    /// Read a model in ARPA format.
    pub fn read(input: &Path) -> Result<Self> {
        let model = crate::arpa::read_arpa(input)?;
        info!(
            "Read {}-gram model with {} states from {}",
            model.order(),
            model.num_states(),
            input.display()
        );
        Ok(model)
    }

    pub fn order(&self) -> u8 {
        self.hi_order
    }

    pub fn num_states(&self) -> usize {
        self.fst.num_states()
    }

    /// Destination and cost of the arc labelled `label` leaving `state`
    fn find_tr(&self, state: StateId, label: Label) -> Option<(StateId, f64)> {
        let trs = self.fst.get_trs(state).ok()?;
        let trs = trs.trs();
        trs.binary_search_by(|tr| tr.ilabel.cmp(&label))
            .ok()
            .map(|idx| (trs[idx].nextstate, *trs[idx].weight.value() as f64))
    }

    fn backoff(&self, state: StateId) -> Option<(StateId, f64)> {
        self.find_tr(state, EPS_LABEL)
    }
}

impl LanguageModel for NGramModel {
    type State = StateId;

    fn begin(&self) -> StateId {
        self.fst.start().unwrap_or(self.unigram)
    }

    fn score(&self, state: &StateId, word: &str) -> (StateId, f64) {
        let label = self
            .symbols
            .get_label(word)
            .filter(|&label| label != EPS_LABEL);
        let mut state = *state;
        let mut cost = 0.0;
        loop {
            if let Some((nextstate, weight)) = label.and_then(|label| self.find_tr(state, label)) {
                return (nextstate, -(cost + weight));
            }
            match self.backoff(state) {
                Some((backoff_state, weight)) => {
                    cost += weight;
                    state = backoff_state;
                }
                None => return (self.unigram, -(cost + self.unk_cost)),
            }
        }
    }

    fn end(&self, state: &StateId) -> f64 {
        let mut state = *state;
        let mut cost = 0.0;
        loop {
            if let Ok(Some(weight)) = self.fst.final_weight(state) {
                return -(cost + *weight.value() as f64);
            }
            match self.backoff(state) {
                Some((backoff_state, weight)) => {
                    cost += weight;
                    state = backoff_state;
                }
                None => return -(cost + self.unk_cost),
            }
        }
    }
}
