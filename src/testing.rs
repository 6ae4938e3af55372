use std::collections::HashMap;

use crate::model::LanguageModel;

/// Bigram language model over a hand-written table. The state is the
/// last word, `<s>` at the start; anything unlisted scores `default`.
#[derive(Debug, Clone)]
pub struct TableLm {
    scores: HashMap<(String, String), f64>,
    ends: HashMap<String, f64>,
    default: f64,
}

impl TableLm {
    pub fn new(default: f64) -> Self {
        Self {
            scores: HashMap::new(),
            ends: HashMap::new(),
            default,
        }
    }

    pub fn with_score(mut self, prev: &str, word: &str, logprob: f64) -> Self {
        self.scores.insert((prev.to_string(), word.to_string()), logprob);
        self
    }

    pub fn with_end(mut self, prev: &str, logprob: f64) -> Self {
        self.ends.insert(prev.to_string(), logprob);
        self
    }
}

impl LanguageModel for TableLm {
    type State = String;

    fn begin(&self) -> String {
        "<s>".to_string()
    }

    fn score(&self, state: &String, word: &str) -> (String, f64) {
        let logprob = self
            .scores
            .get(&(state.clone(), word.to_string()))
            .copied()
            .unwrap_or(self.default);
        (word.to_string(), logprob)
    }

    fn end(&self, state: &String) -> f64 {
        self.ends.get(state).copied().unwrap_or(self.default)
    }
}

/// Whitespace tokenization for test sentences
pub fn words(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}
