use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use rustfst::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::model::NGramModel;
use crate::StdVectorFst;

pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";

/// Metadata for history states
#[derive(Debug)]
struct HistoryState {
    /// Words of the history
    history: Vec<Label>,
    /// Log10 backoff weight for leaving this history (0 if not listed).
    backoff: f64,
    /// Log10 probability of `</s>` given this history, if listed.
    final_logprob: Option<f64>,
}

/// Build an N-Gram model FST from ARPA entries.
#[derive(Debug)]
pub struct NGramBuilder {
    /// Highest order of N-Grams in the model
    pub order: u8,
    /// HistoryStates for each state, the empty history first
    states: Vec<HistoryState>,
    /// Map histories to state IDs
    history_map: HashMap<Vec<Label>, StateId>,
    /// Log10 probability of each N-Gram not ending in `</s>`
    logprobs: HashMap<Vec<Label>, f64>,
    /// Word symbols
    syms: SymbolTable,
    /// Label of `</s>`
    eos: Label,
}

impl NGramBuilder {
    /// ID of the empty history, where all backoff ends
    const UNIGRAM: StateId = 0;

    pub fn new(order: u8) -> Self {
        let mut syms = SymbolTable::new();
        let eos = syms.add_symbol(EOS);
        let mut history_map = HashMap::new();
        history_map.insert(Vec::new(), Self::UNIGRAM);
        Self {
            order,
            states: vec![HistoryState {
                history: Vec::new(),
                backoff: 0.0,
                final_logprob: None,
            }],
            history_map,
            logprobs: HashMap::new(),
            syms,
            eos,
        }
    }

    fn history_state(&mut self, history: &[Label]) -> Result<StateId> {
        if let Some(&state) = self.history_map.get(history) {
            return Ok(state);
        }
        let state: StateId = self.states.len().try_into()?;
        self.states.push(HistoryState {
            history: history.to_vec(),
            backoff: 0.0,
            final_logprob: None,
        });
        self.history_map.insert(history.to_vec(), state);
        Ok(state)
    }

    /// Longest suffix of `words` (of at most `order - 1` words) that is a
    /// known history.
    fn longest_history(&self, words: &[Label]) -> StateId {
        let keep = words.len().min(self.order as usize - 1);
        (words.len() - keep..words.len())
            .find_map(|start| self.history_map.get(&words[start..]).copied())
            .unwrap_or(Self::UNIGRAM)
    }

    /// Add one ARPA entry.
    pub fn add_ngram(&mut self, words: &[&str], logprob: f64, backoff: Option<f64>) -> Result<()> {
        if words.is_empty() || words.len() > self.order as usize {
            bail!("{}-gram in a {}-gram model", words.len(), self.order);
        }
        let labels: Vec<Label> = words.iter().map(|w| self.syms.add_symbol(*w)).collect();
        let (context, word) = labels.split_at(labels.len() - 1);
        if !self.history_map.contains_key(context) {
            warn!("History of '{}' is not listed", words.join(" "));
        }
        let context_state = self.history_state(context)?;
        if word[0] == self.eos {
            let state = &mut self.states[context_state as usize];
            if state.final_logprob.replace(logprob).is_some() {
                bail!("Duplicate N-Gram '{}'", words.join(" "));
            }
            return Ok(());
        }
        if self.logprobs.insert(labels.clone(), logprob).is_some() {
            bail!("Duplicate N-Gram '{}'", words.join(" "));
        }
        if labels.len() < self.order as usize {
            let state = self.history_state(&labels)?;
            self.states[state as usize].backoff = backoff.unwrap_or(0.0);
        } else if backoff.is_some() {
            warn!("Ignoring backoff weight of '{}'", words.join(" "));
        }
        Ok(())
    }

    pub fn get_fst(&self) -> Result<StdVectorFst> {
        let mut fst = StdVectorFst::new();
        for (s, state) in self.states.iter().enumerate() {
            let s: StateId = s.try_into()?;
            fst.add_state();
            if let Some(logprob) = state.final_logprob {
                fst.set_final(s, (-logprob) as f32)?;
            }
            if !state.history.is_empty() {
                let backoff_state = self.longest_history(&state.history[1..]);
                fst.add_tr(
                    s,
                    Tr::new(
                        EPS_LABEL,
                        EPS_LABEL,
                        (-state.backoff) as f32,
                        backoff_state,
                    ),
                )?;
            }
        }
        for (ngram, logprob) in self.logprobs.iter() {
            let (context, word) = ngram.split_at(ngram.len() - 1);
            let origin = *self
                .history_map
                .get(context)
                .ok_or_else(|| anyhow!("no state for history {:?}", context))?;
            let destination = self.longest_history(ngram);
            fst.add_tr(
                origin,
                Tr::new(word[0], word[0], (-logprob) as f32, destination),
            )?;
        }
        let start = self
            .syms
            .get_label(BOS)
            .and_then(|bos| self.history_map.get(&[bos][..]).copied())
            .unwrap_or(Self::UNIGRAM);
        fst.set_start(start)?;
        tr_sort(&mut fst, ILabelCompare {});
        Ok(fst)
    }

    pub fn into_model(self) -> Result<NGramModel> {
        let mut fst = self.get_fst()?;
        let syms = Arc::new(self.syms);
        fst.set_input_symbols(Arc::clone(&syms));
        fst.set_output_symbols(Arc::clone(&syms));
        Ok(NGramModel::new(fst, syms, self.order, Self::UNIGRAM))
    }
}

/// Where we are in an ARPA file
#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Data,
    NGrams(usize),
    End,
}

/// Read an ARPA format N-Gram model.
pub fn read_arpa(input: &Path) -> Result<NGramModel> {
    let fh = File::open(input)
        .with_context(|| format!("cannot open language model {}", input.display()))?;
    parse_arpa(BufReader::new(fh)).with_context(|| format!("in {}", input.display()))
}

pub fn parse_arpa<R: BufRead>(reader: R) -> Result<NGramModel> {
    let mut section = Section::Preamble;
    let mut counts: Vec<(usize, usize)> = Vec::new();
    let mut seen: Vec<usize> = Vec::new();
    let mut builder: Option<NGramBuilder> = None;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("line {}", idx + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "\\data\\" {
            section = Section::Data;
            continue;
        }
        if line == "\\end\\" {
            section = Section::End;
            break;
        }
        if let Some(n) = line
            .strip_prefix('\\')
            .and_then(|s| s.strip_suffix("-grams:"))
        {
            let n: usize = n
                .parse()
                .with_context(|| format!("line {}: bad section header", idx + 1))?;
            if builder.is_none() {
                let order = counts.iter().map(|&(n, _)| n).max().unwrap_or(0);
                if order == 0 || order > u8::MAX as usize {
                    bail!("line {}: bad or missing \\data\\ header", idx + 1);
                }
                seen = vec![0; order + 1];
                builder = Some(NGramBuilder::new(order as u8));
            }
            section = Section::NGrams(n);
            continue;
        }
        match section {
            Section::Preamble | Section::End => {}
            Section::Data => {
                let count = line
                    .strip_prefix("ngram ")
                    .and_then(|s| s.split_once('='))
                    .and_then(|(n, c)| {
                        let n = n.trim().parse::<usize>().ok()?;
                        let c = c.trim().parse::<usize>().ok()?;
                        Some((n, c))
                    })
                    .ok_or_else(|| anyhow!("line {}: expected 'ngram N=count'", idx + 1))?;
                counts.push(count);
            }
            Section::NGrams(n) => {
                let builder = builder
                    .as_mut()
                    .ok_or_else(|| anyhow!("line {}: N-Grams before header", idx + 1))?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != n + 1 && fields.len() != n + 2 {
                    bail!("line {}: expected a {}-gram entry", idx + 1, n);
                }
                let logprob: f64 = fields[0]
                    .parse()
                    .with_context(|| format!("line {}: bad log-probability", idx + 1))?;
                let backoff = match fields.get(n + 1) {
                    Some(b) => Some(
                        b.parse::<f64>()
                            .with_context(|| format!("line {}: bad backoff", idx + 1))?,
                    ),
                    None => None,
                };
                builder
                    .add_ngram(&fields[1..n + 1], logprob, backoff)
                    .with_context(|| format!("line {}", idx + 1))?;
                if let Some(count) = seen.get_mut(n) {
                    *count += 1;
                }
            }
        }
    }
    if section != Section::End {
        bail!("missing \\end\\ marker");
    }
    for (n, count) in counts {
        let found = seen.get(n).copied().unwrap_or(0);
        if found != count {
            warn!("Header lists {} {}-grams but found {}", count, n, found);
        }
    }
    builder
        .ok_or_else(|| anyhow!("no N-Gram sections"))?
        .into_model()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LanguageModel;

    const TRIGRAM: &str = "\\data\\
ngram 1=5
ngram 2=3
ngram 3=1

\\1-grams:
-1.0 </s>
-99 <s> -0.1
-0.5 a -0.2
-0.7 b -0.3
-0.9 c -0.4

\\2-grams:
-0.3 <s> a -0.05
-0.2 a b -0.15
-0.4 b </s>

\\3-grams:
-0.1 <s> a b

\\end\\
";

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
    }

    #[test]
    fn it_builds_a_trigram_fst() {
        let lm = parse_arpa(TRIGRAM.as_bytes()).unwrap();
        assert_eq!(lm.order(), 3);
        // Histories: (), <s>, a, b, c, <s> a, a b
        assert_eq!(lm.num_states(), 7);
        let begin = lm.begin();
        let (s_a, logprob) = lm.score(&begin, "a");
        assert_close(logprob, -0.3);
        let (a_b, logprob) = lm.score(&s_a, "b");
        assert_close(logprob, -0.1);
        // Trigram histories are truncated to their last two words
        let (_, logprob) = lm.score(&a_b, "c");
        assert_close(logprob, -0.15 + -0.3 + -0.9);
        // b </s> via backoff from "a b"
        assert_close(lm.end(&a_b), -0.15 + -0.4);
    }

    #[test]
    fn it_follows_the_longest_history() {
        let lm = parse_arpa(TRIGRAM.as_bytes()).unwrap();
        let (c, _) = lm.score(&lm.begin(), "c");
        let (b, logprob) = lm.score(&c, "b");
        // backoff(c) + P(b)
        assert_close(logprob, -0.4 + -0.7);
        assert_close(lm.end(&b), -0.4);
    }

    #[test]
    fn it_rejects_bad_models() {
        assert!(parse_arpa("\\data\\\nngram 1=1\n\\1-grams:\n-1.0 a\n".as_bytes()).is_err());
        assert!(parse_arpa("\\data\\\nngram 1=1\n\\1-grams:\nx a\n\\end\\\n".as_bytes()).is_err());
        assert!(parse_arpa("\\1-grams:\n-1.0 a\n\\end\\\n".as_bytes()).is_err());
        assert!(parse_arpa(
            "\\data\\\nngram 1=2\n\\1-grams:\n-1.0 a\n-2.0 a\n\\end\\\n".as_bytes()
        )
        .is_err());
    }

    #[test]
    fn it_reports_unreadable_lines() {
        let err = parse_arpa(&b"\\data\\\nngram 1=1\n\xff\n"[..]).err().unwrap();
        let message = format!("{:#}", err);
        assert!(message.contains("line 3"), "{}", message);
        let err = read_arpa(&std::path::PathBuf::from("testdata/latin1")).err().unwrap();
        let message = format!("{:#}", err);
        assert!(message.contains("testdata/latin1"), "{}", message);
        assert!(message.contains("line 2"), "{}", message);
    }

    #[test]
    fn it_reads_unigram_models() {
        let arpa = "\\data\\\nngram 1=2\n\\1-grams:\n-1.0 a\n-0.5 </s>\n\\end\\\n";
        let lm = parse_arpa(arpa.as_bytes()).unwrap();
        assert_eq!(lm.num_states(), 1);
        let (state, logprob) = lm.score(&lm.begin(), "a");
        assert_eq!(state, lm.begin());
        assert_close(logprob, -1.0);
        assert_close(lm.end(&state), -0.5);
    }
}
