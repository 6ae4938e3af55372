use anyhow::{Context, Result};
use rustfst::fst_impls::VectorFst;
use rustfst::semirings::TropicalWeight;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

/// rustfst does not define this but we will
pub type StdVectorFst = VectorFst<TropicalWeight>;

/// Reading ARPA files into N-Gram FSTs
pub mod arpa;
/// Stack (beam search) decoding
pub mod decoder;
/// Decoding errors
pub mod error;
/// Greedy left-to-right decoding
pub mod greedy;
/// Partial translations and source coverage
pub mod hypothesis;
/// Language models
pub mod model;
/// Turning search results into text and scores
pub mod output;
/// Hypothesis stacks with recombination
pub mod stack;
/// Phrase tables
pub mod tm;

#[cfg(test)]
mod testing;

pub use decoder::{decode_all, Decoder, DecoderConfig, StackDecoder};
pub use error::DecodeError;
pub use greedy::GreedyDecoder;
pub use model::{LanguageModel, NGramModel};
pub use output::{Scores, Translation};
pub use tm::{Phrase, PhraseTable, TranslationModel};

/// Read tokenized sentences, one per line, separated by whitespace
pub fn read_sentences(input: &Path) -> Result<Vec<Vec<String>>> {
    let fh = File::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    BufReader::new(fh)
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            let line = line.with_context(|| format!("{}:{}", input.display(), idx + 1))?;
            Ok(line.split_whitespace().map(String::from).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn it_reads_sentences() {
        let sentences = read_sentences(&PathBuf::from("testdata/input")).unwrap();
        assert_eq!(sentences.len(), 5);
        assert_eq!(sentences[1], vec!["das", "kleine", "haus"]);
        assert!(sentences[3].is_empty());
        assert_eq!("das haus ist klein", sentences[2].join(" "));
    }

    #[test]
    fn it_fails_on_missing_input() {
        assert!(read_sentences(&PathBuf::from("testdata/missing")).is_err());
    }

    #[test]
    fn it_reports_the_failing_line() {
        let err = read_sentences(&PathBuf::from("testdata/latin1")).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("testdata/latin1:2"), "{}", message);
    }
}
