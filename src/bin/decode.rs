use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{error, info};
use rayon::ThreadPoolBuilder;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rustfst_decoder::{
    decode_all, read_sentences, Decoder, DecoderConfig, GreedyDecoder, NGramModel, PhraseTable,
    StackDecoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Beam search with reordering
    Stack,
    /// Monotone best-first, one hypothesis at a time
    Greedy,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Translate tokenized sentences with a phrase table and an ARPA language model"
)]
struct Args {
    /// File containing sentences to translate
    #[arg(short, long, default_value = "data/input")]
    input: PathBuf,

    /// File containing translation model
    #[arg(short, long = "translation-model", default_value = "data/tm")]
    tm: PathBuf,

    /// File containing ARPA-format language model
    #[arg(short, long = "language-model", default_value = "data/lm")]
    lm: PathBuf,

    /// Number of sentences to decode
    #[arg(short, long = "num-sentences")]
    num_sentences: Option<usize>,

    /// Limit on number of translations to consider per phrase
    #[arg(short = 'k', long = "translations-per-phrase", default_value = "1")]
    translations_per_phrase: usize,

    /// Maximum stack size
    #[arg(short, long = "stack-size", default_value = "1")]
    stack_size: usize,

    /// Maximum number of source words in one phrase, 0 for no reordering
    #[arg(short, long = "distortion-limit", default_value = "6")]
    distortion_limit: usize,

    #[arg(long, value_enum, default_value_t = Strategy::Stack)]
    strategy: Strategy,

    /// Worker threads, 0 for one per CPU
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Log progress and print scores to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Read the input, keeping at most `num_sentences` sentences.
fn read_input(input: &Path, num_sentences: Option<usize>) -> Result<Vec<Vec<String>>> {
    let mut sentences = read_sentences(input)?;
    if let Some(n) = num_sentences {
        sentences.truncate(n);
    }
    Ok(sentences)
}

/// Write one line per sentence to `out`, empty if it could not be
/// translated, and the scores of each translation to `scores`.
fn write_translations<D, W, E>(
    decoder: &D,
    sentences: &[Vec<String>],
    out: &mut W,
    mut scores: Option<&mut E>,
) -> Result<()>
where
    D: Decoder + Sync,
    W: Write,
    E: Write,
{
    for (idx, result) in decode_all(decoder, sentences).into_iter().enumerate() {
        match result {
            Ok(translation) => {
                writeln!(out, "{}", translation.text)?;
                if let Some(scores) = scores.as_mut() {
                    writeln!(scores, "{}", translation.scores)?;
                }
            }
            Err(err) => {
                error!("Sentence {}: {}", idx + 1, err);
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if args.threads > 0 {
        ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("unable to configure thread pool")?;
    }

    let config = DecoderConfig {
        beam_width: args.stack_size,
        distortion_limit: args.distortion_limit,
        max_candidates_per_span: args.translations_per_phrase,
    };
    config.validate()?;

    let mut tm = PhraseTable::read(&args.tm, args.translations_per_phrase)?;
    let lm = NGramModel::read(&args.lm)?;
    let sentences = read_input(&args.input, args.num_sentences)?;
    tm.add_passthrough(&sentences);
    info!("Decoding {} sentences with {:?}", sentences.len(), config);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut stderr = io::stderr();
    let scores = if args.verbose { Some(&mut stderr) } else { None };
    match args.strategy {
        Strategy::Stack => {
            let decoder = StackDecoder::new(&tm, &lm, config)?;
            write_translations(&decoder, &sentences, &mut out, scores)
        }
        Strategy::Greedy => {
            let decoder = GreedyDecoder::new(&tm, &lm, config)?;
            write_translations(&decoder, &sentences, &mut out, scores)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_limits_the_number_of_sentences() {
        let input = PathBuf::from("testdata/input");
        assert_eq!(read_input(&input, None).unwrap().len(), 5);
        let sentences = read_input(&input, Some(2)).unwrap();
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1].join(" "), "das kleine haus");
        assert_eq!(read_input(&input, Some(10)).unwrap().len(), 5);
    }

    #[test]
    fn it_writes_one_line_per_sentence() {
        let tm = PhraseTable::read(&PathBuf::from("testdata/tm"), 1).unwrap();
        let lm = NGramModel::read(&PathBuf::from("testdata/lm")).unwrap();
        let all = read_input(&PathBuf::from("testdata/input"), None).unwrap();
        // "unbekannt" has no phrase without pass-through
        let sentences = vec![all[0].clone(), all[4].clone(), all[3].clone()];
        let decoder = StackDecoder::new(&tm, &lm, DecoderConfig::default()).unwrap();

        let mut out = Vec::new();
        let mut scores = Vec::new();
        write_translations(&decoder, &sentences, &mut out, Some(&mut scores)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "the house\n\n\n");
        let scores = String::from_utf8(scores).unwrap();
        let lines: Vec<&str> = scores.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "LM = -1.000000, TM = -0.200000, Total = -1.200000");
        assert!(lines[1].ends_with("Total = 0.000000"), "{}", lines[1]);

        let mut quiet = Vec::new();
        write_translations(&decoder, &sentences, &mut quiet, None::<&mut Vec<u8>>).unwrap();
        assert_eq!(String::from_utf8(quiet).unwrap(), "the house\n\n\n");
    }
}
