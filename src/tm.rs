use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

/// Field separator in phrase table files
const SEPARATOR: &str = "|||";

/// A candidate translation of a source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    /// Target words, separated by single spaces
    pub target: String,
    /// Translation log-probability (log10)
    pub logprob: f64,
}

impl Phrase {
    pub fn new(target: impl Into<String>, logprob: f64) -> Self {
        Self {
            target: target.into(),
            logprob,
        }
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.target.split_whitespace()
    }
}

/// Phrase lookup used by the decoders.
pub trait TranslationModel {
    /// Candidate translations of exactly `span`, best first. An empty
    /// slice means the span has no known translation.
    fn phrases(&self, span: &[String]) -> &[Phrase];
}

/// In-memory phrase table keeping the `limit` best phrases per source.
#[derive(Debug)]
pub struct PhraseTable {
    table: HashMap<Vec<String>, Vec<Phrase>>,
    /// Maximum number of phrases kept per source phrase
    limit: usize,
}

impl PhraseTable {
    pub fn new(limit: usize) -> Self {
        Self {
            table: HashMap::new(),
            limit: limit.max(1),
        }
    }

    /// Read `source ||| target ||| logprob` lines.
    pub fn read(input: &Path, limit: usize) -> Result<Self> {
        let fh = File::open(input)
            .with_context(|| format!("cannot open phrase table {}", input.display()))?;
        let mut tm = Self::new(limit);
        let mut entries = 0;
        for (idx, line) in BufReader::new(fh).lines().enumerate() {
            let line = line.with_context(|| format!("{}:{}", input.display(), idx + 1))?;
            let parsed = parse_line(&line)
                .with_context(|| format!("{}:{}", input.display(), idx + 1))?;
            if let Some((source, phrase)) = parsed {
                tm.insert(source, phrase);
                entries += 1;
            }
        }
        info!(
            "Read {} phrases for {} source phrases from {}",
            entries,
            tm.len(),
            input.display()
        );
        Ok(tm)
    }

    /// Add a phrase, dropping the worst one if `source` is over the limit.
    /// Phrases with equal scores stay in insertion order.
    pub fn insert(&mut self, source: Vec<String>, phrase: Phrase) {
        let phrases = self.table.entry(source).or_default();
        let pos = phrases
            .iter()
            .position(|p| p.logprob < phrase.logprob)
            .unwrap_or(phrases.len());
        phrases.insert(pos, phrase);
        phrases.truncate(self.limit);
    }

    /// Translate every token of `sentences` that has no single-token
    /// phrase as itself, with log-probability 0. Returns the number of
    /// phrases added.
    pub fn add_passthrough(&mut self, sentences: &[Vec<String>]) -> usize {
        let mut added = 0;
        for word in sentences.iter().flatten() {
            let source = std::slice::from_ref(word);
            if !self.contains(source) {
                self.insert(source.to_vec(), Phrase::new(word.clone(), 0.0));
                added += 1;
            }
        }
        if added > 0 {
            info!("Added {} pass-through phrases", added);
        }
        added
    }

    pub fn contains(&self, source: &[String]) -> bool {
        self.table.contains_key(source)
    }

    /// Number of distinct source phrases
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl TranslationModel for PhraseTable {
    fn phrases(&self, span: &[String]) -> &[Phrase] {
        self.table.get(span).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn parse_line(line: &str) -> Result<Option<(Vec<String>, Phrase)>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
    if fields.len() != 3 {
        return Err(anyhow!("expected `source ||| target ||| logprob`"));
    }
    let source: Vec<String> = fields[0].split_whitespace().map(String::from).collect();
    if source.is_empty() {
        return Err(anyhow!("empty source phrase"));
    }
    let target: Vec<&str> = fields[1].split_whitespace().collect();
    if target.is_empty() {
        warn!("Skipping empty translation of '{}'", fields[0]);
        return Ok(None);
    }
    let logprob: f64 = fields[2]
        .parse()
        .with_context(|| format!("bad log-probability '{}'", fields[2]))?;
    Ok(Some((source, Phrase::new(target.join(" "), logprob))))
}
