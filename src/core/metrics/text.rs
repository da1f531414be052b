//! Reference-based metrics over generated text.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::Result;

static ARTICLES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(a|an|the|in|our)\b").expect("valid article pattern"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(" +").expect("valid space pattern"));
static WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+(?:'\w+)*|[^\w\s]+").expect("valid word pattern"));

/// Clitics split off a word the way Treebank tokenization does.
const CLITICS: &[&str] = &["'s", "'m", "'d", "'ll", "'re", "'ve"];

/// Rounds `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Normalizes text before token overlap: lowercases, strips ASCII punctuation,
/// removes a few function words and squeezes repeated spaces.
pub fn clean_text(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    let without_articles = ARTICLES.replace_all(&lowered, " ");
    SPACES.replace_all(&without_articles, " ").trim().to_string()
}

/// Splits text into words and runs of punctuation.
///
/// Contractions are split Treebank style: `don't` gives `do` and `n't`,
/// `they'll` gives `they` and `'ll`.
pub fn word_tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    for word in WORDS.find_iter(text).map(|m| m.as_str()) {
        match contraction_split(word) {
            Some(at) => {
                tokens.push(&word[..at]);
                tokens.push(&word[at..]);
            }
            None => tokens.push(word),
        }
    }
    tokens
}

/// Byte index where a trailing clitic starts, if `word` has one.
fn contraction_split(word: &str) -> Option<usize> {
    let lowered = word.to_ascii_lowercase();
    if lowered.len() > 3 && lowered.ends_with("n't") {
        return Some(word.len() - 3);
    }
    CLITICS
        .iter()
        .find(|clitic| lowered.len() > clitic.len() && lowered.ends_with(*clitic))
        .map(|clitic| word.len() - clitic.len())
}

fn counts<'a>(tokens: &[&'a str]) -> HashMap<&'a str, usize> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(*token).or_insert(0) += 1;
    }
    counts
}

/// Token-overlap F1 between one prediction and one gold answer, in `[0, 1]`.
pub fn token_f1(prediction: &str, gold: &str) -> f64 {
    if prediction.is_empty() {
        return 0.0;
    }
    let prediction = clean_text(prediction);
    let gold = clean_text(gold);
    let pred_tokens: Vec<&str> = prediction.split_whitespace().collect();
    let gold_tokens: Vec<&str> = gold.split_whitespace().collect();

    let gold_counts = counts(&gold_tokens);
    let common: usize = counts(&pred_tokens)
        .iter()
        .map(|(token, n)| (*n).min(gold_counts.get(token).copied().unwrap_or(0)))
        .sum();
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / pred_tokens.len() as f64;
    let recall = common as f64 / gold_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

fn ensure_aligned<S>(candidates: &[S], references: &[S]) -> Result<()> {
    if candidates.len() != references.len() {
        return Err(anyhow::anyhow!(
            "Got {} candidates but {} references",
            candidates.len(),
            references.len()
        ));
    }
    Ok(())
}

/// Mean token F1 of a corpus, scaled to 0..100 and rounded to 2 places.
///
/// # Arguments
/// * `candidates` - Generated texts
/// * `references` - Gold texts, aligned with `candidates`
pub fn compute_f1<S: AsRef<str> + Sync>(candidates: &[S], references: &[S]) -> Result<f64> {
    ensure_aligned(candidates, references)?;
    if candidates.is_empty() {
        return Ok(0.0);
    }
    let total: f64 = candidates
        .par_iter()
        .zip(references.par_iter())
        .map(|(candidate, reference)| token_f1(candidate.as_ref(), reference.as_ref()))
        .sum();
    Ok(round_to(total / candidates.len() as f64 * 100.0, 2))
}

/// Ratio of distinct n-grams to all n-grams in the corpus, rounded to 4 places.
///
/// Candidates are split with [`word_tokenize`].
pub fn distinct_ngram<S: AsRef<str>>(candidates: &[S], n: usize) -> f64 {
    let mut seen = HashSet::new();
    let mut total = 0usize;
    for candidate in candidates {
        let tokens = word_tokenize(candidate.as_ref());
        if n == 0 || tokens.len() < n {
            continue;
        }
        for gram in tokens.windows(n) {
            seen.insert(gram.join(" "));
            total += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    round_to(seen.len() as f64 / total as f64, 4)
}

/// Scores of generated responses against grounding knowledge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnowledgeScores {
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
}

/// Word-set overlap between candidates and their tab-separated knowledge.
///
/// Words are lowercased and `stopwords` removed on both sides. Pairs without
/// any overlap contribute zero but still count in the averages. All values are
/// rounded to 4 places.
pub fn knowledge_f1<S: AsRef<str>>(
    references: &[S],
    candidates: &[S],
    stopwords: &HashSet<String>,
) -> KnowledgeScores {
    let word_set = |text: &str| -> HashSet<String> {
        text.split_whitespace()
            .map(str::to_lowercase)
            .filter(|word| !stopwords.contains(word))
            .collect()
    };

    let (mut recall, mut precision, mut f1) = (0.0, 0.0, 0.0);
    let mut pairs = 0usize;
    for (candidate, reference) in candidates.iter().zip(references) {
        pairs += 1;
        let knowledge: HashSet<String> = reference
            .as_ref()
            .trim()
            .split('\t')
            .flat_map(|sentence| word_set(sentence))
            .collect();
        let predicted = word_set(candidate.as_ref());

        let overlap = knowledge.intersection(&predicted).count();
        if overlap == 0 {
            continue;
        }
        let r = overlap as f64 / knowledge.len() as f64;
        let p = overlap as f64 / predicted.len() as f64;
        recall += r;
        precision += p;
        f1 += 2.0 * r * p / (r + p);
    }

    if pairs == 0 {
        return KnowledgeScores {
            recall: 0.0,
            precision: 0.0,
            f1: 0.0,
        };
    }
    let pairs = pairs as f64;
    KnowledgeScores {
        recall: round_to(recall / pairs, 4),
        precision: round_to(precision / pairs, 4),
        f1: round_to(f1 / pairs, 4),
    }
}

/// Fraction of candidates exactly equal to their reference label.
pub fn classification_accuracy<S: AsRef<str>>(references: &[S], candidates: &[S]) -> Result<f64> {
    ensure_aligned(candidates, references)?;
    if candidates.is_empty() {
        return Ok(0.0);
    }
    let hits = candidates
        .iter()
        .zip(references)
        .filter(|(candidate, reference)| candidate.as_ref().trim() == reference.as_ref().trim())
        .count();
    Ok(hits as f64 / candidates.len() as f64)
}
