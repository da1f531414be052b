//! Evaluation of generated text and model outputs.

pub mod tensor;
pub mod text;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::core::error::ConfigError;
use crate::Result;

pub use tensor::{accuracy, attn_accuracy, padding_mask, perplexity_by_labels};
pub use text::{
    classification_accuracy, clean_text, compute_f1, distinct_ngram, knowledge_f1, token_f1,
    KnowledgeScores,
};

/// Metric names backed by external scoring libraries.
const EXTERNAL_METRICS: &[&str] = &[
    "bleu",
    "sacrebleu",
    "sent_bleu",
    "corpus_bleu",
    "google_bleu",
    "rouge",
    "meteor",
    "charf",
    "bert_score",
    "q_squared",
    "ppl",
    "nlg_eval",
    "cos_sim",
];

/// Metrics computed in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMetric {
    F1,
    Dist,
    KnowledgeF1,
    ClsAcc,
}

impl FromStr for EvalMetric {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "f1" => Ok(EvalMetric::F1),
            "dist" => Ok(EvalMetric::Dist),
            "knowledge_f1" => Ok(EvalMetric::KnowledgeF1),
            "cls_acc" => Ok(EvalMetric::ClsAcc),
            other if EXTERNAL_METRICS.contains(&other) => {
                Err(ConfigError::ExternalMetric(other.to_string()))
            }
            other => Err(ConfigError::UnknownMetric(other.to_string())),
        }
    }
}

/// Options shared by the text metrics.
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub stopwords: HashSet<String>,
}

impl EvalOptions {
    /// Reads one stopword per line.
    pub fn load_stopwords<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        self.stopwords = content
            .lines()
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub metric: String,
    pub score: f64,
}

/// Named scores in the order they were computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricReport {
    pub rows: Vec<MetricRow>,
}

impl MetricReport {
    fn add(&mut self, metric: &str, score: f64) {
        info!(metric, score, "metric computed");
        self.rows.push(MetricRow {
            metric: metric.to_string(),
            score,
        });
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.metric == metric).map(|r| r.score)
    }

    /// Writes the report as a `metric,score` CSV file.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Computes `metrics` for aligned candidate and reference texts.
///
/// # Arguments
/// * `metrics` - Metrics to compute, in report order
/// * `candidates` - Generated texts
/// * `references` - Gold texts; knowledge for `KnowledgeF1`, labels for `ClsAcc`
/// * `options` - Stopwords and other shared settings
pub fn evaluate<S: AsRef<str> + Sync>(
    metrics: &[EvalMetric],
    candidates: &[S],
    references: &[S],
    options: &EvalOptions,
) -> Result<MetricReport> {
    if candidates.len() != references.len() {
        return Err(anyhow::anyhow!(
            "Got {} candidates but {} references",
            candidates.len(),
            references.len()
        ));
    }

    let mut report = MetricReport::default();
    for metric in metrics {
        match metric {
            EvalMetric::F1 => report.add("f1", compute_f1(candidates, references)?),
            EvalMetric::Dist => {
                report.add("dist1", distinct_ngram(candidates, 1));
                report.add("dist2", distinct_ngram(candidates, 2));
            }
            EvalMetric::KnowledgeF1 => {
                let scores = knowledge_f1(references, candidates, &options.stopwords);
                report.add("knowledge_recall", scores.recall);
                report.add("knowledge_precision", scores.precision);
                report.add("knowledge_f1", scores.f1);
            }
            EvalMetric::ClsAcc => {
                report.add("cls_acc", classification_accuracy(references, candidates)?)
            }
        }
    }
    Ok(report)
}
