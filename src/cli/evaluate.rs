use anyhow::Result;
use std::fs;

use crate::cli::EvaluateArgs;
use crate::core::{evaluate, EvalMetric, EvalOptions};

/// Command to compute text metrics of generated sentences.
///
/// # Arguments
/// `args` - The CLI arguments structure containing:
///  - `candidates`: Path to the file containing generated texts.
///  - `references`: Path to the file containing reference texts.
///  - `metrics`: Names of the metrics to compute.
///  - `stopwords`: Optional stopword list for knowledge F1.
///  - `output`: Optional CSV file receiving the report.
pub fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let metrics = args
        .metrics
        .iter()
        .map(|name| name.parse::<EvalMetric>())
        .collect::<Result<Vec<_>, _>>()?;

    let candidates = read_lines(&args.candidates)?;
    let references = read_lines(&args.references)?;

    let mut options = EvalOptions::default();
    if let Some(path) = &args.stopwords {
        options = options.load_stopwords(path)?;
    }

    let report = evaluate(&metrics, &candidates, &references, &options)?;
    for row in &report.rows {
        println!("{}: {}", row.metric, row.score);
    }

    if let Some(output) = &args.output {
        report.write_csv(output)?;
    }
    Ok(())
}

#[inline(always)]
fn read_lines(filename: &str) -> Result<Vec<String>> {
    let content = fs::read_to_string(filename)?;
    Ok(content.lines().map(String::from).collect())
}
