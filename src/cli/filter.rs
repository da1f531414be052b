use anyhow::Result;
use std::io::{self, BufRead};
use tch::Tensor;
use tracing::debug;

use crate::cli::{FilterArgs, SampleArgs};
use crate::core::{
    top_k_top_p_filtering, GenerateMethod, GenerationConfig, GenerationConfigBuilder, SeededSampler,
    Strategy, TokenSampler, FILTER_VALUE,
};

/// Reads a (rows, vocab) score matrix: one row of space-separated floats per
/// line, ending at EOF or the first blank line.
pub fn read_scores<R: BufRead>(reader: R) -> Result<Tensor> {
    let mut values = Vec::new();
    let mut rows = 0;
    let mut cols = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }

        let row: Vec<f32> = line
            .split_whitespace()
            .map(|s| s.parse::<f32>())
            .collect::<Result<Vec<_>, _>>()?;

        if cols == 0 {
            cols = row.len();
        } else if row.len() != cols {
            return Err(anyhow::anyhow!(
                "Inconsistent number of columns: expected {}, got {} on row {}",
                cols,
                row.len(),
                rows + 1
            ));
        }

        values.extend(row);
        rows += 1;
    }

    if rows == 0 {
        return Err(anyhow::anyhow!("No scores found"));
    }
    debug!(rows, cols, "read score matrix");
    Ok(Tensor::from_slice(&values).view([rows as i64, cols as i64]))
}

/// Indices of the entries that survived filtering, per row.
fn surviving_indices(filtered: &Tensor) -> Result<Vec<Vec<usize>>> {
    let rows = Vec::<Vec<f32>>::try_from(filtered)?;
    Ok(rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, &v)| f64::from(v) > FILTER_VALUE)
                .map(|(i, _)| i)
                .collect()
        })
        .collect())
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints the token indices that survive top-k/top-p filtering of the score
/// rows read from stdin.
pub fn cmd_filter(args: FilterArgs) -> Result<()> {
    let scores = read_scores(io::stdin().lock())?;
    let filtered = top_k_top_p_filtering(&scores, args.top_k, args.top_p, FILTER_VALUE);

    for row in surviving_indices(&filtered)? {
        println!("{}", join(&row));
    }
    Ok(())
}

/// Samples one token id per score row read from stdin.
pub fn cmd_sample(args: SampleArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => GenerationConfig::from_file(path)?,
        None => GenerationConfigBuilder::new()
            .method(args.method)
            .top_k(args.top_k)
            .top_p(args.top_p)
            .temperature(args.temperature)
            .build()?,
    };
    let params = config.nucleus_params();
    let strategy = match config.method {
        GenerateMethod::Greedy => Strategy::Greedy,
        GenerateMethod::Nucleus | GenerateMethod::Oracle => Strategy::Nucleus(params),
    };

    let mut sampler = match args.seed {
        Some(seed) => SeededSampler::new(seed),
        None => SeededSampler::from_os_rng(),
    };

    let scores = read_scores(io::stdin().lock())?;
    let probabilities = strategy.probabilities(&scores);
    let tokens = sampler.sample(&probabilities)?;
    println!("{}", join(&tokens));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_scores() {
        let scores = read_scores(Cursor::new("1 5 3\n2 0 4\n\nignored\n")).unwrap();

        assert_eq!(scores.size(), vec![2, 3]);
        assert_eq!(scores.double_value(&[1, 2]), 4.0);
    }

    #[test]
    fn test_read_scores_rejects_ragged_rows() {
        assert!(read_scores(Cursor::new("1 2 3\n4 5\n")).is_err());
        assert!(read_scores(Cursor::new("1 x\n")).is_err());
        assert!(read_scores(Cursor::new("")).is_err());
    }

    #[test]
    fn test_surviving_indices() {
        let scores = read_scores(Cursor::new("1 5 3 2 4\n")).unwrap();
        let filtered = top_k_top_p_filtering(&scores, 2, 0.0, FILTER_VALUE);

        assert_eq!(surviving_indices(&filtered).unwrap(), vec![vec![1, 4]]);
        assert_eq!(join(&[1, 4]), "1 4");
    }
}
