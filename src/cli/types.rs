//! Command-line interface for nlg-decode.
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_bert::pipelines::common::ModelType;

use crate::core::GenerateMethod;

#[derive(Parser)]
#[command(name = "nlg-decode", version, about = "Top-k/top-p filtering, sampling and text metrics")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliModelType {
    Bert,
    Roberta,
    Gpt2,
    Bart,
    T5,
}

impl From<CliModelType> for ModelType {
    fn from(model: CliModelType) -> Self {
        match model {
            CliModelType::Bert => ModelType::Bert,
            CliModelType::Roberta => ModelType::Roberta,
            CliModelType::Gpt2 => ModelType::GPT2,
            CliModelType::Bart => ModelType::Bart,
            CliModelType::T5 => ModelType::T5,
        }
    }
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Keep only the k highest scores per row (0 disables)
    #[arg(short = 'k', long, default_value_t = 0)]
    pub top_k: usize,

    /// Keep the smallest nucleus reaching this mass (<= 0 disables)
    #[arg(short = 'p', long, default_value_t = 0.0)]
    pub top_p: f64,
}

#[derive(Debug, Args)]
pub struct SampleArgs {
    #[arg(short, long, value_enum, default_value = "nucleus")]
    pub method: GenerateMethod,

    #[arg(short = 'k', long, default_value_t = 0)]
    pub top_k: usize,

    #[arg(short = 'p', long, default_value_t = 0.9)]
    pub top_p: f64,

    #[arg(short, long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Seed of the random source; drawn from the OS when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON generation config; overrides the sampling flags
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// File containing generated sentences, one per line
    #[arg(short, long)]
    pub candidates: String,

    /// File containing reference sentences, one per line
    #[arg(short, long)]
    pub references: String,

    /// Comma separated metric names (f1, dist, knowledge_f1, cls_acc)
    #[arg(short, long, value_delimiter = ',', default_value = "f1,dist")]
    pub metrics: Vec<String>,

    /// Stopword list used by knowledge_f1, one word per line
    #[arg(long)]
    pub stopwords: Option<String>,

    /// Write the report to this CSV file
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false, args = ["pretrained", "vocab"])]
pub struct TokenizerSpec {
    /// HF name of the pretrained tokenizer (e.g., "gpt2")
    #[arg(long)]
    pub pretrained: Option<String>,

    /// Path to vocabulary file
    #[arg(long)]
    pub vocab: Option<String>,

    /// Path to merges file (optional)
    #[arg(long)]
    pub merges: Option<String>,
}

#[derive(Debug, Args)]
pub struct DetokenizeArgs {
    #[clap(flatten)]
    pub tokenizer: TokenizerSpec,

    #[arg(long, default_value = "gpt2")]
    pub model_type: CliModelType,

    /// File of space separated ids, one sequence per line; stdin when omitted
    #[arg(short, long)]
    pub input: Option<String>,

    /// Keep special tokens in the output
    #[arg(long)]
    pub keep_special_tokens: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the surviving token indices of score rows read from stdin
    Filter(FilterArgs),

    /// Sample one token id per score row read from stdin
    Sample(SampleArgs),

    /// Compute text metrics for candidates against references
    Evaluate(EvaluateArgs),

    /// Turn id sequences back into text
    Detokenize(DetokenizeArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_alias() {
        let cli = Cli::try_parse_from(["nlg-decode", "-v", "sample", "--method", "sampling", "--seed", "3"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Sample(args) => {
                assert_eq!(args.method, GenerateMethod::Greedy);
                assert_eq!(args.seed, Some(3));
                assert_eq!(args.top_p, 0.9);
            }
            _ => panic!("expected the sample subcommand"),
        }
    }

    #[test]
    fn test_parse_metric_list() {
        let cli = Cli::try_parse_from([
            "nlg-decode", "evaluate", "-c", "c.txt", "-r", "r.txt", "--metrics", "f1,cls_acc",
        ])
        .unwrap();
        match cli.command {
            Command::Evaluate(args) => assert_eq!(args.metrics, vec!["f1", "cls_acc"]),
            _ => panic!("expected the evaluate subcommand"),
        }
    }

    #[test]
    fn test_detokenize_requires_tokenizer() {
        assert!(Cli::try_parse_from(["nlg-decode", "detokenize"]).is_err());
    }
}
