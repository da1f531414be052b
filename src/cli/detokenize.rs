use anyhow::Result;
use std::io::{self, Read};

use crate::cli::DetokenizeArgs;
use crate::core::{choose_hf_or_pathed_tokenizer, Detokenizer, Tokenizer, TokenizerArgs};

/// Parses one id sequence per non-empty line.
pub fn parse_id_lines(content: &str) -> Result<Vec<Vec<i64>>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|id| id.parse::<i64>().map_err(anyhow::Error::from))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

/// Renders id sequences with a local or hub tokenizer, one text per line.
pub fn cmd_detokenize(args: DetokenizeArgs) -> Result<()> {
    let (vocab_path, merges_path) = choose_hf_or_pathed_tokenizer(&args.tokenizer)?;
    let tokenizer = Tokenizer::new(TokenizerArgs::new(
        args.model_type.into(),
        vocab_path,
        merges_path,
    ))?;

    let content = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    for ids in parse_id_lines(&content)? {
        println!("{}", tokenizer.decode(&ids, !args.keep_special_tokens));
    }
    Ok(())
}
