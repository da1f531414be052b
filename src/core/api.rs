use std::path::PathBuf;

use hf_hub::api::sync::Api;
use tracing::debug;

/// Downloads (or reuses cached) tokenizer vocabulary files of a hub model.
///
/// Returns the vocabulary path and, for BPE tokenizers, the merges path.
pub fn fetch_vocab_files(model_name: &str) -> crate::Result<(PathBuf, Option<PathBuf>)> {
    let api = Api::new()?;
    let repo = api.model(model_name.to_string());

    let vocab_path = repo
        .get("vocab.txt")
        .or_else(|_| repo.get("vocab.json"))
        .or_else(|_| repo.get("spiece.model"))
        .map_err(|e| anyhow::anyhow!("No vocabulary file found for {}: {}", model_name, e))?;
    let merges_path = repo.get("merges.txt").ok();

    debug!(?vocab_path, ?merges_path, "resolved tokenizer files for {}", model_name);
    Ok((vocab_path, merges_path))
}
