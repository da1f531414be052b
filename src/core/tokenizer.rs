//! Prompt tokenization, detokenization of generated ids and span lookup.

use std::path::PathBuf;

use crate::cli::types::TokenizerSpec;
use crate::core::generate::Detokenizer;
use crate::Result;
use anyhow::Error;
use rust_bert::pipelines::common::{ModelType, TokenizerOption};
use rust_tokenizers::tokenizer::TruncationStrategy;
use tch::{Device, Tensor};

use super::api::fetch_vocab_files;

/// Wrapper around a rust-bert tokenizer used on both ends of generation.
pub struct Tokenizer {
    pub(crate) tokenizer: TokenizerOption,
    max_len: usize,
    truncation_strategy: TruncationStrategy,
    stride: usize,
}

/// Batched tokenization outputs.
pub struct EncodingResult {
    /// Padded input IDs of shape (batch_size, seq_len).
    pub input_ids: Tensor,
    /// Attention mask of shape (batch_size, seq_len).
    pub attention_mask: Tensor,
    /// Token type IDs of shape (batch_size, seq_len).
    pub token_type_ids: Tensor,
    /// Unpadded token IDs per sequence, special tokens included.
    pub token_ids: Vec<Vec<i64>>,
    /// Number of tokens before padding.
    pub lengths: Vec<usize>,
    /// Character span of every token in its source text; `None` for special tokens.
    pub offsets: Vec<Vec<Option<(usize, usize)>>>,
}

/// Pads a vector to `target_len` with `pad_value`; longer vectors are kept as is.
#[inline(always)]
fn pad_vec<T: Clone>(vec: &[T], pad_value: T, target_len: usize) -> Vec<T> {
    let mut padded = vec.to_owned();
    if padded.len() < target_len {
        padded.resize(target_len, pad_value);
    }
    padded
}

/// Stacks equally long rows into a (rows, len) tensor on `device`.
#[inline(always)]
fn to_batched_tensor<T: Copy + tch::kind::Element>(rows: &[Vec<T>], device: Device) -> Tensor {
    Tensor::stack(
        &rows.iter().map(|v| Tensor::from_slice(v)).collect::<Vec<_>>(),
        0,
    )
    .to_device(device)
}

pub struct TokenizerArgs {
    pub model: ModelType,
    pub vocab_path: PathBuf,
    pub merges_path: Option<PathBuf>,
    pub lower_case: bool,
    pub strip_accents: Option<bool>,
    pub add_prefix_space: Option<bool>,
    pub max_len: usize,
    pub truncation_strategy: TruncationStrategy,
    pub stride: usize,
}

impl TokenizerArgs {
    /// Arguments for single-sentence prompts with the usual defaults of `model`.
    pub fn new(model: ModelType, vocab_path: PathBuf, merges_path: Option<PathBuf>) -> Self {
        Self {
            model,
            vocab_path,
            merges_path,
            lower_case: false,
            strip_accents: None,
            add_prefix_space: match model {
                ModelType::Roberta | ModelType::GPT2 | ModelType::Bart => Some(true),
                _ => None,
            },
            max_len: 512,
            truncation_strategy: TruncationStrategy::LongestFirst,
            stride: 0,
        }
    }
}

impl Tokenizer {
    /// Creates a tokenizer from local vocabulary (and merges) files.
    pub fn new(args: TokenizerArgs) -> Result<Self> {
        let tokenizer = TokenizerOption::from_file(
            args.model,
            args.vocab_path
                .to_str()
                .ok_or(Error::msg("Invalid vocab path"))?,
            args.merges_path
                .as_ref()
                .map(|p| p.to_str().ok_or(Error::msg("Invalid merges path")))
                .transpose()?,
            args.lower_case,
            args.strip_accents,
            args.add_prefix_space,
        )?;
        Ok(Tokenizer {
            tokenizer,
            max_len: args.max_len,
            truncation_strategy: args.truncation_strategy,
            stride: args.stride,
        })
    }

    /// Tokenizes a batch of prompts, right-padding them to the longest one.
    pub fn encode<S: AsRef<str> + Send + Sync>(&self, texts: &[S], device: Device) -> EncodingResult {
        let inputs =
            self.tokenizer
                .encode_list(texts, self.max_len, &self.truncation_strategy, self.stride);
        let pad_id = self.tokenizer.get_pad_id().unwrap_or(0);
        let max_len = inputs.iter().map(|i| i.token_ids.len()).max().unwrap_or(0);

        let mut token_ids = Vec::with_capacity(inputs.len());
        let mut lengths = Vec::with_capacity(inputs.len());
        let mut offsets = Vec::with_capacity(inputs.len());
        let mut id_rows = Vec::with_capacity(inputs.len());
        let mut mask_rows = Vec::with_capacity(inputs.len());
        let mut type_rows = Vec::with_capacity(inputs.len());

        for input in inputs {
            let seq_len = input.token_ids.len();
            let segments: Vec<i64> = input.segment_ids.iter().map(|&s| s as i64).collect();

            id_rows.push(pad_vec(&input.token_ids, pad_id, max_len));
            mask_rows.push(pad_vec(&vec![1i64; seq_len], 0, max_len));
            type_rows.push(pad_vec(&segments, 0, max_len));
            offsets.push(
                input
                    .token_offsets
                    .iter()
                    .map(|o| o.as_ref().map(|o| (o.begin as usize, o.end as usize)))
                    .collect(),
            );
            lengths.push(seq_len);
            token_ids.push(input.token_ids);
        }

        EncodingResult {
            input_ids: to_batched_tensor(&id_rows, device),
            attention_mask: to_batched_tensor(&mask_rows, device),
            token_type_ids: to_batched_tensor(&type_rows, device),
            token_ids,
            lengths,
            offsets,
        }
    }
}

impl Detokenizer for Tokenizer {
    fn decode(&self, token_ids: &[i64], skip_special_tokens: bool) -> String {
        self.tokenizer.decode(token_ids, skip_special_tokens, true)
    }

    fn eos_token_id(&self) -> Option<i64> {
        self.tokenizer.get_eos_id()
    }

    fn pad_token_id(&self) -> Option<i64> {
        self.tokenizer.get_pad_id()
    }
}

/// Resolves vocabulary files from a hub name or from local paths.
pub fn choose_hf_or_pathed_tokenizer(spec: &TokenizerSpec) -> Result<(PathBuf, Option<PathBuf>)> {
    if let Some(pretrained) = &spec.pretrained {
        fetch_vocab_files(pretrained)
    } else if let Some(vocab) = &spec.vocab {
        Ok((PathBuf::from(vocab), spec.merges.as_ref().map(PathBuf::from)))
    } else {
        Err(anyhow::anyhow!(
            "Either a pretrained tokenizer or a vocabulary file must be specified"
        ))
    }
}

/// Locates text segments as token spans.
///
/// For every segment, occurrences in `target` are scanned left to right. An
/// occurrence yields `(first_token, last_token)` when it starts exactly on a
/// token start and ends exactly on a token end; scanning of that segment stops
/// at the first occurrence that is not token aligned. Token indices refer to
/// `offset_mapping`; offsets are character positions, as produced by
/// [`Tokenizer::encode`].
pub fn segment_offsets<S: AsRef<str>>(
    offset_mapping: &[Option<(usize, usize)>],
    segments: &[S],
    target: &str,
) -> Vec<(usize, usize)> {
    let target: Vec<char> = target.chars().collect();

    let mut found = Vec::new();
    for segment in segments {
        let needle: Vec<char> = segment.as_ref().chars().collect();
        if needle.is_empty() {
            continue;
        }

        let mut from = 0;
        while let Some(start) = find_chars(&target, &needle, from) {
            let end = start + needle.len();
            let first = offset_mapping
                .iter()
                .position(|span| matches!(span, Some((s, _)) if *s == start));
            let last = offset_mapping
                .iter()
                .rposition(|span| matches!(span, Some((_, e)) if *e == end));
            match (first, last) {
                (Some(first), Some(last)) => found.push((first, last)),
                _ => break,
            }
            from = end;
        }
    }
    found
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_offsets(text: &str) -> Vec<Option<(usize, usize)>> {
        let mut offsets = vec![None];
        let mut start = None;
        for (i, c) in text.chars().chain(std::iter::once(' ')).enumerate() {
            match (c.is_whitespace(), start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    offsets.push(Some((s, i)));
                    start = None;
                }
                _ => {}
            }
        }
        offsets.push(None);
        offsets
    }

    #[test]
    fn test_pad_vec() {
        assert_eq!(pad_vec(&[1, 2], 0, 4), vec![1, 2, 0, 0]);
        assert_eq!(pad_vec(&[1, 2, 3], 0, 2), vec![1, 2, 3]);
    }

    #[test]
    fn test_to_batched_tensor() {
        let tensor = to_batched_tensor(&[vec![1i64, 2, 3], vec![4, 5, 6]], Device::Cpu);

        assert_eq!(tensor.size(), vec![2, 3]);
        assert_eq!(tensor.int64_value(&[1, 2]), 6);
    }

    #[test]
    fn test_segment_offsets_finds_all_occurrences() {
        let target = "the cat saw the cat";
        let offsets = word_offsets(target);

        // index 0 is a special token
        let spans = segment_offsets(&offsets, &["the cat", "saw"], target);
        assert_eq!(spans, vec![(1, 2), (4, 5), (3, 3)]);
    }

    #[test]
    fn test_segment_offsets_stops_on_misaligned_match() {
        let target = "scatter cat";
        let offsets = word_offsets(target);

        // "cat" first occurs inside "scatter", which is not token aligned
        let spans = segment_offsets(&offsets, &["cat"], target);
        assert!(spans.is_empty());
    }

    #[test]
    fn test_segment_offsets_counts_characters() {
        let target = "café au lait";
        let offsets = word_offsets(target);

        let spans = segment_offsets(&offsets, &["lait", ""], target);
        assert_eq!(spans, vec![(3, 3)]);
    }

    #[test]
    fn test_choose_tokenizer_from_paths() {
        let spec = TokenizerSpec {
            pretrained: None,
            vocab: Some("vocab.json".into()),
            merges: Some("merges.txt".into()),
        };
        let (vocab, merges) = choose_hf_or_pathed_tokenizer(&spec).unwrap();

        assert_eq!(vocab, PathBuf::from("vocab.json"));
        assert_eq!(merges, Some(PathBuf::from("merges.txt")));
    }

    #[test]
    fn test_choose_tokenizer_requires_source() {
        let spec = TokenizerSpec {
            pretrained: None,
            vocab: None,
            merges: None,
        };
        assert!(choose_hf_or_pathed_tokenizer(&spec).is_err());
    }
}
