//! High-level generation: method dispatch, length budget and rendering.

use crate::core::decode::{greedy_generate, nucleus_generate, DecodeInputs, NucleusParams};
use crate::core::error::ConfigError;
use crate::core::sampler::TokenSampler;
use crate::core::scorer::{Features, Scorer};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tch::Tensor;
use tracing::{debug, info};

/// Decoding method used by [`generate_sentences`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenerateMethod {
    /// Temperature + top-k/top-p sampling
    Nucleus,
    /// Unfiltered softmax sampling
    #[serde(alias = "sampling")]
    #[value(alias = "sampling")]
    Greedy,
    /// Model-native generation; falls back to nucleus sampling
    Oracle,
}

impl FromStr for GenerateMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nucleus" => Ok(Self::Nucleus),
            "greedy" | "sampling" => Ok(Self::Greedy),
            "oracle" => Ok(Self::Oracle),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

/// Shape of the model's task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// Encoder-decoder generation
    Seq2Seq,
    /// Prefix LM: the prompt shares the generation budget
    Unilm,
    /// Generated ids are labels, never rendered to text
    Classification,
}

impl FromStr for DataMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seq2seq" => Ok(Self::Seq2Seq),
            "unilm" => Ok(Self::Unilm),
            "classification" => Ok(Self::Classification),
            other => Err(ConfigError::UnknownDataMode(other.to_string())),
        }
    }
}

/// Configuration for [`generate_sentences`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub method: GenerateMethod,
    pub data_mode: DataMode,
    /// Tokens kept by rank (0 disables)
    pub top_k: usize,
    /// Nucleus probability mass (<= 0 disables)
    pub top_p: f64,
    pub temperature: f64,
    /// Steps allowed beyond the prompt
    pub max_generation_length: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            method: GenerateMethod::Nucleus,
            data_mode: DataMode::Seq2Seq,
            top_k: 0,
            top_p: 0.9,
            temperature: 1.0,
            max_generation_length: 50,
        }
    }
}

impl GenerationConfig {
    /// Loads a JSON configuration; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.temperature.is_nan() || self.temperature <= 0.0 {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.top_p > 1.0 {
            return Err(ConfigError::InvalidTopP(self.top_p));
        }
        Ok(())
    }

    pub fn nucleus_params(&self) -> NucleusParams {
        NucleusParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
        }
    }

    /// Step budget for a prompt of `prompt_len` tokens.
    pub fn max_length(&self, prompt_len: usize) -> usize {
        match self.data_mode {
            DataMode::Unilm => self.max_generation_length + prompt_len,
            _ => self.max_generation_length,
        }
    }
}

/// Builder for [`GenerationConfig`].
pub struct GenerationConfigBuilder {
    pub config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }

    pub fn method(mut self, method: GenerateMethod) -> Self {
        self.config.method = method;
        self
    }

    pub fn data_mode(mut self, data_mode: DataMode) -> Self {
        self.config.data_mode = data_mode;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.config.top_p = top_p;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_generation_length(mut self, length: usize) -> Self {
        self.config.max_generation_length = length;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> std::result::Result<GenerationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GenerationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders token ids back to text.
pub trait Detokenizer {
    fn decode(&self, token_ids: &[i64], skip_special_tokens: bool) -> String;

    fn eos_token_id(&self) -> Option<i64>;

    fn pad_token_id(&self) -> Option<i64> {
        None
    }
}

/// One generated row rendered two ways.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedSentence {
    /// Text with special tokens removed
    pub seqs: String,
    /// Text with special tokens kept, padding removed
    pub seqs_with_special_tokens: String,
}

/// Output of [`generate_sentences`].
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Sentences(Vec<GeneratedSentence>),
    /// Raw ids, produced in [`DataMode::Classification`]
    Labels(Vec<Vec<i64>>),
}

/// Generates continuations for a batch of prompts and renders them.
///
/// # Arguments
/// * `scorer` - Model producing next-token scores
/// * `sampler` - Random source for the multinomial draws
/// * `detokenizer` - Supplies the end token and renders the ids
/// * `input_ids` - Prompt ids of shape (batch_size, prompt_len)
/// * `features` - Auxiliary model inputs forwarded on every step
/// * `config` - Method and sampling parameters
pub fn generate_sentences<S, T, D>(
    scorer: &mut S,
    sampler: &mut T,
    detokenizer: &D,
    input_ids: &Tensor,
    features: &Features,
    config: &GenerationConfig,
) -> Result<Generated>
where
    S: Scorer + ?Sized,
    T: TokenSampler + ?Sized,
    D: Detokenizer + ?Sized,
{
    config.validate()?;
    let eos_token_id = detokenizer
        .eos_token_id()
        .ok_or_else(|| anyhow::anyhow!("Tokenizer has no end-of-sequence token"))?;

    let prompt_len = input_ids.size().last().copied().unwrap_or(0) as usize;
    let max_length = config.max_length(prompt_len);
    debug!(method = ?config.method, max_length, "generating");

    let inputs = DecodeInputs::new(input_ids, features, eos_token_id, max_length);
    let generated_ids = match config.method {
        GenerateMethod::Nucleus => {
            nucleus_generate(&inputs, &config.nucleus_params(), scorer, sampler)?
        }
        GenerateMethod::Greedy => greedy_generate(&inputs, scorer, sampler)?,
        GenerateMethod::Oracle => {
            info!("Model-native generation is not available, falling back to nucleus sampling");
            nucleus_generate(&inputs, &config.nucleus_params(), scorer, sampler)?
        }
    };

    if config.data_mode == DataMode::Classification {
        return Ok(Generated::Labels(generated_ids));
    }

    let pad_token_id = detokenizer.pad_token_id();
    let sentences = generated_ids
        .iter()
        .map(|ids| {
            let without_padding: Vec<i64> = ids
                .iter()
                .copied()
                .filter(|&id| Some(id) != pad_token_id)
                .collect();
            GeneratedSentence {
                seqs: detokenizer.decode(ids, true),
                seqs_with_special_tokens: detokenizer.decode(&without_padding, false),
            }
        })
        .collect();

    Ok(Generated::Sentences(sentences))
}
