//! Autoregressive decoding core for natural-language generation.

pub mod cli;
pub mod core;

// Re-export main types
pub use crate::core::{
    decode, generate_sentences, greedy_generate, nucleus_generate, top_k_top_p_filtering,
    truncate_at_eos, DecodeInputs, Features, GenerationConfig, GenerationConfigBuilder,
    NucleusParams, Scorer, SeededSampler, StepOutput, TokenSampler, FILTER_VALUE,
};

// Re-export modules for convenience
pub use crate::core::generate;
pub use crate::core::metrics;

/// Convenient alias for a result with a boxed error.
pub type Result<T> = anyhow::Result<T>;
