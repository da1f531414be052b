mod error;
mod filter;
mod sampler;
mod scorer;
mod tokenizer;
pub mod api;
pub mod decode;
pub mod generate;
pub mod metrics;

pub use decode::{
    decode, greedy_generate, nucleus_generate, truncate_at_eos, DecodeInputs, NucleusParams,
    Strategy,
};
pub use error::ConfigError;
pub use filter::{top_k_top_p_filtering, FILTER_VALUE};
pub use generate::{
    generate_sentences, DataMode, Detokenizer, GenerateMethod, Generated, GeneratedSentence,
    GenerationConfig, GenerationConfigBuilder,
};
pub use metrics::{evaluate, EvalMetric, EvalOptions, MetricReport, MetricRow};
pub use sampler::{SeededSampler, TokenSampler};
pub use scorer::{Features, Scorer, StepOutput};
pub use tokenizer::{
    choose_hf_or_pathed_tokenizer, segment_offsets, EncodingResult, Tokenizer, TokenizerArgs,
};
