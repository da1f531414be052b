use thiserror::Error;

/// Invalid generation or evaluation settings.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown generation method `{0}` (expected nucleus, greedy or oracle)")]
    UnknownMethod(String),

    #[error("unknown data mode `{0}` (expected seq2seq, unilm or classification)")]
    UnknownDataMode(String),

    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("metric `{0}` is computed by an external scoring library and is not available here")]
    ExternalMetric(String),

    #[error("temperature must be positive, got {0}")]
    InvalidTemperature(f64),

    #[error("top_p must not exceed 1.0, got {0}")]
    InvalidTopP(f64),
}
