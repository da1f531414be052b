//! Boundary to the sequence model that scores the next position.

use crate::Result;
use std::collections::HashMap;
use tch::Tensor;

/// Auxiliary per-call model inputs, forwarded verbatim to every scorer step.
pub type Features = HashMap<String, Tensor>;

/// Result of one scorer step.
///
/// `cache` is whatever incremental state the scorer wants back on the next
/// step. The decoding loop carries it without looking inside.
pub struct StepOutput<C> {
    /// Logits of shape (batch_size, vocab_size) or (batch_size, seq_len, vocab_size)
    pub logits: Tensor,
    pub cache: Option<C>,
}

impl<C> StepOutput<C> {
    pub fn new(logits: Tensor) -> Self {
        Self {
            logits,
            cache: None,
        }
    }

    pub fn with_cache(logits: Tensor, cache: C) -> Self {
        Self {
            logits,
            cache: Some(cache),
        }
    }

    /// Scores for the next position, shaped (batch_size, vocab_size).
    ///
    /// Full-sequence logits are reduced to their last position.
    pub fn next_token_scores(&self) -> Result<Tensor> {
        match self.logits.dim() {
            2 => Ok(self.logits.shallow_clone()),
            3 => Ok(self.logits.select(1, -1)),
            _ => Err(anyhow::anyhow!(
                "Scorer returned logits of shape {:?}, expected 2 or 3 dimensions",
                self.logits.size()
            )),
        }
    }
}

/// A model that scores the next token given the running context.
pub trait Scorer {
    /// Opaque incremental state carried between steps.
    type Cache;

    /// Scores the next position.
    ///
    /// # Arguments
    /// * `input_ids` - Primary context of shape (batch_size, seq_len)
    /// * `decoder_input_ids` - Decoder-side context, for encoder-decoder models
    /// * `past` - Output of the previous step, `None` on the first call
    /// * `features` - Auxiliary inputs, identical on every call
    fn step(
        &mut self,
        input_ids: &Tensor,
        decoder_input_ids: Option<&Tensor>,
        past: Option<StepOutput<Self::Cache>>,
        features: &Features,
    ) -> Result<StepOutput<Self::Cache>>;
}

impl<S: Scorer + ?Sized> Scorer for &mut S {
    type Cache = S::Cache;

    fn step(
        &mut self,
        input_ids: &Tensor,
        decoder_input_ids: Option<&Tensor>,
        past: Option<StepOutput<Self::Cache>>,
        features: &Features,
    ) -> Result<StepOutput<Self::Cache>> {
        (**self).step(input_ids, decoder_input_ids, past, features)
    }
}
