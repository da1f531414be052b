//! Autoregressive decoding loop.
//!
//! Both entry points share one loop and differ only in how next-token scores
//! become sampling probabilities:
//! * nucleus: temperature scaling, top-k/top-p filtering, softmax
//! * greedy: plain softmax over the raw scores. Despite the historical name
//!   this draws stochastically; it never takes the argmax.

use crate::core::filter::{top_k_top_p_filtering, FILTER_VALUE};
use crate::core::sampler::TokenSampler;
use crate::core::scorer::{Features, Scorer, StepOutput};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tch::{Kind, Tensor};
use tracing::{debug, trace, warn};

/// Tunables of nucleus sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NucleusParams {
    /// Divisor applied to the scores before filtering
    pub temperature: f64,
    /// Tokens kept by rank (0 disables)
    pub top_k: usize,
    /// Nucleus probability mass (<= 0 disables)
    pub top_p: f64,
}

impl Default for NucleusParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: 0,
            top_p: 0.7,
        }
    }
}

/// How next-token scores are turned into a sampling distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Nucleus(NucleusParams),
    Greedy,
}

impl Strategy {
    /// Maps a (batch_size, vocab_size) score matrix to row-wise probabilities.
    pub fn probabilities(&self, scores: &Tensor) -> Tensor {
        match self {
            Strategy::Nucleus(params) => {
                let scaled = scores / params.temperature;
                top_k_top_p_filtering(&scaled, params.top_k, params.top_p, FILTER_VALUE)
                    .softmax(-1, Kind::Float)
            }
            Strategy::Greedy => scores.softmax(-1, Kind::Float),
        }
    }
}

/// Inputs shared by both decoding entry points.
pub struct DecodeInputs<'a> {
    /// Primary context of shape (batch_size, seq_len)
    pub input_ids: &'a Tensor,
    /// Decoder-side context; when present it is extended instead of `input_ids`
    pub decoder_input_ids: Option<&'a Tensor>,
    pub eos_token_id: i64,
    /// Hard cap on decoding steps
    pub max_length: usize,
    /// Forwarded verbatim to the scorer on every step
    pub features: &'a Features,
    /// Checked before every step; generation stops once it is set
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> DecodeInputs<'a> {
    pub fn new(
        input_ids: &'a Tensor,
        features: &'a Features,
        eos_token_id: i64,
        max_length: usize,
    ) -> Self {
        Self {
            input_ids,
            decoder_input_ids: None,
            eos_token_id,
            max_length,
            features,
            cancel: None,
        }
    }

    pub fn decoder_input_ids(mut self, decoder_input_ids: &'a Tensor) -> Self {
        self.decoder_input_ids = Some(decoder_input_ids);
        self
    }

    pub fn cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Generates with temperature-scaled top-k/top-p sampling.
pub fn nucleus_generate<S, T>(
    inputs: &DecodeInputs<'_>,
    params: &NucleusParams,
    scorer: &mut S,
    sampler: &mut T,
) -> Result<Vec<Vec<i64>>>
where
    S: Scorer + ?Sized,
    T: TokenSampler + ?Sized,
{
    decode(inputs, Strategy::Nucleus(*params), scorer, sampler)
}

/// Generates by sampling the unfiltered softmax of the raw scores.
pub fn greedy_generate<S, T>(
    inputs: &DecodeInputs<'_>,
    scorer: &mut S,
    sampler: &mut T,
) -> Result<Vec<Vec<i64>>>
where
    S: Scorer + ?Sized,
    T: TokenSampler + ?Sized,
{
    decode(inputs, Strategy::Greedy, scorer, sampler)
}

/// Runs the decoding loop with the given strategy.
///
/// Returns one id sequence per batch row. A step in which every row samples
/// the end token ends the loop without being recorded. Rows that end earlier
/// keep being sampled; [`truncate_at_eos`] normalizes their tails afterwards.
/// Reaching `max_length` is not an error: the buffers come back as they are.
pub fn decode<S, T>(
    inputs: &DecodeInputs<'_>,
    strategy: Strategy,
    scorer: &mut S,
    sampler: &mut T,
) -> Result<Vec<Vec<i64>>>
where
    S: Scorer + ?Sized,
    T: TokenSampler + ?Sized,
{
    let batch_size = inputs.input_ids.size().first().copied().unwrap_or(0) as usize;
    let eos = inputs.eos_token_id;

    let mut input_ids = inputs.input_ids.shallow_clone();
    let mut decoder_input_ids = inputs.decoder_input_ids.map(Tensor::shallow_clone);
    let mut past: Option<StepOutput<S::Cache>> = None;
    let mut generated: Vec<Vec<i64>> = vec![Vec::with_capacity(inputs.max_length); batch_size];
    let mut finished = false;

    for step in 0..inputs.max_length {
        if inputs.is_cancelled() {
            debug!(step, "generation cancelled");
            finished = true;
            break;
        }

        let output = scorer.step(&input_ids, decoder_input_ids.as_ref(), past.take(), inputs.features)?;
        let scores = output.next_token_scores()?;
        past = Some(output);

        let probabilities = strategy.probabilities(&scores);
        let next_tokens = sampler.sample(&probabilities)?;
        if next_tokens.len() != batch_size {
            return Err(anyhow::anyhow!(
                "Sampled {} tokens for a batch of {} rows",
                next_tokens.len(),
                batch_size
            ));
        }
        trace!(step, tokens = ?next_tokens, "sampled");

        if next_tokens.iter().all(|&token| token == eos) {
            debug!(step, "every row emitted the end token");
            finished = true;
            break;
        }

        for (row, &token) in generated.iter_mut().zip(&next_tokens) {
            row.push(token);
        }

        let column = Tensor::from_slice(&next_tokens).view([-1, 1]);
        match decoder_input_ids.as_mut() {
            Some(context) => {
                let extended = extend_context(context, &column);
                *context = extended;
            }
            None => input_ids = extend_context(&input_ids, &column),
        }
    }

    if !finished && inputs.max_length > 0 && !generated.iter().any(|row| row.contains(&eos)) {
        warn!(
            max_length = inputs.max_length,
            "generation reached max_length without any row emitting the end token"
        );
    }

    truncate_at_eos(&mut generated, eos);
    Ok(generated)
}

fn extend_context(context: &Tensor, column: &Tensor) -> Tensor {
    let column = column.to_kind(context.kind()).to_device(context.device());
    Tensor::cat(&[context, &column], 1)
}

/// Overwrites everything from each row's first end token onward with the end token.
pub fn truncate_at_eos(sequences: &mut [Vec<i64>], eos_token_id: i64) {
    for sequence in sequences.iter_mut() {
        if let Some(first) = sequence.iter().position(|&token| token == eos_token_id) {
            sequence[first..].fill(eos_token_id);
        }
    }
}
