//! Metrics computed directly on model outputs.

use tch::{Kind, Tensor};

/// Token-level accuracy of argmax predictions.
///
/// # Arguments
/// * `logits` - Scores of shape (batch_size, max_len, vocab_size)
/// * `targets` - Gold ids of shape (batch_size, max_len)
/// * `padding_idx` - Positions holding this id are ignored
///
/// # Returns
/// Per-sequence accuracy averaged over the batch.
pub fn accuracy(logits: &Tensor, targets: &Tensor, padding_idx: Option<i64>) -> f64 {
    let (_, predictions) = logits.max_dim(2, false);
    let hits = predictions.eq_tensor(targets).to_kind(Kind::Float);

    let per_sequence = match padding_idx {
        Some(pad) => {
            let weights = targets.ne(pad).to_kind(Kind::Float);
            (&weights * &hits).sum_dim_intlist([1i64].as_slice(), false, Kind::Float)
                / weights.sum_dim_intlist([1i64].as_slice(), false, Kind::Float)
        }
        None => hits.mean_dim([1i64].as_slice(), false, Kind::Float),
    };
    per_sequence.mean(Kind::Float).double_value(&[])
}

/// Accuracy of a single-position prediction.
///
/// # Arguments
/// * `logits` - Scores of shape (batch_size, 1, vocab_size) or (batch_size, vocab_size)
/// * `targets` - Gold ids of shape (batch_size)
pub fn attn_accuracy(logits: &Tensor, targets: &Tensor) -> f64 {
    let logits = if logits.dim() == 3 {
        logits.squeeze_dim(1)
    } else {
        logits.shallow_clone()
    };
    let (_, predictions) = logits.max_dim(-1, false);
    predictions
        .eq_tensor(targets)
        .to_kind(Kind::Float)
        .mean(Kind::Float)
        .double_value(&[])
}

/// Per-sequence perplexity from log-probabilities.
///
/// The negative log-likelihood of every target is weighted by `weight[target]`
/// and summed per sequence. With `padding_idx`, padding gets weight zero (unless
/// an explicit `weight` is given) and the sums are divided by the number of
/// non-padding tokens in the whole batch before exponentiation.
///
/// # Arguments
/// * `log_probs` - Log-probabilities of shape (batch_size, max_len, vocab_size)
/// * `targets` - Gold ids of shape (batch_size, max_len)
/// * `weight` - Optional per-vocabulary weights of shape (vocab_size)
/// * `padding_idx` - Padding id
///
/// # Returns
/// Tensor of shape (batch_size)
pub fn perplexity_by_labels(
    log_probs: &Tensor,
    targets: &Tensor,
    weight: Option<&Tensor>,
    padding_idx: Option<i64>,
) -> Tensor {
    let size = log_probs.size();
    let (batch_size, vocab_size) = (size[0], size[2]);
    let device = log_probs.device();

    let weight = match (weight, padding_idx) {
        (Some(weight), _) => Some(weight.to_device(device)),
        (None, Some(pad)) => {
            let mut weights = vec![1f32; vocab_size as usize];
            if let Some(slot) = usize::try_from(pad).ok().and_then(|p| weights.get_mut(p)) {
                *slot = 0.0;
            }
            Some(Tensor::from_slice(&weights).to_device(device))
        }
        (None, None) => None,
    };

    let flat_targets = targets.contiguous().view([-1]);
    let picked = log_probs
        .view([-1, vocab_size])
        .gather(1, &flat_targets.unsqueeze(1), false)
        .squeeze_dim(1);
    let mut nll = -picked.to_kind(Kind::Float);
    if let Some(weight) = weight {
        nll = nll * weight.index_select(0, &flat_targets).to_kind(Kind::Float);
    }

    let mut nll = nll
        .view([batch_size, -1])
        .sum_dim_intlist([1i64].as_slice(), false, Kind::Float);
    if let Some(pad) = padding_idx {
        let word_count = targets.ne(pad).to_kind(Kind::Float).sum(Kind::Float);
        nll = nll / word_count;
    }
    nll.exp()
}

/// Mask of non-padding positions and the resulting sequence lengths.
///
/// # Arguments
/// * `seq` - Ids of shape (batch_size, seq_len)
/// * `pad_token_id` - Padding id
///
/// # Returns
/// `(mask, lengths)` with the mask in the kind of `seq`.
pub fn padding_mask(seq: &Tensor, pad_token_id: i64) -> (Tensor, Tensor) {
    let mask = seq.ne(pad_token_id).to_kind(seq.kind());
    let lengths = mask.sum_dim_intlist([1i64].as_slice(), false, Kind::Int64);
    (mask, lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_accuracy_ignores_padding() {
        // argmax per position: [1, 0, 1] and [0, 0, 0]
        let logits = Tensor::from_slice(&[
            0.1f32, 0.9, 0.8, 0.2, 0.3, 0.7, //
            0.6, 0.4, 0.9, 0.1, 0.5, 0.4,
        ])
        .view([2, 3, 2]);
        let targets = Tensor::from_slice(&[1i64, 1, 1, 0, 0, 1]).view([2, 3]);

        let plain = accuracy(&logits, &targets, None);
        assert!((plain - (2.0 / 3.0 + 2.0 / 3.0) / 2.0).abs() < 1e-6);

        // treat id 1 as padding: row 0 scores one hit of two, row 1 two of two
        let targets = Tensor::from_slice(&[0i64, 0, 1, 0, 0, 1]).view([2, 3]);
        let padded = accuracy(&logits, &targets, Some(1));
        assert!((padded - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_attn_accuracy() {
        let logits = Tensor::from_slice(&[0.2f32, 0.8, 0.7, 0.3]).view([2, 1, 2]);
        let targets = Tensor::from_slice(&[1i64, 1]);

        assert!((attn_accuracy(&logits, &targets) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_perplexity_of_certain_prediction_is_one() {
        let log_probs = Tensor::zeros([1, 2, 3], (Kind::Float, Device::Cpu));
        let targets = Tensor::from_slice(&[2i64, 1]).view([1, 2]);

        let ppl = perplexity_by_labels(&log_probs, &targets, None, None);
        assert!((ppl.double_value(&[0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_perplexity_with_padding() {
        let log_probs = Tensor::full([1, 3, 4], 0.25f64.ln(), (Kind::Float, Device::Cpu));
        let targets = Tensor::from_slice(&[1i64, 2, 0]).view([1, 3]);

        // two real tokens at ln(1/4) each, averaged: exp(ln 4) = 4
        let ppl = perplexity_by_labels(&log_probs, &targets, None, Some(0));
        assert!((ppl.double_value(&[0]) - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_padding_mask() {
        let seq = Tensor::from_slice(&[5i64, 6, 0, 7, 0, 0]).view([2, 3]);
        let (mask, lengths) = padding_mask(&seq, 0);

        assert_eq!(Vec::<i64>::try_from(&mask.view([-1])).unwrap(), vec![1, 1, 0, 1, 0, 0]);
        assert_eq!(Vec::<i64>::try_from(&lengths).unwrap(), vec![2, 1]);
    }
}
