//! Top-k and nucleus (top-p) filtering of next-token scores.

use tch::{Kind, Tensor};

/// Value written over excluded scores by the decoding loop.
pub const FILTER_VALUE: f64 = -10000.0;

/// Filters a batch of next-token scores, keeping the `top_k` highest scoring
/// tokens and the smallest nucleus whose cumulative probability reaches `top_p`.
///
/// Rows are filtered independently. Ties at the top-k cutoff all survive, and
/// the highest ranked token of a row always survives the nucleus stage.
///
/// # Arguments
/// * `scores` - Score matrix of shape (batch_size, vocab_size)
/// * `top_k` - Number of tokens kept by rank (0 disables, clamped to vocab_size)
/// * `top_p` - Nucleus probability mass threshold (<= 0 disables)
/// * `filter_value` - Score written over every excluded position
///
/// # Panics
/// If `scores` is not a 2-D tensor.
pub fn top_k_top_p_filtering(
    scores: &Tensor,
    top_k: usize,
    top_p: f64,
    filter_value: f64,
) -> Tensor {
    assert_eq!(
        scores.dim(),
        2,
        "expected scores of shape (batch_size, vocab_size), got {:?}",
        scores.size()
    );

    let vocab_size = scores.size()[1];
    let top_k = (top_k as i64).min(vocab_size);
    let mut filtered = scores.shallow_clone();

    if top_k > 0 {
        let (top_values, _) = filtered.topk(top_k, -1, true, true);
        let threshold = top_values.narrow(1, top_k - 1, 1);
        let remove = filtered.lt_tensor(&threshold);
        filtered = filtered.masked_fill(&remove, filter_value);
    }

    if top_p > 0.0 {
        let remove = nucleus_removal_mask(&filtered, top_p);
        filtered = filtered.masked_fill(&remove, filter_value);
    }

    filtered
}

/// Boolean mask (in vocabulary order) of the tokens outside the top-p nucleus.
fn nucleus_removal_mask(scores: &Tensor, top_p: f64) -> Tensor {
    let size = scores.size();
    let (batch_size, vocab_size) = (size[0], size[1]);

    let (sorted_scores, sorted_indices) = scores.sort_stable(true, -1, true);
    let cumulative_probs = sorted_scores
        .softmax(-1, Kind::Float)
        .cumsum(-1, Kind::Float);
    let exceeded = cumulative_probs.gt(top_p);

    // Shift right by one: a token is dropped only once the mass before it
    // already exceeds top_p. The first sorted token is never dropped.
    let keep_first = Tensor::zeros([batch_size, 1], (Kind::Bool, scores.device()));
    let sorted_remove = Tensor::cat(&[keep_first, exceeded.narrow(1, 0, vocab_size - 1)], 1);

    sorted_remove.scatter(1, &sorted_indices, &sorted_remove)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(tensor: &Tensor, index: i64) -> Vec<f64> {
        Vec::<f64>::try_from(&tensor.get(index).to_kind(Kind::Double)).unwrap()
    }

    fn survivors(tensor: &Tensor, index: i64) -> Vec<usize> {
        row(tensor, index)
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > FILTER_VALUE)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_top_k_keeps_largest() {
        let scores = Tensor::from_slice2(&[&[1.0f32, 5.0, 3.0, 2.0, 4.0], &[0.5, 0.1, 0.9, 0.3, 0.7]]);
        let filtered = top_k_top_p_filtering(&scores, 2, 0.0, FILTER_VALUE);

        assert_eq!(filtered.size(), vec![2, 5]);
        assert_eq!(survivors(&filtered, 0), vec![1, 4]);
        assert_eq!(survivors(&filtered, 1), vec![2, 4]);
        assert_eq!(row(&filtered, 0), vec![FILTER_VALUE, 5.0, FILTER_VALUE, FILTER_VALUE, 4.0]);
    }

    #[test]
    fn test_top_k_keeps_ties_at_cutoff() {
        let scores = Tensor::from_slice2(&[&[3.0f32, 2.0, 2.0, 1.0]]);
        let filtered = top_k_top_p_filtering(&scores, 2, 0.0, FILTER_VALUE);

        assert_eq!(survivors(&filtered, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_top_k_clamped_to_vocab() {
        let scores = Tensor::from_slice2(&[&[0.2f32, 0.1, 0.4]]);
        let filtered = top_k_top_p_filtering(&scores, 50, 0.0, FILTER_VALUE);

        assert_eq!(survivors(&filtered, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_disabled_filter_is_noop() {
        let scores = Tensor::from_slice2(&[&[0.3f32, -1.2, 7.5], &[2.0, 2.0, -4.0]]);
        let filtered = top_k_top_p_filtering(&scores, 0, 0.0, FILTER_VALUE);

        assert!(filtered.equal(&scores));
    }

    #[test]
    fn test_top_p_keeps_crossing_token() {
        // softmax of ln([0.5, 0.3, 0.2]) is [0.5, 0.3, 0.2]; cumulative [0.5, 0.8, 1.0]
        let scores = Tensor::from_slice2(&[&[0.5f32.ln(), 0.3f32.ln(), 0.2f32.ln()]]);

        let filtered = top_k_top_p_filtering(&scores, 0, 0.6, FILTER_VALUE);
        assert_eq!(survivors(&filtered, 0), vec![0, 1]);

        let filtered = top_k_top_p_filtering(&scores, 0, 0.4, FILTER_VALUE);
        assert_eq!(survivors(&filtered, 0), vec![0]);
    }

    #[test]
    fn test_top_p_equal_scores_keeps_first_index() {
        let scores = Tensor::from_slice2(&[&[1.0f32, 1.0, 1.0, 1.0]]);
        let filtered = top_k_top_p_filtering(&scores, 0, 1e-6, FILTER_VALUE);

        assert_eq!(survivors(&filtered, 0), vec![0]);
    }

    #[test]
    fn test_top_p_applies_after_top_k() {
        let scores = Tensor::from_slice2(&[&[4.0f32, 3.0, 2.0, 1.0, 0.0]]);
        let filtered = top_k_top_p_filtering(&scores, 4, 0.9, FILTER_VALUE);

        // top-k drops token 4; renormalized over the rest the mass is
        // ~0.644, 0.881, 0.968, 1.0 so the nucleus stops after token 2
        assert_eq!(survivors(&filtered, 0), vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "expected scores of shape")]
    fn test_rejects_wrong_rank() {
        let scores = Tensor::from_slice(&[1.0f32, 2.0, 3.0]);
        let _ = top_k_top_p_filtering(&scores, 1, 0.0, FILTER_VALUE);
    }

    fn score_rows() -> impl Strategy<Value = Vec<Vec<f32>>> {
        (1usize..4, 2usize..12).prop_flat_map(|(batch, vocab)| {
            prop::collection::vec(prop::collection::vec(-20.0f32..20.0, vocab), batch)
        })
    }

    fn to_tensor(rows: &[Vec<f32>]) -> Tensor {
        let refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        Tensor::from_slice2(&refs)
    }

    proptest! {
        #[test]
        fn prop_shape_and_survivor(rows in score_rows(), top_k in 0usize..15, top_p in 0.0f64..1.0) {
            let scores = to_tensor(&rows);
            let filtered = top_k_top_p_filtering(&scores, top_k, top_p, FILTER_VALUE);

            prop_assert_eq!(filtered.size(), scores.size());
            for i in 0..rows.len() as i64 {
                prop_assert!(!survivors(&filtered, i).is_empty());
            }
        }

        #[test]
        fn prop_top_p_monotonic(rows in score_rows(), p in 0.01f64..1.0, delta in 0.0f64..0.5) {
            let scores = to_tensor(&rows);
            let narrow = top_k_top_p_filtering(&scores, 0, p, FILTER_VALUE);
            let wide = top_k_top_p_filtering(&scores, 0, (p + delta).min(1.0), FILTER_VALUE);

            for i in 0..rows.len() as i64 {
                let kept_narrow = survivors(&narrow, i);
                let kept_wide = survivors(&wide, i);
                prop_assert!(kept_wide.len() >= kept_narrow.len());
                prop_assert!(kept_narrow.iter().all(|idx| kept_wide.contains(idx)));
            }
        }

        #[test]
        fn prop_top_k_without_ties(k in 1usize..8, seed in 0u64..1000) {
            // distinct scores: a permutation of 0..vocab
            let vocab = 8usize;
            let mut values: Vec<f32> = (0..vocab).map(|v| v as f32).collect();
            let shift = (seed as usize) % vocab;
            values.rotate_left(shift);
            let scores = Tensor::from_slice2(&[values.as_slice()]);

            let filtered = top_k_top_p_filtering(&scores, k, 0.0, FILTER_VALUE);
            let kept = survivors(&filtered, 0);
            prop_assert_eq!(kept.len(), k.min(vocab));
            let threshold = (vocab - k.min(vocab)) as f32;
            prop_assert!(kept.iter().all(|&i| values[i] >= threshold));
        }
    }
}
