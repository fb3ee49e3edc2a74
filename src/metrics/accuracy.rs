//! Top-k classification accuracy

use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// Accuracy over the k top predictions for each k in `topk`, in percent
///
/// `k` is clamped to the number of classes, so with fewer than five classes
/// top-5 accuracy degenerates to 100.
///
/// # Example
///
/// ```
/// use destilar::metrics::accuracy;
/// use ndarray::array;
///
/// let logits = array![[0.1, 0.9, 0.0], [0.8, 0.1, 0.1]];
/// let acc = accuracy(&logits, &array![1, 2], &[1, 2]).unwrap();
/// assert_eq!(acc, vec![50.0, 50.0]);
/// ```
pub fn accuracy(logits: &Array2<f32>, targets: &Array1<usize>, topk: &[usize]) -> Result<Vec<f64>> {
    let batch = logits.nrows();
    if batch != targets.len() {
        return Err(Error::shape(&[targets.len(), logits.ncols()], logits.shape()));
    }
    if batch == 0 {
        return Ok(vec![0.0; topk.len()]);
    }
    let max_k = topk.iter().copied().max().unwrap_or(0).min(logits.ncols());

    // rank of the target among the top max_k predictions, if present
    let ranks: Vec<Option<usize>> = logits
        .rows()
        .into_iter()
        .zip(targets.iter())
        .map(|(row, &target)| {
            let mut order: Vec<usize> = (0..row.len()).collect();
            order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
            order.iter().take(max_k).position(|&c| c == target)
        })
        .collect();

    Ok(topk
        .iter()
        .map(|&k| {
            let k = k.min(max_k);
            let correct = ranks.iter().filter(|r| matches!(r, Some(p) if *p < k)).count();
            correct as f64 * 100.0 / batch as f64
        })
        .collect())
}
