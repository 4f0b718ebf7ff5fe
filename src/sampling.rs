//! Index sampling shared by OCR page selection and chunk selection.

/// Pick `k` indices out of `0..n`, evenly spaced and always including the first and last index.
///
/// Returns every index when `k >= n`, `[0]` when `k == 1`, and nothing when `k == 0` or `n == 0`.
pub fn select_evenly(n: usize, k: usize) -> Vec<usize> {
    if n == 0 || k == 0 {
        return Vec::new();
    }
    if k >= n {
        return (0..n).collect();
    }
    if k == 1 {
        return vec![0];
    }

    // With k <= n the step (n - 1) / (k - 1) is at least 1, so rounded positions never collide.
    let last = (n - 1) as f64;
    let steps = (k - 1) as f64;
    (0..k)
        .map(|i| ((i as f64) * last / steps).round() as usize)
        .collect()
}
