/// Percentiles reported for every run.
pub const REPORTED_PERCENTILES: [f64; 5] = [50.0, 90.0, 95.0, 99.0, 99.9];

/// Linear interpolation between adjacent order statistics.
///
/// `sorted` must be in ascending order. `p` is in percent and is clamped to `0..=100`.
/// Returns `0.0` for an empty input.
#[must_use]
pub fn interpolate_percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let k = (n - 1) as f64 * p / 100.0;
    let f = (k.floor() as usize).min(n - 1);
    let c = (f + 1).min(n - 1);

    if f == c {
        return sorted[f];
    }

    sorted[f] * (c as f64 - k) + sorted[c] * (k - f as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn median_of_even_count_interpolates() {
        let v = [0.01, 0.02, 0.03, 0.04];
        assert!(close(interpolate_percentile(&v, 50.0), 0.025));
    }

    #[test]
    fn extremes_hit_first_and_last_sample() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(interpolate_percentile(&v, 0.0), 1.0));
        assert!(close(interpolate_percentile(&v, 100.0), 5.0));
        assert!(close(interpolate_percentile(&v, 150.0), 5.0));
        assert!(close(interpolate_percentile(&v, -3.0), 1.0));
    }

    #[test]
    fn exact_rank_returns_sample() {
        let v = [10.0, 20.0, 30.0, 40.0, 50.0];
        // k = 4 * 0.75 = 3
        assert!(close(interpolate_percentile(&v, 75.0), 40.0));
    }

    #[test]
    fn high_percentiles_interpolate_near_the_tail() {
        let v: Vec<f64> = (1..=1000).map(f64::from).collect();
        // k = 999 * 0.999 = 998.001 => 999 + 0.001
        assert!((interpolate_percentile(&v, 99.9) - 999.001).abs() < 1e-9);
        // k = 999 * 0.9 = 899.1 => 900 + 0.1
        assert!((interpolate_percentile(&v, 90.0) - 900.1).abs() < 1e-9);
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(close(interpolate_percentile(&[], 99.0), 0.0));
        assert!(close(interpolate_percentile(&[0.5], 99.0), 0.5));
    }
}
