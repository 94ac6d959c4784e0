//! Descriptive statistics used by the spread engine.

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (divides by `n - 1`).
///
/// A single observation or a constant series returns exactly 0.0, regardless
/// of rounding in the mean. Empty input is NaN.
pub fn sample_std(xs: &[f64]) -> f64 {
    match xs.len() {
        0 => f64::NAN,
        1 => 0.0,
        _ if is_constant(xs) => 0.0,
        n => {
            let m = mean(xs);
            let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
            (ss / (n - 1) as f64).sqrt()
        }
    }
}

/// Pearson correlation coefficient of two equal-length series.
///
/// Symmetric in its arguments and exactly 1.0 for identical non-constant
/// input. Returns 0.0 when either series is constant (no co-movement to
/// measure) and NaN when the lengths differ or fewer than two points exist.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len();
    if n != ys.len() || n < 2 {
        return f64::NAN;
    }

    let mx = mean(xs);
    let my = mean(ys);

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }

    // sqrt(vx * vy) rather than sqrt(vx) * sqrt(vy): for xs == ys the product
    // is vx² and sqrt(vx²) == vx exactly, so the ratio is exactly 1.
    let denom = (vx * vy).sqrt();
    if denom == 0.0 || is_constant(xs) || is_constant(ys) {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

fn is_constant(xs: &[f64]) -> bool {
    xs.iter().all(|x| *x == xs[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
        assert!(
            (actual - expected).abs() < epsilon,
            "assert_approx failed: actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn mean_basic() {
        assert_approx(mean(&[1.0, 2.0, 3.0, 4.0]), 2.5, 1e-12);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        // population std of [2,4,4,4,5,5,7,9] is 2.0; sample std is sqrt(32/7)
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx(sample_std(&xs), (32.0_f64 / 7.0).sqrt(), 1e-12);
    }

    #[test]
    fn sample_std_edge_cases() {
        assert_eq!(sample_std(&[5.0]), 0.0);
        assert_eq!(sample_std(&[3.0, 3.0, 3.0]), 0.0);
        assert_eq!(sample_std(&[0.1; 7]), 0.0);
        assert!(sample_std(&[]).is_nan());
    }

    #[test]
    fn pearson_identity_and_symmetry() {
        let a = [1.0, 2.5, 2.0, 4.0, 3.5];
        let b = [10.0, 9.0, 12.0, 11.0, 15.0];
        assert_eq!(pearson(&a, &a), 1.0);
        assert_eq!(pearson(&a, &b), pearson(&b, &a));
    }

    #[test]
    fn pearson_perfect_negative() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [8.0, 6.0, 4.0, 2.0];
        assert_approx(pearson(&a, &b), -1.0, 1e-12);
    }

    #[test]
    fn pearson_known_value() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 5.0, 4.0, 5.0];
        // cov = 6, var_a = 10, var_b = 6 → 6 / sqrt(60)
        assert_approx(pearson(&a, &b), 6.0 / 60.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn pearson_degenerate_inputs() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert!(pearson(&[1.0, 2.0], &[1.0]).is_nan());
        assert!(pearson(&[1.0], &[1.0]).is_nan());
    }
}
