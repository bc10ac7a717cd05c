//! Numerical helpers: moments, Student tests, log-gamma family and partition counts.

/// Lanczos coefficients of [`ln_gamma`].
const LANCZOS: [f64; 6] = [
    76.180_091_729_471_46,
    -86.505_320_329_416_77,
    24.014_098_240_830_91,
    -1.231_739_572_450_155,
    0.120_865_097_386_617_9e-2,
    -0.539_523_938_495_3e-5,
];
const LANCZOS_SCALE: f64 = 2.506_628_274_631_000_5;

/// Arithmetic mean, 0 for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Geometric mean of positive values, 0 if any value is not positive.
#[must_use]
pub fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|value| *value <= 0.0) {
        return 0.0;
    }
    (values.iter().map(|value| value.ln()).sum::<f64>() / values.len() as f64).exp()
}

/// Population standard deviation.
#[must_use]
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let square_sum: f64 = values.iter().map(|value| value * value).sum();
    ((square_sum - sum * sum / n).abs() / n).sqrt()
}

/// Minimum, 0 for an empty slice.
#[must_use]
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Maximum, 0 for an empty slice.
#[must_use]
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Paired Student statistic of the differences `first - second`.
#[must_use]
pub fn t_value(first: &[f64], second: &[f64]) -> f64 {
    debug_assert_eq!(first.len(), second.len());
    let differences: Vec<f64> = first.iter().zip(second).map(|(a, b)| a - b).collect();
    if differences.is_empty() {
        return 0.0;
    }
    mean(&differences) * (differences.len() as f64).sqrt()
        / (standard_deviation(&differences) + 1e-5)
}

/// Two-sided probability of exceeding `|t|` with `degrees` degrees of freedom.
#[must_use]
pub fn student(t: f64, degrees: usize) -> f64 {
    if degrees == 0 {
        return 1.0;
    }
    let df = degrees as f64;
    beta_i(0.5 * df, 0.5, df / (df + t * t))
}

/// Threshold `t` such that [`student`]`(t, degrees) == probability`.
#[must_use]
pub fn inv_student(probability: f64, degrees: usize) -> f64 {
    debug_assert!(probability > 0.0 && probability < 1.0);
    let mut low = 0.0_f64;
    let mut high = 1e20_f64;
    while high - low > 1e-7 {
        let middle = (low + high) / 2.0;
        if student(middle, degrees) > probability {
            low = middle;
        } else {
            high = middle;
        }
    }
    (low + high) / 2.0
}

/// Natural log of the gamma function for `x > 0`.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    debug_assert!(x > 0.0);
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coefficient in LANCZOS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (LANCZOS_SCALE * series / x).ln()
}

/// `ln(n!)`.
#[must_use]
pub fn ln_factorial(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2..=20 => (2..=n).map(|k| (k as f64).ln()).sum(),
        _ => ln_gamma(n as f64 + 1.0),
    }
}

/// `ln C(n, k)`, 0 when `k > n`.
#[must_use]
pub fn ln_binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Regularised incomplete beta function `I_x(a, b)`.
#[must_use]
pub fn beta_i(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction of [`beta_i`], modified Lentz method.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 100;
    const EPSILON: f64 = 3e-7;
    const FP_MIN: f64 = 1e-30;

    let guard = |value: f64| if value.abs() < FP_MIN { FP_MIN } else { value };
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// `ln(e^a + e^b)`.
#[must_use]
pub fn ln_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let high = a.max(b);
    high + ((a - high).exp() + (b - high).exp()).ln()
}

/// `ln B(v, i)` for `i` in `1..=v`, where `B(v, i)` counts the partitions of `v`
/// values into at most `i` groups (index 0 holds `i = 1`).
#[must_use]
pub fn ln_bell_partials(value_number: usize) -> Vec<f64> {
    if value_number == 0 {
        return Vec::new();
    }
    // Row n of ln S(n, k), Stirling numbers of the second kind.
    let mut row = vec![f64::NEG_INFINITY; value_number + 1];
    row[1] = 0.0;
    for n in 2..=value_number {
        for k in (1..=n).rev() {
            let stay = row[k] + (k as f64).ln();
            let open = row[k - 1];
            row[k] = ln_sum_exp(stay, open);
        }
    }
    let mut partials = Vec::with_capacity(value_number);
    let mut acc = f64::NEG_INFINITY;
    for k in 1..=value_number {
        acc = ln_sum_exp(acc, row[k]);
        partials.push(acc);
    }
    partials
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments() {
        let values = [1.0, 2.0, 2.0, 3.0];
        assert!((mean(&values) - 2.0).abs() < 1e-12);
        assert!((standard_deviation(&values) - 0.5_f64.sqrt()).abs() < 1e-12);
        assert!((geometric_mean(&[1.0, 4.0]) - 2.0).abs() < 1e-12);
        assert!((min(&values) - 1.0).abs() < 1e-12);
        assert!((max(&values) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn log_gamma_matches_factorials() {
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-9);
        assert!((ln_factorial(25) - ln_gamma(26.0)).abs() < 1e-9);
        assert!((ln_binomial(5, 2) - 10.0_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn student_is_consistent_with_its_inverse() {
        let threshold = inv_student(0.05, 9);
        assert!((threshold - 2.262).abs() < 1e-3);
        assert!((student(threshold, 9) - 0.05).abs() < 1e-4);
        assert!((student(0.0, 9) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bell_partials_count_partitions() {
        let partials = ln_bell_partials(4);
        let expected = [1.0, 8.0, 14.0, 15.0];
        for (value, count) in partials.iter().zip(expected) {
            assert!((value.exp() - count).abs() < 1e-9);
        }
    }
}
