/// Negotiation Engine — Arithmetic Primitives
///
/// All numeric values: i64 whole units. No float. No f64. No f32.
/// Ratios (attainment) use fixed-point with SCALE = 10_000 (= 100%).

/// Fixed-point scale factor for ratios.
pub const SCALE: i64 = 10_000;

/// Lower bound of every percentage-style metric.
pub const PERCENT_MIN: i64 = 0;

/// Upper bound of every percentage-style metric.
pub const PERCENT_MAX: i64 = 100;

/// Clamp `value` into `[lo, hi]`.
pub fn clamp(value: i64, lo: i64, hi: i64) -> i64 {
    value.max(lo).min(hi)
}

/// Integer mean, rounding toward zero. Returns 0 for an empty input.
pub fn mean(values: impl IntoIterator<Item = i64>) -> i64 {
    let (sum, count) = values
        .into_iter()
        .fold((0i64, 0i64), |(s, n), v| (s.saturating_add(v), n + 1));
    if count == 0 {
        0
    } else {
        sum / count
    }
}

/// Fixed-point ratio `num / den`, capped at SCALE.
/// A zero or negative denominator counts as fully attained.
pub fn capped_ratio(num: i64, den: i64) -> i64 {
    if den <= 0 {
        return SCALE;
    }
    let r = num.max(0).saturating_mul(SCALE) / den;
    r.min(SCALE)
}

/// Whether an identifier matches `[a-z0-9_-]+` (case-insensitive).
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(120, 0, 100), 100);
        assert_eq!(clamp(-3, 0, 100), 0);
        assert_eq!(clamp(42, 0, 100), 42);
    }

    #[test]
    fn test_mean_empty_and_truncation() {
        assert_eq!(mean(Vec::new()), 0);
        assert_eq!(mean(vec![1, 2]), 1);
        assert_eq!(mean(vec![10, 20, 30]), 20);
    }

    #[test]
    fn test_capped_ratio() {
        assert_eq!(capped_ratio(50, 100), 5_000);
        assert_eq!(capped_ratio(150, 100), SCALE);
        assert_eq!(capped_ratio(-5, 100), 0);
        assert_eq!(capped_ratio(10, 0), SCALE);
    }

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("node_1"));
        assert!(is_valid_id("Data-Lake"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("data lake"));
    }
}
