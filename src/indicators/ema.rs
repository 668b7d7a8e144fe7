// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The series is seeded with the FIRST raw sample, not an SMA of the first
// `period` samples.  This deviates from the textbook definition and is kept
// for behavioural compatibility with the system this engine replaces.  One
// consequence is that the EMA is defined for any non-empty input, however
// short.

/// Compute the full EMA series for `values` with look-back `period`.
///
/// The output has the same length as the input: element 0 is the seed
/// (the first raw value) and every later element rolls the smoothing
/// forward.
///
/// # Edge cases
/// - `period == 0` or empty input => empty vec
/// - Non-finite inputs are replaced by the previous EMA value, so the
///   series never carries NaN forward.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let mut result = Vec::with_capacity(values.len());
    let mut prev = if values[0].is_finite() { values[0] } else { 0.0 };
    result.push(prev);

    for &value in &values[1..] {
        let next = value * multiplier + prev * (1.0 - multiplier);
        prev = if next.is_finite() { next } else { prev };
        result.push(prev);
    }

    result
}

/// The most recent EMA value, or the `fallback` when the series cannot be
/// computed (empty input or zero period).
pub fn ema(values: &[f64], period: usize, fallback: f64) -> f64 {
    ema_series(values, period).last().copied().unwrap_or(fallback)
}
