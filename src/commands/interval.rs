use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,
    #[error("invalid interval: {0}")]
    Invalid(String),
    #[error("interval must be at least one second")]
    NonPositive,
}

/// Parses an interval such as `30s`, `10m`, `1.5h` or `1d` into whole
/// seconds. A bare number means seconds; fractions truncate toward zero
/// after unit conversion.
pub fn parse_interval(text: &str) -> Result<u64, IntervalError> {
    let s = text.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }

    let (number, multiplier) = match s.as_bytes()[s.len() - 1] {
        b's' => (&s[..s.len() - 1], 1.0),
        b'm' => (&s[..s.len() - 1], 60.0),
        b'h' => (&s[..s.len() - 1], 3_600.0),
        b'd' => (&s[..s.len() - 1], 86_400.0),
        _ => (s.as_str(), 1.0),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| IntervalError::Invalid(text.trim().to_string()))?;
    if !value.is_finite() {
        return Err(IntervalError::Invalid(text.trim().to_string()));
    }
    if value <= 0.0 {
        return Err(IntervalError::NonPositive);
    }

    let seconds = (value * multiplier).trunc();
    if seconds < 1.0 {
        return Err(IntervalError::NonPositive);
    }
    if seconds > u64::MAX as f64 {
        return Err(IntervalError::Invalid(text.trim().to_string()));
    }
    Ok(seconds as u64)
}
