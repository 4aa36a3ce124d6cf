//! Number and value formatting for reports.
//!
//! Every number in a report is rounded to a number of *significant figures*,
//! never to a fixed count of decimal places.
//!
//! ```rust
//! use check_core::format::format_sigfigs;
//!
//! assert_eq!(format_sigfigs(12345.0, 3), "12300");
//! assert_eq!(format_sigfigs(0.012345, 3), "0.0123");
//! assert_eq!(format_sigfigs(0.0, 4), "0");
//! ```

use crate::errors::{CalcError, CalcResult};
use crate::namespace::Value;

/// Significant figures used for supporting values in contexts
pub const CONTEXT_SIGFIGS: u32 = 4;

/// Most significant figures an `f64` can carry
pub const MAX_SIGFIGS: u32 = 17;

/// Validate a configured precision: between 1 and [`MAX_SIGFIGS`]
pub fn check_precision(precision: u32) -> CalcResult<u32> {
    if (1..=MAX_SIGFIGS).contains(&precision) {
        Ok(precision)
    } else {
        Err(CalcError::invalid_input(
            "precision",
            precision.to_string(),
            format!("Precision must be between 1 and {MAX_SIGFIGS}"),
        ))
    }
}

/// Round `x` to `n` significant figures and render it.
///
/// Trailing fractional zeros are trimmed, so `80.0` renders as `"80"`.
/// Zero renders as `"0"`; non-finite values render as `NaN`, `inf`, `-inf`.
/// `n` is clamped to `1..=MAX_SIGFIGS`.
pub fn format_sigfigs(x: f64, n: u32) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    if !x.is_finite() {
        return x.to_string();
    }

    let n = n.clamp(1, MAX_SIGFIGS) as i32;
    let decimals = n - x.abs().log10().ceil() as i32;
    let scale = 10f64.powi(decimals);
    if !scale.is_finite() || scale == 0.0 {
        // magnitudes near the f64 limits; fall back to scientific notation
        return format!("{:.*e}", (n - 1) as usize, x);
    }

    let rounded = (x * scale).round() / scale;
    if decimals > 0 {
        trim_fraction(format!("{:.*}", decimals as usize, rounded))
    } else {
        format!("{:.0}", rounded)
    }
}

fn trim_fraction(mut s: String) -> String {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Render a value; numbers are rounded to `nsigfigs`
pub fn format_value(value: &Value, nsigfigs: u32) -> String {
    match value {
        Value::Number(n) => format_sigfigs(*n, nsigfigs),
        Value::Quantity(q) => format!("{} {}", format_sigfigs(q.magnitude, nsigfigs), q.unit),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => s.clone(),
    }
}

/// Render `name=value` pairs as a comma separated list, in the given order
pub fn format_pairs<'a, I>(pairs: I, nsigfigs: u32) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, format_value(value, nsigfigs)))
        .collect::<Vec<_>>()
        .join(", ")
}
