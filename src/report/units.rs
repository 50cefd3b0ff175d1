//! Exact decimal frequency conversions.
//!
//! Tool reports and client flags express frequencies as decimal literals with
//! a unit. Converting through `f64` can drift from the literal (`180.28 * 1e6`
//! is not `180280000.0`), so all conversions work on the digit strings.

/// Power-of-ten exponent for a frequency unit name (case-insensitive).
pub fn unit_exponent(unit: &str) -> Option<u32> {
    match unit.to_ascii_lowercase().as_str() {
        "hz" => Some(0),
        "khz" => Some(3),
        "mhz" => Some(6),
        "ghz" => Some(9),
        _ => None,
    }
}

/// Convert a decimal literal scaled by `10^exponent` into integer Hz.
///
/// Digits below 1 Hz are truncated. Returns `None` for malformed input or
/// values that do not fit in a `u64`.
pub fn decimal_to_hz(literal: &str, exponent: u32) -> Option<u64> {
    let literal = literal.trim();
    let (int_part, frac_part) = match literal.split_once('.') {
        Some((i, f)) => (i, f),
        None => (literal, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let scale = 10u128.checked_pow(exponent)?;
    let mut hz: u128 = 0;
    for b in int_part.bytes() {
        hz = hz.checked_mul(10)?.checked_add(u128::from(b - b'0'))?;
    }
    hz = hz.checked_mul(scale)?;

    let mut place = scale;
    for b in frac_part.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        hz = hz.checked_add(u128::from(b - b'0') * place)?;
    }

    u64::try_from(hz).ok()
}

/// Parse `<number> <unit>` such as `180.28 MHz`.
pub fn parse_frequency(value: &str, unit: &str) -> Option<u64> {
    decimal_to_hz(value, unit_exponent(unit)?)
}

/// Render integer Hz as an exact decimal megahertz string (`123.456789`).
pub fn format_mhz(hz: u64) -> String {
    let whole = hz / 1_000_000;
    let frac = hz % 1_000_000;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:06}", frac);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Clock period in whole picoseconds for a frequency in Hz (rounded down).
pub fn period_ps(hz: u64) -> Option<u64> {
    if hz == 0 {
        return None;
    }
    Some(1_000_000_000_000u64 / hz)
}
