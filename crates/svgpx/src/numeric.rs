//! Numeric formatting (spec §4.9).
//!
//! Default: shortest round-trip representation via `ryu`, with an
//! integer fast path so `10.0` prints as `10`, not `10.0`. With
//! `options.toFixed = Some(k)`, every number is rounded to `k` decimals
//! (round-half-away-from-zero, matching `f64::round()`) and printed with
//! exactly `k` decimal digits, except `k == 0` strips to a bare integer.

pub fn format_number(value: f64, to_fixed: Option<u32>) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    match to_fixed {
        Some(k) => format_fixed(value, k),
        None => format_shortest(value),
    }
}

fn format_shortest(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let mut buf = ryu::Buffer::new();
    let s = buf.format(value);
    // ryu always emits a decimal point (e.g. "1.0"); our integer fast path
    // above already handles whole numbers, so this only trims a stray ".0"
    // that can arise from values that round-trip exactly through `as i64`
    // but weren't caught above due to the magnitude guard.
    s.strip_suffix(".0").unwrap_or(s).to_string()
}

fn format_fixed(value: f64, k: u32) -> String {
    let factor = 10f64.powi(k as i32);
    let rounded = (value * factor).round() / factor;
    if k == 0 {
        return format!("{}", rounded as i64);
    }
    format!("{rounded:.*}", k as usize)
}

/// Arc flags (`largeArc`, `sweep`) are always rendered as plain integers,
/// regardless of `toFixed` (spec §4.9).
pub fn format_flag(value: f64) -> String {
    format!("{}", value.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_print_without_decimal() {
        assert_eq!(format_number(10.0, None), "10");
        assert_eq!(format_number(-5.0, None), "-5");
    }

    #[test]
    fn shortest_round_trip_for_fractions() {
        assert_eq!(format_number(0.1, None), "0.1");
    }

    #[test]
    fn to_fixed_rounds_and_pads() {
        assert_eq!(format_number(10.0 / 3.0, Some(2)), "3.33");
        assert_eq!(format_number(1.0, Some(2)), "1.00");
    }

    #[test]
    fn to_fixed_zero_strips_to_integer() {
        assert_eq!(format_number(3.6, Some(0)), "4");
    }

    #[test]
    fn flags_are_always_plain_integers() {
        assert_eq!(format_flag(1.0), "1");
        assert_eq!(format_flag(0.0), "0");
    }
}
