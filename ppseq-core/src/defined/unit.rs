/// second
pub const SECOND: f64 = 1.0;
/// millisecond
pub const MILLISECOND: f64 = SECOND * 1e-3;
/// microsecond
pub const MICROSECOND: f64 = SECOND * 1e-6;
/// nanosecond
pub const NANOSECOND: f64 = SECOND * 1e-9;
/// picosecond
pub const PICOSECOND: f64 = SECOND * 1e-12;

/// \[s\]
#[allow(non_upper_case_globals)]
pub const s: f64 = SECOND;
/// \[ms\]
#[allow(non_upper_case_globals)]
pub const ms: f64 = MILLISECOND;
/// \[us\]
#[allow(non_upper_case_globals)]
pub const us: f64 = MICROSECOND;
/// \[ns\]
#[allow(non_upper_case_globals)]
pub const ns: f64 = NANOSECOND;
/// \[ps\]
#[allow(non_upper_case_globals)]
pub const ps: f64 = PICOSECOND;

/// Decimal exponent of an SI time suffix.
#[must_use]
pub fn suffix_exponent(suffix: &str) -> Option<i32> {
    match suffix {
        "s" => Some(0),
        "ms" => Some(-3),
        "us" => Some(-6),
        "ns" => Some(-9),
        "ps" => Some(-12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(Some(0), "s")]
    #[case(Some(-3), "ms")]
    #[case(Some(-6), "us")]
    #[case(Some(-9), "ns")]
    #[case(Some(-12), "ps")]
    #[case(None, "ks")]
    #[test]
    fn suffix(#[case] expect: Option<i32>, #[case] sfx: &str) {
        assert_eq!(expect, suffix_exponent(sfx));
    }

    #[test]
    fn units() {
        approx::assert_abs_diff_eq!(1e-5, 10. * us);
        approx::assert_abs_diff_eq!(0.1, 100. * ms);
    }
}
