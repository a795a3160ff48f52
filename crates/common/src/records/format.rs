//! Human-readable short forms for large counters

const WAN: u64 = 10_000;
const YI: u64 = 100_000_000;

/// Render a counter the way the video platform does: plain digits below
/// ten thousand, then `万` (1e4) and `亿` (1e8) with one truncated decimal.
pub fn short_form(value: i64) -> String {
    let abs = value.unsigned_abs();
    if abs < WAN {
        return value.to_string();
    }

    let (unit, suffix) = if abs < YI { (WAN, "万") } else { (YI, "亿") };
    // Units are multiples of ten, so this never multiplies up
    let tenths = abs / (unit / 10);
    let sign = if value < 0 { "-" } else { "" };

    match tenths % 10 {
        0 => format!("{}{}{}", sign, tenths / 10, suffix),
        frac => format!("{}{}.{}{}", sign, tenths / 10, frac, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        assert_eq!(short_form(0), "0");
        assert_eq!(short_form(9_999), "9999");
        assert_eq!(short_form(10_000), "1万");
        assert_eq!(short_form(12_345), "1.2万");
        assert_eq!(short_form(29_000), "2.9万");
        assert_eq!(short_form(99_999), "9.9万");
        assert_eq!(short_form(350_000_000), "3.5亿");
        assert_eq!(short_form(100_000_000), "1亿");
        assert_eq!(short_form(-12_345), "-1.2万");
    }

    #[test]
    fn test_short_form_extremes() {
        assert_eq!(short_form(i64::MAX), "92233720368.5亿");
        assert_eq!(short_form(i64::MIN), "-92233720368.5亿");
    }
}
