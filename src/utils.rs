/// 将固定宽度的ASCII字段解码为去除填充的字符串
///
/// Bytes outside the ASCII range are dropped, the rest is trimmed on both
/// sides. Header fields are space padded, sidecar-derived ones may carry NULs.
pub fn ascii_field(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string()
}

/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix('+').or_else(|| s.strip_prefix('-')).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// 非本地化的整数解析，失败时返回 `None`
pub fn parse_int_field(s: &str) -> Option<i64> {
    let s = s.trim();
    if !is_integer_number(s) {
        return None;
    }
    s.parse().ok()
}

/// 非本地化的浮点数解析，失败时返回 `None`
pub fn parse_float_field(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Sampling interval in whole microseconds for a rate in Hz.
pub fn sampling_interval_us(fs: f64) -> u64 {
    if fs <= 0.0 {
        return 0;
    }
    (1_000_000.0 / fs).round() as u64
}

/// Sampling rate in Hz for an interval in microseconds, 0 when the interval is unusable.
pub fn rate_from_interval_us(interval_us: f64) -> f64 {
    if interval_us > 0.0 {
        1_000_000.0 / interval_us
    } else {
        0.0
    }
}

/// Keeps alphanumerics, `-` and `_`, the character set legacy viewers accept in labels.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// ASCII bytes of `text`, silently dropping anything non-ASCII.
pub fn ascii_bytes(text: &str) -> Vec<u8> {
    text.bytes().filter(|b| b.is_ascii()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_integer_number() {
        assert!(is_integer_number("123"));
        assert!(is_integer_number("-456"));
        assert!(is_integer_number("+789"));
        assert!(is_integer_number(" 0  "));
        assert!(!is_integer_number("12.34"));
        assert!(!is_integer_number("abc"));
        assert!(!is_integer_number(""));
        assert!(!is_integer_number("-"));
    }

    #[test]
    fn test_ascii_field_trims_padding() {
        assert_eq!(ascii_field(b"Fp1             "), "Fp1");
        assert_eq!(ascii_field(b"  uV\0\0"), "uV");
        assert_eq!(ascii_field(&[b'O', 0xC3, 0xA9, b'1']), "O1");
    }

    #[test]
    fn test_numeric_fields() {
        assert_eq!(parse_int_field("250     "), Some(250));
        assert_eq!(parse_int_field("2.5"), None);
        assert_eq!(parse_float_field("-3276.8 "), Some(-3276.8));
        assert_eq!(parse_float_field("abc"), None);
        assert_eq!(parse_float_field("NaN"), None);
    }

    #[test]
    fn test_sampling_interval() {
        assert_eq!(sampling_interval_us(250.0), 4000);
        assert_eq!(sampling_interval_us(256.0), 3906);
        assert_eq!(sampling_interval_us(0.0), 0);
        assert!((rate_from_interval_us(4000.0) - 250.0).abs() < 1e-9);
        assert_eq!(rate_from_interval_us(0.0), 0.0);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("EEG Fp1-REF"), "EEGFp1-REF");
        assert_eq!(sanitize_label("T3_(old)"), "T3_old");
    }
}
