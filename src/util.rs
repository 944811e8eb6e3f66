//! Utility functions that are useful in many cases.

/// Parse a number.
///
/// The number is assumed to be decimal. If a 0x or $ prefix is found, the
/// number is parsed as hexadecimal instead.
///
/// ```rust
/// use mic1r::util::parse_num;
/// assert_eq!(parse_num("123"), Some(123));
/// assert_eq!(parse_num("0x10"), Some(16));
/// assert_eq!(parse_num("$10"), Some(16));
/// assert_eq!(parse_num("-0xF"), Some(-15));
/// assert_eq!(parse_num("foo"), None);
/// ```
pub fn parse_num(text: &str) -> Option<i64> {
    let mut result: i64 = 0;
    let mut base = 10;
    let mut stripped = text;
    let sign = if stripped.starts_with("-") {
        stripped = &stripped[1..];
        -1
    } else {
        1
    };
    if stripped.starts_with("0x") {
        stripped = &stripped[2..];
        base = 16;
    } else if stripped.starts_with("$") {
        stripped = &stripped[1..];
        base = 16;
    };
    if stripped.is_empty() {
        return None;
    }
    for chr in stripped.chars() {
        let digit = match chr.to_digit(base) {
            Some(d) => d as i64,
            None => return None,
        };
        result = match result.checked_mul(base as i64).and_then(|r| r.checked_add(digit)) {
            Some(r) => r,
            None => return None,
        };
    }
    Some(sign * result)
}
