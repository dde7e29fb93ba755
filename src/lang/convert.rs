/// Implicit string-to-number conversion used by every arithmetic operator.
///
/// Accepted grammar: optional blanks (space or tab), an optional `+`/`-`
/// sign, digits, optional trailing blanks. Anything else is rejected.
///
/// A string with no digits at all (`""`, `"  "`, `"-"`) is accepted and
/// converts to 0. Magnitudes beyond the `i32` range saturate.
pub fn string_to_int(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() && is_blank(bytes[pos]) {
        pos += 1;
    }

    let mut negative = false;
    if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
        negative = bytes[pos] == b'-';
        pos += 1;
    }

    let mut magnitude: i64 = 0;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        let digit = i64::from(bytes[pos] - b'0');
        magnitude = magnitude.saturating_mul(10).saturating_add(digit);
        pos += 1;
    }

    while pos < bytes.len() && is_blank(bytes[pos]) {
        pos += 1;
    }

    if pos != bytes.len() {
        return None;
    }

    let signed = if negative { -magnitude } else { magnitude };
    Some(signed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

fn is_blank(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_digits() {
        assert_eq!(string_to_int("42"), Some(42));
    }

    #[test]
    fn test_surrounding_blanks() {
        assert_eq!(string_to_int("  42  "), Some(42));
        assert_eq!(string_to_int("\t-7\t"), Some(-7));
    }

    #[test]
    fn test_explicit_plus() {
        assert_eq!(string_to_int("+15"), Some(15));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert_eq!(string_to_int("4a"), None);
        assert_eq!(string_to_int("12 3"), None);
        assert_eq!(string_to_int("0x10"), None);
    }

    #[test]
    fn test_blank_between_sign_and_digits_rejected() {
        assert_eq!(string_to_int("- 5"), None);
    }

    #[test]
    fn test_newline_is_not_blank() {
        assert_eq!(string_to_int("5\n"), None);
    }

    #[test]
    fn test_no_digits_is_zero() {
        assert_eq!(string_to_int(""), Some(0));
        assert_eq!(string_to_int("   "), Some(0));
        assert_eq!(string_to_int("-"), Some(0));
    }

    #[test]
    fn test_saturates_out_of_range() {
        assert_eq!(string_to_int("99999999999"), Some(i32::MAX));
        assert_eq!(string_to_int("-99999999999"), Some(i32::MIN));
    }

    proptest! {
        #[test]
        fn prop_formatted_ints_parse_back(n in any::<i32>(), lead in "[ \t]{0,3}", trail in "[ \t]{0,3}") {
            let text = format!("{}{}{}", lead, n, trail);
            prop_assert_eq!(string_to_int(&text), Some(n));
        }

        #[test]
        fn prop_letters_always_rejected(prefix in "[0-9]{0,4}", letter in "[a-zA-Z]", suffix in "[0-9]{0,4}") {
            let text = format!("{}{}{}", prefix, letter, suffix);
            prop_assert_eq!(string_to_int(&text), None);
        }
    }
}
