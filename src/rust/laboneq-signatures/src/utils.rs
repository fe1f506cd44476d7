// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

/// Sanitize a string so it can be used as (part of) an identifier in sequencer code.
///
/// Non-ASCII characters are dropped and everything outside `[A-Za-z0-9_]` is
/// replaced by `_`. Identifiers must not start with a digit. If the input had to be
/// changed, a short hash of the original is appended to keep distinct inputs distinct.
pub fn string_sanitize(input: &str) -> String {
    let mut output: String = input
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c.is_ascii_alphanumeric() { c } else if c == '_' { c } else { '_' })
        .collect();
    if output.is_empty() {
        output.push('_');
    }
    if output.starts_with(|c: char| c.is_ascii_digit()) {
        output.insert(0, '_');
    }
    if output != input {
        let digest = md5::compute(input.as_bytes());
        output = format!("{output}_{}", &format!("{digest:x}")[..4]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier_is_unchanged() {
        assert_eq!(string_sanitize("p_0064_gaussian_00"), "p_0064_gaussian_00");
    }

    #[test]
    fn test_invalid_characters_are_replaced() {
        let sanitized = string_sanitize("q0/drive-pulse");
        assert!(sanitized.starts_with("q0_drive_pulse_"));
        assert_eq!(sanitized.len(), "q0_drive_pulse_".len() + 4);
    }

    #[test]
    fn test_leading_digit() {
        assert!(string_sanitize("0abc").starts_with("_0abc_"));
    }

    #[test]
    fn test_distinct_inputs_stay_distinct() {
        assert_ne!(string_sanitize("a-b"), string_sanitize("a.b"));
        assert_eq!(string_sanitize("ä"), format!("__{}", &format!("{:x}", md5::compute("ä"))[..4]));
    }
}
