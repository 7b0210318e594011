// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone-number normalization.

use wireline_core::WirelineError;

/// Normalize a phone number: strip everything but digits, prefix `+`.
///
/// Rejects inputs with no digits at all.
pub fn normalize_number(raw: &str) -> Result<String, WirelineError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(WirelineError::Validation(format!(
            "phone number {raw:?} contains no digits"
        )));
    }
    Ok(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(
            normalize_number("+1 (555) 000-1111").unwrap(),
            "+15550001111"
        );
        assert_eq!(normalize_number("15550001111").unwrap(), "+15550001111");
        assert_eq!(normalize_number("+15550001111").unwrap(), "+15550001111");
    }

    #[test]
    fn rejects_digitless_input() {
        assert!(normalize_number("").is_err());
        assert!(normalize_number("not a number").is_err());
        assert!(normalize_number("+-() ").is_err());
    }
}
