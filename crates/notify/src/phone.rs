//! E.164 phone number normalisation
//!
//! Numbers without a country code are assumed to be North American (+1).

use crate::PhoneError;

const DEFAULT_COUNTRY_CODE: &str = "1";
const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Normalise a raw phone number into E.164 form (`+<digits>`).
pub fn normalize_e164(raw: &str) -> Result<String, PhoneError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let has_plus = cleaned.starts_with('+');
    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return Err(PhoneError::Empty);
    }
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(PhoneError::InvalidLength {
            number: raw.to_string(),
            digits: digits.len(),
        });
    }

    let normalized = if has_plus {
        format!("+{}", digits)
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{}", digits)
    } else {
        format!("+{}{}", DEFAULT_COUNTRY_CODE, digits)
    };

    // Country code prefix must not push us past the E.164 limit.
    if normalized.len() - 1 > MAX_DIGITS {
        return Err(PhoneError::InvalidLength {
            number: raw.to_string(),
            digits: normalized.len() - 1,
        });
    }

    Ok(normalized)
}
