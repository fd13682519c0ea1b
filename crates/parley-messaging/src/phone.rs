// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counterparty address normalization.
//!
//! Stored addresses are digits only with the country code prefixed. For the
//! Brazilian plan (`55`) mobile numbers carry a leading `9` after the two-digit
//! area code; numbers typed in the old eight-digit mobile form get it inserted.

use parley_core::ParleyError;

/// Country code whose numbering plan uses the mobile indicator digit.
const MOBILE_INDICATOR_PLAN: &str = "55";
const AREA_CODE_LEN: usize = 2;
const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// Normalizes `raw` into the canonical address for `country_code`.
///
/// Fails with [`ParleyError::InvalidAddress`] when fewer than eight digits
/// remain or the result exceeds the E.164 maximum.
pub fn normalize_address(raw: &str, country_code: &str) -> Result<String, ParleyError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_start_matches('0');
    if digits.len() < MIN_DIGITS {
        return Err(ParleyError::InvalidAddress {
            address: raw.to_string(),
        });
    }

    let national = national_number(digits, country_code);
    let national = if country_code == MOBILE_INDICATOR_PLAN {
        with_mobile_indicator(national)
    } else {
        national.to_string()
    };

    let canonical = format!("{country_code}{national}");
    if canonical.len() > MAX_DIGITS {
        return Err(ParleyError::InvalidAddress {
            address: raw.to_string(),
        });
    }
    Ok(canonical)
}

/// Strips the country code when the digits already carry it.
fn national_number<'a>(digits: &'a str, country_code: &str) -> &'a str {
    match digits.strip_prefix(country_code) {
        // A national number is at least area code plus an eight-digit subscriber.
        Some(rest) if rest.len() >= AREA_CODE_LEN + 8 => rest,
        _ => digits,
    }
}

/// Inserts the `9` for area code + eight-digit mobile numbers (first digit 6-9).
fn with_mobile_indicator(national: &str) -> String {
    if national.len() == AREA_CODE_LEN + 8 {
        let (area, subscriber) = national.split_at(AREA_CODE_LEN);
        if subscriber.starts_with(['6', '7', '8', '9']) {
            return format!("{area}9{subscriber}");
        }
    }
    national.to_string()
}
