// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number canonicalization and fuzzy matching.
//!
//! Numbers arrive from spreadsheets, the chat client's page, and history
//! snapshots in different shapes (`+55 (11) 98765-4321`, `011987654321`,
//! `0055...`). The normalizer reduces them to one digit string with the
//! country code, and produces the alternate renderings used for lookups.

use serde::{Deserialize, Serialize};

/// Country code prefixed to bare national numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "55";
/// Minimum digits of a valid canonical phone.
pub const MIN_PHONE_DIGITS: usize = 10;
/// Maximum digits of a valid canonical phone (E.164).
pub const MAX_PHONE_DIGITS: usize = 15;
/// Length of the trailing digit run compared by [`phones_match`].
pub const TAIL_MATCH_DIGITS: usize = 10;

/// Why a phone failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPhoneReason {
    Empty,
    LengthOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPhone {
    pub raw: String,
    pub canonical: String,
    pub is_valid: bool,
    pub reason: Option<InvalidPhoneReason>,
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl PhoneNormalizer {
    pub fn new(country_code: impl Into<String>) -> Self {
        let country_code = digits_only(&country_code.into());
        Self {
            country_code: if country_code.is_empty() {
                DEFAULT_COUNTRY_CODE.to_string()
            } else {
                country_code
            },
        }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn normalize(&self, raw: &str) -> NormalizedPhone {
        let mut digits = digits_only(raw);

        if let Some(rest) = digits.strip_prefix("00") {
            digits = rest.to_string();
        }
        if (10..=12).contains(&digits.len()) && digits.starts_with('0') {
            digits.remove(0);
        }
        if digits.len() == 10 || digits.len() == 11 {
            digits = format!("{}{digits}", self.country_code);
        }

        let reason = if digits.is_empty() {
            Some(InvalidPhoneReason::Empty)
        } else if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
            Some(InvalidPhoneReason::LengthOutOfRange)
        } else {
            None
        };

        NormalizedPhone {
            raw: raw.to_string(),
            search_terms: self.search_terms(&digits),
            is_valid: reason.is_none(),
            reason,
            canonical: digits,
        }
    }

    /// Canonical form when valid, otherwise the bare digits.
    pub fn canonical_or_digits(&self, raw: &str) -> String {
        let normalized = self.normalize(raw);
        if normalized.is_valid {
            normalized.canonical
        } else {
            digits_only(raw)
        }
    }

    fn search_terms(&self, canonical: &str) -> Vec<String> {
        let mut terms = Vec::new();
        if canonical.is_empty() {
            return terms;
        }
        push_unique(&mut terms, canonical.to_string());
        push_unique(&mut terms, format!("+{canonical}"));

        let cc = self.country_code.as_str();
        if let Some(national) = canonical.strip_prefix(cc)
            && !national.is_empty()
        {
            push_unique(&mut terms, national.to_string());
            push_unique(&mut terms, format!("{cc}{national}"));
            if let Some(formatted) = format_national(national) {
                push_unique(&mut terms, format!("+{cc} {formatted}"));
            }
            push_unique(&mut terms, format!("+{cc}{national}"));
        }
        terms
    }
}

/// Strips everything that is not an ASCII digit.
pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Exact digit equality, or either number ending with the other's last ten digits.
pub fn phones_match(a: &str, b: &str) -> bool {
    let a = digits_only(a);
    let b = digits_only(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    a.ends_with(tail(&b)) || b.ends_with(tail(&a))
}

fn tail(digits: &str) -> &str {
    &digits[digits.len().saturating_sub(TAIL_MATCH_DIGITS)..]
}

/// `AA BBBBB CCCC` for mobile numbers, `AA BBBB CCCC` for landlines.
fn format_national(national: &str) -> Option<String> {
    match national.len() {
        11 => Some(format!(
            "{} {} {}",
            &national[..2],
            &national[2..7],
            &national[7..]
        )),
        10 => Some(format!(
            "{} {} {}",
            &national[..2],
            &national[2..6],
            &national[6..]
        )),
        _ => None,
    }
}

fn push_unique(terms: &mut Vec<String>, term: String) {
    if !terms.contains(&term) {
        terms.push(term);
    }
}
