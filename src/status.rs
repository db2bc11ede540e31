// Status Normalization
// Crowd reports carry free-text status fields. They are stored verbatim and
// interpreted only here, at read time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens in a cash status that count as "cash is available".
const CASH_AVAILABLE_TOKENS: [&str; 2] = ["available", "yes"];

/// Cash text shown when a report left the field blank.
pub const UNKNOWN_CASH: &str = "Unknown";

// ============================================================================
// AVAILABILITY
// ============================================================================

/// Normalized reading of a boolean-like status field (deposit, passbook)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Yes,
    No,
    Unknown,
}

impl Availability {
    /// Interpret a raw status field.
    ///
    /// Blank or missing input is `Unknown`. `"yes"` and `"available"`
    /// (any case, surrounding whitespace ignored) are `Yes`. Everything
    /// else, including `"NOT_AVAILABLE"`, is `No`.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Availability::Unknown;
        };

        if value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("available") {
            Availability::Yes
        } else {
            Availability::No
        }
    }

    /// Two-valued display form: only a confirmed `Yes` shows as "Yes"
    pub fn as_display(&self) -> &'static str {
        match self {
            Availability::Yes => "Yes",
            Availability::No | Availability::Unknown => "No",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_display())
    }
}

// ============================================================================
// CASH STATUS
// ============================================================================

/// Whether a cash status mentions availability.
///
/// Substring match on the lower-cased text, so "Available", "yes - plenty"
/// and also "not available" all qualify.
pub fn indicates_cash(raw: Option<&str>) -> bool {
    let Some(value) = raw else {
        return false;
    };
    let folded = value.to_lowercase();
    CASH_AVAILABLE_TOKENS
        .iter()
        .any(|token| folded.contains(token))
}

/// Cash text for display: the original text, or "Unknown" when blank
pub fn cash_display(raw: Option<&str>) -> &str {
    match raw {
        Some(value) if !value.trim().is_empty() => value,
        _ => UNKNOWN_CASH,
    }
}
