// Report Model - Locations, crowd reports, annotated results
//
// A Location has no id of its own: it is the (name, address) pair.
// Reports are immutable values; a correction is a new report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::Availability;

// ============================================================================
// LOCATION
// ============================================================================

/// Cash machine site, identified structurally by name + address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub address: String,
}

impl Location {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Location {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Key used in log fields
    pub fn key(&self) -> String {
        format!("{} :: {}", self.name, self.address)
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// Stored crowd report (as read back from the store)
///
/// Status fields are exactly what the submitter sent; use
/// [`Report::deposit`] / [`Report::passbook`] for the normalized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Insertion sequence (row id), the tie-break between equal timestamps
    #[serde(skip)]
    pub id: i64,
    pub cash_status: Option<String>,
    pub deposit_status: Option<String>,
    pub passbook_status: Option<String>,
    #[serde(rename = "reportTimestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Report {
    pub fn deposit(&self) -> Availability {
        Availability::parse(self.deposit_status.as_deref())
    }

    pub fn passbook(&self) -> Availability {
        Availability::parse(self.passbook_status.as_deref())
    }
}

/// Report as submitted, before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub location: Location,
    pub cash_status: Option<String>,
    pub deposit_status: Option<String>,
    pub passbook_status: Option<String>,
}

impl NewReport {
    pub fn new(location: Location) -> Self {
        NewReport {
            location,
            cash_status: None,
            deposit_status: None,
            passbook_status: None,
        }
    }

    /// Builder pattern: set cash status
    pub fn with_cash(mut self, status: impl Into<String>) -> Self {
        self.cash_status = Some(status.into());
        self
    }

    /// Builder pattern: set deposit status
    pub fn with_deposit(mut self, status: impl Into<String>) -> Self {
        self.deposit_status = Some(status.into());
        self
    }

    /// Builder pattern: set passbook status
    pub fn with_passbook(mut self, status: impl Into<String>) -> Self {
        self.passbook_status = Some(status.into());
        self
    }
}

/// A report together with the location it belongs to (store scan output)
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedReport {
    pub location: Location,
    pub report: Report,
}

// ============================================================================
// ANNOTATED LOCATION
// ============================================================================

/// Discovery result: a location and a copy of its current report, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedLocation {
    pub name: String,
    pub address: String,
    pub latest_report: Option<Report>,
}

impl AnnotatedLocation {
    pub fn new(location: Location, latest_report: Option<Report>) -> Self {
        AnnotatedLocation {
            name: location.name,
            address: location.address,
            latest_report,
        }
    }
}
