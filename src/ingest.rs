// Report Ingestion
//
// Only name and address are validated. Status fields are stored exactly as
// submitted; interpretation happens when reports are read.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::report::{Location, NewReport, Report};
use crate::store::{ReportStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Incoming report as posted by a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubmission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cash_status: Option<String>,
    #[serde(default)]
    pub deposit_status: Option<String>,
    #[serde(default)]
    pub passbook_status: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, IngestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(IngestError::MissingField(field)),
    }
}

impl ReportSubmission {
    /// Check required fields and build the report to store
    pub fn validate(self) -> Result<NewReport, IngestError> {
        let name = required(self.name, "name")?;
        let address = required(self.address, "address")?;

        Ok(NewReport {
            location: Location::new(name, address),
            cash_status: self.cash_status,
            deposit_status: self.deposit_status,
            passbook_status: self.passbook_status,
        })
    }
}

/// Validate a submission and append it to the store
pub fn submit(store: &ReportStore, submission: ReportSubmission) -> Result<Report, IngestError> {
    let new = submission.validate().map_err(|e| {
        warn!(operation = "submit_report", error = %e, "rejected report");
        e
    })?;

    let report = store.append(&new)?;
    info!(
        operation = "submit_report",
        key = %new.location.key(),
        id = report.id,
        "report accepted"
    );
    Ok(report)
}
