// Availability Aggregator
//
// Two query paths over the report store:
// - discovery: ask the generation service for nearby locations, then attach
//   each location's current report
// - direct search: scan stored reports by address fragment and keep the
//   ones that say cash is available

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::discovery::{discovery_prompt, parse_locations, DiscoveryError, TextGenerator};
use crate::ingest::{self, IngestError, ReportSubmission};
use crate::report::{AnnotatedLocation, LocatedReport, Location, Report};
use crate::status::{cash_display, indicates_cash, Availability};
use crate::store::{ReportStore, StoreError};

/// Withdrawal amount assumed when a direct search omits it
pub const DEFAULT_WITHDRAWAL_AMOUNT: f64 = 1000.0;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("location discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("report store failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ============================================================================
// DIRECT SEARCH ROW
// ============================================================================

/// One direct-search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableAtm {
    pub name: String,
    pub address: String,
    pub cash: String,
    pub deposit: Availability,
    pub passbook: Availability,
}

impl From<LocatedReport> for AvailableAtm {
    fn from(located: LocatedReport) -> Self {
        let report = located.report;
        AvailableAtm {
            cash: cash_display(report.cash_status.as_deref()).to_string(),
            deposit: report.deposit(),
            passbook: report.passbook(),
            name: located.location.name,
            address: located.location.address,
        }
    }
}

impl fmt::Display for AvailableAtm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} | Cash: {} | Deposit: {} | Passbook: {}",
            self.name, self.address, self.cash, self.deposit, self.passbook
        )
    }
}

/// Direct-search filter: address contains `term` (case-folded) and the cash
/// status mentions availability
fn matches_direct_search(located: &LocatedReport, folded_term: &str) -> bool {
    located.location.address.to_lowercase().contains(folded_term)
        && indicates_cash(located.report.cash_status.as_deref())
}

/// Direct search path: stored reports whose address contains `term` and
/// whose cash status indicates availability, in store order.
///
/// `withdrawal_amount` does not filter anything: reports carry no cash
/// amounts to compare it against.
pub fn find_available(
    store: &ReportStore,
    term: &str,
    withdrawal_amount: f64,
) -> Result<Vec<AvailableAtm>, ServiceError> {
    debug!(operation = "find_available", withdrawal_amount, "withdrawal amount not used for filtering");

    let folded_term = term.to_lowercase();
    let rows: Vec<AvailableAtm> = store
        .all_reports()?
        .into_iter()
        .filter(|located| matches_direct_search(located, &folded_term))
        .map(AvailableAtm::from)
        .collect();

    info!(operation = "find_available", term, rows = rows.len(), "direct search completed");
    Ok(rows)
}

// ============================================================================
// SERVICE
// ============================================================================

/// Entry point for every query and for ingestion
#[derive(Clone)]
pub struct AvailabilityService {
    store: ReportStore,
    generator: Arc<dyn TextGenerator>,
}

impl AvailabilityService {
    pub fn new(store: ReportStore, generator: Arc<dyn TextGenerator>) -> Self {
        AvailabilityService { store, generator }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Run store work on the blocking pool with its own store handle
    async fn run_blocking<T, F>(&self, operation: &'static str, job: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&ReportStore) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || job(&store))
            .await
            .map_err(|e| {
                error!(operation, error = %e, "store task failed");
                ServiceError::Task(e)
            })?
    }

    /// Discovery path: candidate locations near `term`, each with its
    /// current report, in the order the generation service listed them.
    ///
    /// No store access happens until the generation call has returned.
    pub async fn find_near(&self, term: &str) -> Result<Vec<AnnotatedLocation>, ServiceError> {
        let text = self
            .generator
            .generate(&discovery_prompt(term))
            .await
            .map_err(|e| {
                error!(operation = "find_near", term, error = %e, "location discovery failed");
                e
            })?;

        let locations: Vec<Location> = parse_locations(&text).collect();
        let results: Vec<AnnotatedLocation> = self
            .run_blocking("find_near", move |store| {
                locations
                    .into_iter()
                    .map(|location| -> Result<AnnotatedLocation, ServiceError> {
                        let latest = store.latest_report(&location.name, &location.address)?;
                        Ok(AnnotatedLocation::new(location, latest))
                    })
                    .collect()
            })
            .await?;

        info!(
            operation = "find_near",
            term,
            locations = results.len(),
            reported = results.iter().filter(|l| l.latest_report.is_some()).count(),
            "discovery query completed"
        );
        Ok(results)
    }

    /// Direct search path, see [`find_available`]
    pub async fn find_available(
        &self,
        term: &str,
        withdrawal_amount: f64,
    ) -> Result<Vec<AvailableAtm>, ServiceError> {
        let term = term.to_string();
        self.run_blocking("find_available", move |store| {
            find_available(store, &term, withdrawal_amount)
        })
        .await
    }

    /// Raw pass-through to the generation service
    pub async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.generator.generate(prompt).await.map_err(|e| {
            error!(operation = "generate", error = %e, "generation request failed");
            ServiceError::from(e)
        })
    }

    pub async fn submit_report(&self, submission: ReportSubmission) -> Result<Report, ServiceError> {
        self.run_blocking("submit_report", move |store| {
            Ok(ingest::submit(store, submission)?)
        })
        .await
    }

    pub async fn report_history(&self, name: &str, address: &str) -> Result<Vec<Report>, ServiceError> {
        let (name, address) = (name.to_string(), address.to_string());
        self.run_blocking("report_history", move |store| {
            Ok(store.report_history(&name, &address)?)
        })
        .await
    }
}
