// ATM Availability - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod status;
pub mod report;
pub mod store;
pub mod discovery;
pub mod ingest;
pub mod aggregator;
pub mod config;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use status::{cash_display, indicates_cash, Availability};
pub use report::{AnnotatedLocation, LocatedReport, Location, NewReport, Report};
pub use store::{
    load_csv, read_csv, setup_database,
    ImportRecord, ReportStore, StoreError, StoreResult,
};
pub use discovery::{
    discovery_prompt, extract_generated_text, parse_location_line, parse_locations,
    DiscoveryError, GeminiClient, TextGenerator,
};
pub use ingest::{submit, IngestError, ReportSubmission};
pub use aggregator::{
    find_available, AvailabilityService, AvailableAtm, ServiceError, DEFAULT_WITHDRAWAL_AMOUNT,
};
pub use config::{Config, DiscoveryConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by the binaries (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
