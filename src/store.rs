// Report Store - SQLite persistence for crowd reports
//
// Append-only: rows are inserted, never updated or deleted.
// Timestamps are RFC 3339 UTC with microsecond precision, so text order
// equals time order and ORDER BY works on the column directly.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::report::{Location, LocatedReport, NewReport, Report};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored timestamp is not valid RFC 3339: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("report timestamp {0} is in the future")]
    FutureTimestamp(DateTime<Utc>),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS atm_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_name TEXT NOT NULL,
            location_address TEXT NOT NULL,
            cash_status TEXT,
            deposit_status TEXT,
            passbook_status TEXT,
            report_timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_location
         ON atm_reports(location_name, location_address, report_timestamp)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_timestamp ON atm_reports(report_timestamp)",
        [],
    )?;

    Ok(())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Map a row of (id, cash, deposit, passbook, timestamp) starting at `offset`
fn report_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Report> {
    let timestamp_str: String = row.get(offset + 4)?;
    let timestamp = parse_timestamp(&timestamp_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 4,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(Report {
        id: row.get(offset)?,
        cash_status: row.get(offset + 1)?,
        deposit_status: row.get(offset + 2)?,
        passbook_status: row.get(offset + 3)?,
        timestamp,
    })
}

// ============================================================================
// REPORT STORE
// ============================================================================

/// Wait this long for a competing writer before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Where each operation opens its connection
enum Target {
    File(PathBuf),
    /// Shared-cache in-memory database, kept alive by `_anchor`
    Memory {
        uri: String,
        _anchor: Mutex<Connection>,
    },
}

/// Handle to the report table.
///
/// Cheap to clone. Every operation opens its own connection, so reads never
/// queue behind other reads; writers are serialized by SQLite itself.
#[derive(Clone)]
pub struct ReportStore {
    target: Arc<Target>,
}

impl ReportStore {
    /// Open (or create) a file database and make sure the schema exists
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "report store opened");
        Ok(ReportStore {
            target: Arc::new(Target::File(path.to_path_buf())),
        })
    }

    /// Private in-memory database, shared by all clones of this handle
    pub fn open_in_memory() -> StoreResult<Self> {
        let uri = format!(
            "file:atm-reports-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let anchor = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        setup_database(&anchor)?;
        Ok(ReportStore {
            target: Arc::new(Target::Memory {
                uri,
                _anchor: Mutex::new(anchor),
            }),
        })
    }

    /// Fresh connection for one operation; dropped when the operation ends
    pub(crate) fn connect(&self) -> StoreResult<Connection> {
        let conn = match self.target.as_ref() {
            Target::File(path) => Connection::open(path)?,
            Target::Memory { uri, .. } => Connection::open_with_flags(
                uri,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
            )?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Current report for a location: greatest timestamp, then greatest id.
    ///
    /// Matching is exact and case-sensitive on both name and address.
    pub fn latest_report(&self, name: &str, address: &str) -> StoreResult<Option<Report>> {
        let result = self.query_latest(name, address);
        if let Err(e) = &result {
            error!(
                operation = "latest_report",
                location_name = name,
                location_address = address,
                error = %e,
                "report store query failed"
            );
        }
        result
    }

    fn query_latest(&self, name: &str, address: &str) -> StoreResult<Option<Report>> {
        let conn = self.connect()?;
        let report = conn
            .query_row(
                "SELECT id, cash_status, deposit_status, passbook_status, report_timestamp
                 FROM atm_reports
                 WHERE location_name = ?1 AND location_address = ?2
                 ORDER BY report_timestamp DESC, id DESC
                 LIMIT 1",
                params![name, address],
                |row| report_from_row(row, 0),
            )
            .optional()?;
        Ok(report)
    }

    /// All reports for one location, newest first
    pub fn report_history(&self, name: &str, address: &str) -> StoreResult<Vec<Report>> {
        let result = self.query_history(name, address);
        if let Err(e) = &result {
            error!(
                operation = "report_history",
                location_name = name,
                location_address = address,
                error = %e,
                "report store query failed"
            );
        }
        result
    }

    fn query_history(&self, name: &str, address: &str) -> StoreResult<Vec<Report>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, cash_status, deposit_status, passbook_status, report_timestamp
             FROM atm_reports
             WHERE location_name = ?1 AND location_address = ?2
             ORDER BY report_timestamp DESC, id DESC",
        )?;
        let reports = stmt
            .query_map(params![name, address], |row| report_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    /// Every stored report in insertion order
    pub fn all_reports(&self) -> StoreResult<Vec<LocatedReport>> {
        let result = self.query_all();
        if let Err(e) = &result {
            error!(operation = "all_reports", error = %e, "report store scan failed");
        }
        result
    }

    fn query_all(&self) -> StoreResult<Vec<LocatedReport>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT location_name, location_address,
                    id, cash_status, deposit_status, passbook_status, report_timestamp
             FROM atm_reports
             ORDER BY id ASC",
        )?;
        let reports = stmt
            .query_map([], |row| {
                Ok(LocatedReport {
                    location: Location::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                    report: report_from_row(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reports)
    }

    /// Append a report stamped with the current time.
    ///
    /// The stamp is never older than the newest report for the same
    /// location, so a clock step backwards cannot reorder that history.
    /// Other locations are not consulted.
    pub fn append(&self, new: &NewReport) -> StoreResult<Report> {
        let result = self.insert_now(new);
        log_append(new, &result);
        result
    }

    fn insert_now(&self, new: &NewReport) -> StoreResult<Report> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let newest: Option<String> = tx.query_row(
            "SELECT MAX(report_timestamp) FROM atm_reports
             WHERE location_name = ?1 AND location_address = ?2",
            params![new.location.name, new.location.address],
            |row| row.get(0),
        )?;
        let now = Utc::now();
        let timestamp = match newest.as_deref().map(parse_timestamp).transpose()? {
            Some(newest) if newest > now => newest,
            _ => now,
        };

        let report = insert_report(&tx, new, timestamp)?;
        tx.commit()?;
        Ok(report)
    }

    /// Append a report with an explicit timestamp (historical imports).
    ///
    /// Timestamps later than the current time are rejected.
    pub fn append_at(&self, new: &NewReport, timestamp: DateTime<Utc>) -> StoreResult<Report> {
        let result = self.insert_at(new, timestamp);
        log_append(new, &result);
        result
    }

    fn insert_at(&self, new: &NewReport, timestamp: DateTime<Utc>) -> StoreResult<Report> {
        if timestamp > Utc::now() {
            return Err(StoreError::FutureTimestamp(timestamp));
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let report = insert_report(&tx, new, timestamp)?;
        tx.commit()?;
        Ok(report)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM atm_reports", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn log_append(new: &NewReport, result: &StoreResult<Report>) {
    match result {
        Ok(report) => debug!(
            operation = "append",
            key = %new.location.key(),
            id = report.id,
            "report stored"
        ),
        Err(e) => error!(
            operation = "append",
            key = %new.location.key(),
            error = %e,
            "report insert failed"
        ),
    }
}

fn insert_report(
    conn: &Connection,
    new: &NewReport,
    timestamp: DateTime<Utc>,
) -> rusqlite::Result<Report> {
    // Stored precision is microseconds; return what a later read will see
    let timestamp = timestamp.trunc_subsecs(6);
    conn.execute(
        "INSERT INTO atm_reports (
            location_name, location_address, cash_status, deposit_status,
            passbook_status, report_timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.location.name,
            new.location.address,
            new.cash_status,
            new.deposit_status,
            new.passbook_status,
            format_timestamp(timestamp),
        ],
    )?;

    Ok(Report {
        id: conn.last_insert_rowid(),
        cash_status: new.cash_status.clone(),
        deposit_status: new.deposit_status.clone(),
        passbook_status: new.passbook_status.clone(),
        timestamp,
    })
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of a seed/import file
#[derive(Debug, Deserialize)]
struct CsvReport {
    name: String,
    address: String,
    #[serde(default)]
    cash_status: Option<String>,
    #[serde(default)]
    deposit_status: Option<String>,
    #[serde(default)]
    passbook_status: Option<String>,
    #[serde(default)]
    reported_at: Option<String>,
}

/// Parsed import row; `reported_at` of `None` means "stamp on insert"
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub report: NewReport,
    pub reported_at: Option<DateTime<Utc>>,
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<ImportRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let row: CsvReport =
            result.with_context(|| format!("Failed to deserialize report on row {}", index + 1))?;

        let reported_at = match row.reported_at.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                parse_timestamp(raw)
                    .with_context(|| format!("Invalid reported_at on row {}: {}", index + 1, raw))?,
            ),
            _ => None,
        };
        if let Some(at) = reported_at.filter(|at| *at > Utc::now()) {
            bail!("reported_at on row {} is in the future: {}", index + 1, at.to_rfc3339());
        }

        records.push(ImportRecord {
            report: NewReport {
                location: Location::new(row.name, row.address),
                cash_status: row.cash_status,
                deposit_status: row.deposit_status,
                passbook_status: row.passbook_status,
            },
            reported_at,
        });
    }

    Ok(records)
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<ImportRecord>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_csv(file)
}
