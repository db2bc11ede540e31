use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing::info;

use atm_availability::{
    find_available, init_tracing, load_csv, submit, Config, ReportStore, ReportSubmission,
    DEFAULT_WITHDRAWAL_AMOUNT,
};

const USAGE: &str = "Usage: atm-availability <command>

Commands:
  init                                   create the report database
  import <csv>                           import reports from a CSV file
  find <pincode> [amount]                direct search for ATMs with cash
  latest <name> <address>                current report for one ATM
  history <name> <address>               every report for one ATM, newest first
  report <name> <address> [cash] [deposit] [passbook]
                                         submit a report";

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::from_env();

    match args.first().map(String::as_str) {
        Some("init") => run_init(&config),
        Some("import") => run_import(&config, arg(&args, 1, "csv")?),
        Some("find") => run_find(&config, &args[1..]),
        Some("latest") => run_latest(&config, arg(&args, 1, "name")?, arg(&args, 2, "address")?),
        Some("history") => run_history(&config, arg(&args, 1, "name")?, arg(&args, 2, "address")?),
        Some("report") => run_report(&config, &args[1..]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => bail!("missing <{}>\n\n{}", what, USAGE),
    }
}

fn open_store(config: &Config) -> Result<ReportStore> {
    ReportStore::open(&config.db_path)
        .with_context(|| format!("Failed to open report store at {}", config.db_path.display()))
}

fn run_init(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    println!("✓ Report store ready at {} ({} reports)", config.db_path.display(), store.count()?);
    Ok(())
}

fn run_import(config: &Config, csv_path: &str) -> Result<()> {
    let records = load_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} reports from CSV", records.len());

    let store = open_store(config)?;
    for record in &records {
        match record.reported_at {
            Some(at) => store.append_at(&record.report, at)?,
            None => store.append(&record.report)?,
        };
    }

    info!(imported = records.len(), "import finished");
    println!("✓ Store now contains {} reports", store.count()?);
    Ok(())
}

fn run_find(config: &Config, args: &[String]) -> Result<()> {
    let pincode = args.first().map(String::as_str).unwrap_or("600001");
    let amount: f64 = match args.get(1) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid withdrawal amount: {}", raw))?,
        None => DEFAULT_WITHDRAWAL_AMOUNT,
    };

    let store = open_store(config)?;
    let rows = find_available(&store, pincode, amount)?;
    if rows.is_empty() {
        println!("No ATMs found for pincode={} with amount={}", pincode, amount);
    } else {
        for row in rows {
            println!("{}", row);
        }
    }
    Ok(())
}

fn run_latest(config: &Config, name: &str, address: &str) -> Result<()> {
    let store = open_store(config)?;
    match store.latest_report(name, address)? {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => println!("No reports for {} - {}", name, address),
    }
    Ok(())
}

fn run_history(config: &Config, name: &str, address: &str) -> Result<()> {
    let store = open_store(config)?;
    let reports = store.report_history(name, address)?;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn run_report(config: &Config, args: &[String]) -> Result<()> {
    let field = |index: usize| args.get(index).cloned();
    let submission = ReportSubmission {
        name: field(0),
        address: field(1),
        cash_status: field(2),
        deposit_status: field(3),
        passbook_status: field(4),
    };

    let store = open_store(config)?;
    let report = submit(&store, submission)?;
    println!("✓ Report stored at {}", report.timestamp.to_rfc3339());
    Ok(())
}
