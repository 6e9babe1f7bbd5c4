use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a face photo
    Enroll {
        /// Person id (2-20 chars: letters, digits, '-', '_')
        id: String,
        /// Human-readable display name
        #[arg(short, long)]
        name: String,
        /// Path to the face image
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Process one face image as a sighting
    Sight {
        /// Path to the face image
        image: PathBuf,
    },
    /// Remove a person's enrollment (attendance history is kept)
    Remove {
        /// Person id to remove
        id: String,
    },
    /// List enrolled people
    List,
    /// Rebuild the template registry from stored enrollments
    Rebuild,
    /// Attendance report over a date range
    Report {
        /// Range start (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Range end (YYYY-MM-DD, defaults to today)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        /// Report the last 7 days (the default window)
        #[arg(long, conflicts_with_all = ["from", "month"])]
        week: bool,
        /// Report the current calendar month to date
        #[arg(long, conflicts_with = "from")]
        month: bool,
        /// Write a per-person CSV summary here instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Export the full attendance ledger as CSV
    Export {
        /// Output path (prints to stdout when omitted)
        path: Option<PathBuf>,
    },
    /// Record a simulated sighting without a camera
    Simulate {
        /// Person id (a random enrolled person when omitted)
        #[arg(long)]
        id: Option<String>,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.freedesktop.Rollcall1",
    default_service = "org.freedesktop.Rollcall1",
    default_path = "/org/freedesktop/Rollcall1"
)]
trait Rollcall {
    async fn process_sighting(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn simulate_sighting(&self, person_id: &str) -> zbus::Result<String>;
    async fn enroll(
        &self,
        person_id: &str,
        display_name: &str,
        image: Vec<u8>,
    ) -> zbus::Result<String>;
    async fn remove(&self, person_id: &str) -> zbus::Result<bool>;
    async fn rebuild(&self) -> zbus::Result<String>;
    async fn list_people(&self) -> zbus::Result<String>;
    async fn report(&self, start: &str, end: &str) -> zbus::Result<String>;
    async fn report_csv(&self, start: &str, end: &str) -> zbus::Result<String>;
    async fn export_ledger(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is rollcalld running?)")?;
    let proxy = RollcallProxy::new(&connection).await?;

    match cli.command {
        Commands::Enroll { id, name, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let outcome = proxy.enroll(&id, &name, bytes).await?;
            print_json(&outcome);
        }
        Commands::Sight { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let outcome = proxy.process_sighting(bytes).await?;
            print_json(&outcome);
        }
        Commands::Remove { id } => {
            if proxy.remove(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No such person: {id}");
            }
        }
        Commands::List => print_json(&proxy.list_people().await?),
        Commands::Rebuild => print_json(&proxy.rebuild().await?),
        Commands::Report { from, to, week: _, month, csv } => {
            let (start, end) = report_range(from, to, month, Utc::now().date_naive())?;
            let start = start.format("%Y-%m-%d").to_string();
            let end = end.format("%Y-%m-%d").to_string();
            match csv {
                Some(path) => {
                    let rendered = proxy.report_csv(&start, &end).await?;
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote report for {start}..{end} to {}", path.display());
                }
                None => print_json(&proxy.report(&start, &end).await?),
            }
        }
        Commands::Export { path } => {
            let csv = proxy.export_ledger().await?;
            match path {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote ledger to {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::Simulate { id } => {
            let outcome = proxy.simulate_sighting(id.as_deref().unwrap_or("")).await?;
            print_json(&outcome);
        }
        Commands::Status => print_json(&proxy.status().await?),
    }

    Ok(())
}

/// Resolve the report window: explicit `--from`/`--to` wins; `--month` is
/// the month to date, or the previous full month when run on the 1st;
/// `--week` and the bare default are both the trailing 7 days.
fn report_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    month: bool,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    if let Some(start) = from {
        let end = to.unwrap_or(today);
        if start > end {
            bail!("--from {start} is after --to {end}");
        }
        return Ok((start, end));
    }
    if month {
        let first = today.with_day(1).unwrap_or(today);
        // On the 1st there is no month-to-date yet; cover the previous
        // full month instead.
        if first == today {
            let last = today - Duration::days(1);
            return Ok((last.with_day(1).unwrap_or(last), last));
        }
        return Ok((first, today));
    }
    Ok((today - Duration::days(7), today))
}

/// Pretty-print a JSON reply, falling back to the raw string if it is not
/// valid JSON.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.into()))
        }
        Err(_) => println!("{raw}"),
    }
}
