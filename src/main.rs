use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod dates;
mod db;
mod error;
mod models;
mod report;
mod stats;

use models::{AggregateReport, OrgFilter};

#[derive(Parser)]
#[command(name = "term-attendance")]
#[command(about = "Term attendance and teacher usage statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import check-in records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print term statistics as JSON
    Stats {
        #[command(flatten)]
        scope: Scope,
        #[arg(long)]
        pretty: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct Scope {
    /// First day of the term (YYYY-MM-DD)
    #[arg(long)]
    from: String,
    /// Last day of the term (YYYY-MM-DD)
    #[arg(long)]
    to: String,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    program: Option<String>,
    #[arg(long)]
    classroom: Option<Uuid>,
}

impl Scope {
    fn filter(&self) -> OrgFilter {
        OrgFilter {
            department: self.department.clone(),
            program: self.program.clone(),
            classroom: self.classroom,
        }
    }
}

async fn build_report(pool: &PgPool, scope: &Scope) -> anyhow::Result<AggregateReport> {
    let range = dates::prepare_date_range(Some(&scope.from), Some(&scope.to))?;
    let filter = scope.filter();

    let total_students = db::count_students(pool, &filter).await?;
    let records = db::fetch_check_in_records(pool, &range, &filter).await?;
    let teachers = db::fetch_teachers(pool, &filter).await?;

    Ok(stats::compute_term_statistics(
        range,
        total_students,
        &records,
        &teachers,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("term_attendance=info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} check-in records from {}.", csv.display());
        }
        Commands::Stats { scope, pretty } => {
            let report = build_report(&pool, &scope).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{json}");
        }
        Commands::Report { scope, out } => {
            let report = build_report(&pool, &scope).await?;
            let markdown = report::render_markdown(&report, scope.filter().label().as_deref());
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            tracing::info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
