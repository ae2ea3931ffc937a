use clap::{Parser, Subcommand};
use dam_safety_service::db::{
    Category, DamRepository, PgDamRepository, PgSnapshotRepository, SnapshotRepository,
};
use dam_safety_service::services::{RecomputeReport, Services};
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "recompute")]
#[command(about = "Recompute derived dam safety fields outside the server", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// Dams processed in parallel by bulk commands
    #[arg(long, env = "RECOMPUTE_CONCURRENCY", default_value = "8")]
    concurrency: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recompute every category of one dam
    Dam { dam_id: i64 },
    /// Recompute one category (and its dependents) on every dam holding it
    Category { name: String },
    /// Recompute stale snapshots of one dam, or of every dam when omitted
    Stale { dam_id: Option<i64> },
    /// Recompute every category of every dam
    All,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database_url)
        .await?;

    let dam_repo: Arc<dyn DamRepository> = Arc::new(PgDamRepository::new(pool.clone()));
    let snapshot_repo: Arc<dyn SnapshotRepository> = Arc::new(PgSnapshotRepository::new(pool));
    let services = Services::new(dam_repo, snapshot_repo, cli.concurrency, 50.0);

    let start = Instant::now();
    let reports = match cli.command {
        Command::Dam { dam_id } => services.recalculation.recompute_all_categories(dam_id).await?,
        Command::Stale { dam_id: Some(dam_id) } => {
            services.recalculation.recompute_stale(dam_id).await?
        }
        Command::Category { name } => {
            let category: Category = name.parse()?;
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!("Recomputing {category} on every dam..."));
            spinner.enable_steady_tick(std::time::Duration::from_millis(100));

            let batch = services
                .recalculation
                .recompute_category_for_all_dams(category)
                .await?;
            spinner.finish_with_message(format!("✓ {} dams processed", batch.dams_processed));
            for failure in &batch.failures {
                error!(dam_id = failure.dam_id, "{}", failure.error);
            }
            batch.reports
        }
        Command::Stale { dam_id: None } => {
            let stale = |dam_id| {
                let recalculation = services.recalculation.clone();
                async move { recalculation.recompute_stale(dam_id).await }
            };
            for_each_dam(&services, "Refreshing stale", stale).await?
        }
        Command::All => {
            let all = |dam_id| {
                let recalculation = services.recalculation.clone();
                async move { recalculation.recompute_all_categories(dam_id).await }
            };
            for_each_dam(&services, "Recomputing", all).await?
        }
    };

    print_summary(&reports, start.elapsed().as_secs_f64());
    Ok(())
}

/// Run `job` for every dam in id order with a progress bar. Failures are
/// logged and the remaining dams still run.
async fn for_each_dam<F, Fut>(
    services: &Services,
    label: &str,
    job: F,
) -> Result<Vec<RecomputeReport>, Box<dyn std::error::Error>>
where
    F: Fn(i64) -> Fut,
    Fut: std::future::Future<
        Output = Result<Vec<RecomputeReport>, dam_safety_service::error::EngineError>,
    >,
{
    let dams = services.dams.list_dams().await?;
    info!("{} {} dams", label, dams.len());

    let pb = ProgressBar::new(dams.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut reports = Vec::new();
    for dam in dams {
        pb.set_message(dam.name.clone());
        match job(dam.id).await {
            Ok(dam_reports) => reports.extend(dam_reports),
            Err(e) => pb.println(format!("✗ dam {} ({}): {}", dam.id, dam.name, e)),
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    Ok(reports)
}

fn print_summary(reports: &[RecomputeReport], elapsed_secs: f64) {
    let changed = reports.iter().filter(|r| r.changed).count();
    let noted = reports.iter().filter(|r| !r.notes.is_empty()).count();

    println!("\n{}", "=".repeat(60));
    println!("Recompute Summary");
    println!("{}", "=".repeat(60));
    println!("Snapshots derived:  {}", reports.len());
    println!("Changed:            {changed}");
    println!("With notes:         {noted}");
    println!("{}", "-".repeat(60));
    println!("Elapsed:            {elapsed_secs:.2}s");
    println!("{}", "=".repeat(60));
}
