use clap::{Parser, Subcommand};
use cli::ShorelineJob;
use color_eyre::eyre::Result;
use shoreline::PipelineReport;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full shoreline pipeline for a job file
    Run {
        /// Path to the TOML or JSON job file
        #[arg(short, long)]
        config: PathBuf,
        /// Run counter, overriding `run.counter` from the job file
        #[arg(long)]
        counter: Option<u32>,
    },
    /// Print the JSON schema of the job file
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config, counter } => {
            run_job(config, *counter).await?;
        }
        Commands::Schema => {
            println!("{}", ShorelineJob::schema()?);
        }
    }

    Ok(())
}

async fn run_job(config_path: &Path, counter: Option<u32>) -> Result<()> {
    let job = ShorelineJob::from_file(config_path)?;
    info!("Job: {:?}", job);

    let orchestrator = job.orchestrator()?;
    info!("{}", orchestrator.info());

    let run = job.run_context(counter);
    let report = orchestrator.run(&run).await?;
    summarize(&report);

    Ok(())
}

fn summarize(report: &PipelineReport) {
    for (name, cause) in report.extraction.failures() {
        warn!("Skipped {}: {}", name, cause);
    }
    info!(
        "{}: {} rasters cataloged, {} extracted, {} failed",
        report.run,
        report.cataloged,
        report.extraction.success_count(),
        report.extraction.failure_count()
    );
    info!("Mosaic: {}", report.mosaic.path.display());
    info!(
        "Shoreline dataset: {} ({})",
        report.dataset.path.display(),
        report.cleanup.state
    );
    info!("Elapsed: {:.2} s", report.elapsed.as_secs_f64());
}
