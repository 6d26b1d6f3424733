use anyhow::Context;
use clap::Parser;
use ensemble_debates::core::progress::ProgressReport;
use ensemble_debates::utils::logger;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "progress-monitor")]
#[command(about = "Show how far an incremental debate results file has progressed")]
struct Args {
    /// Incremental results file written by ensemble-debates
    results: PathBuf,

    /// Re-check every N seconds until the batch completes
    #[arg(short, long, value_name = "SECONDS")]
    watch: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);
    tracing::debug!("Monitoring {}", args.results.display());

    loop {
        let report = ProgressReport::load(&args.results)
            .with_context(|| format!("failed to read progress from {}", args.results.display()))?;
        println!("{}", report.render(chrono::Utc::now()));

        match args.watch {
            Some(seconds) if !report.is_complete() => {
                println!();
                tokio::time::sleep(Duration::from_secs(seconds.max(1))).await;
            }
            _ => break,
        }
    }

    Ok(())
}
