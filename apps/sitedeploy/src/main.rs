//! sitedeploy entry point.
//!
//! Usage: `sitedeploy <deploy.json> [--dry-run]`

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use sitedeploy_deploy::{DeployConfig, DeployOrchestrator};
use sitedeploy_transfer::UploadEvent;
use tracing_subscriber::EnvFilter;

/// Deploys a static site build to a shared FTP host.
#[derive(Parser)]
#[command(name = "sitedeploy", version)]
struct Args {
    /// Path to the deploy config (JSON).
    config: PathBuf,

    /// Print the files that would be uploaded without connecting.
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting sitedeploy");

    let config = DeployConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    tracing::info!(domain = %config.target.domain, "configuration loaded");

    let base_dir = args
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let mut orchestrator = DeployOrchestrator::new(config, base_dir);

    if args.dry_run {
        for file in orchestrator.plan()? {
            println!("{:>10}  {}  ->  {}", file.size_bytes, file.relative_path, file.remote_path);
        }
        return Ok(());
    }

    if let Some(mut events) = orchestrator.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_progress(&event);
            }
        });
    }

    let report = orchestrator.deploy().await?;

    for file in &report.published {
        match &file.url {
            Some(url) => println!("{url}"),
            None => println!("{}", file.remote_path),
        }
    }
    for failure in report.batch.failures() {
        eprintln!(
            "FAILED {} ({} attempts): {}",
            failure.relative_path,
            failure.attempts,
            failure.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    println!("{}", report.summary());

    if !report.is_success() {
        bail!("{} file(s) failed to deploy", report.batch.fail_count);
    }
    Ok(())
}

fn print_progress(event: &UploadEvent) {
    match event {
        UploadEvent::RootResolved { root } => eprintln!("remote root: {root}"),
        UploadEvent::FileRetrying {
            relative_path,
            attempt,
            ..
        } => eprintln!("  retry   {relative_path} (attempt {attempt} failed)"),
        UploadEvent::FileSucceeded { relative_path, .. } => eprintln!("  ok      {relative_path}"),
        UploadEvent::FileFailed { relative_path, .. } => eprintln!("  failed  {relative_path}"),
        _ => {}
    }
}
