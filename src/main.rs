//
// main.rs
// Dicom-Worklist-rs
//
// Tokio entry point: loads configuration, installs the tracing subscriber and hands off to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use clap::Parser;
use dicom_worklist::cli::{self, Cli};
use dicom_worklist::config::AppConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.clone())?;
    init_logger(&config.logging.level);

    cli::run(cli, config).await
}

/// RUST_LOG still wins over the configured level.
fn init_logger(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}
