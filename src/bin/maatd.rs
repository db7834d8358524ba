//! maatd — the maat REST daemon.
//!
//! Hosts one engine instance behind the REST surface in `maat::server`.
//! Build and run: `cargo run --features server --bin maatd`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use maat::engine::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "maatd", version, about = "Legal knowledge engine daemon")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address.
    #[arg(long, default_value = "127.0.0.1:7741")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path).into_diagnostic()?,
        None => EngineConfig::standard(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }

    let engine = Arc::new(Engine::new(config).into_diagnostic()?);
    tracing::info!(listen = %cli.listen, "maatd starting");
    println!("{}", engine.info());

    let router = maat::server::router(engine);
    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}
