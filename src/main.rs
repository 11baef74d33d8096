//! Iris Serve binary.

use clap::Parser;
use iris_serve::config::ServeConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iris-serve")]
#[command(author, version, about = "HTTP inference service for an iris classifier", long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[arg(short, long, env = "IRIS_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long, env = "IRIS_BIND_ADDR")]
    bind: Option<SocketAddr>,

    /// Fully-qualified artifact identifier (entity/project/name:alias)
    #[arg(long)]
    artifact: Option<String>,

    /// Artifact alias or version
    #[arg(long)]
    alias: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Disable the Prometheus endpoint
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // File first, then environment, then flags
    let mut config = match &args.config {
        Some(path) => ServeConfig::from_file(path)?,
        None => ServeConfig::default(),
    };
    config.apply_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));

    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(artifact) = args.artifact {
        config.artifact.reference = Some(artifact);
    }
    if let Some(alias) = args.alias {
        config.artifact.alias = alias;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    if args.json_logs {
        config.observability.json_logs = true;
    }
    if args.no_metrics {
        config.observability.metrics_enabled = false;
    }

    iris_serve::run(config).await?;

    Ok(())
}
