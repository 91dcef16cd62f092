// SkillPath API daemon
// Serves the career-path orchestrator over REST.

use clap::Parser;
use skillpath_engine::config::Config;
use skillpath_engine::telemetry::{init_telemetry, init_telemetry_with_level};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skillpathd", about = "SkillPath career-path API server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Basic telemetry first, before config is loaded
    init_telemetry();

    tracing::info!("SkillPath v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    // Re-initialize with the config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    init_telemetry_with_level(&config.core.log_level);

    let orchestrator = api_server::build_orchestrator(&config)?;
    api_server::serve(&config, orchestrator).await
}
