use std::path::PathBuf;

use clap::Parser;
use transit_server::ServerConfig;
use transit_telemetry::TelemetryConfig;

/// Real-time bus fleet state broadcaster.
#[derive(Debug, Parser)]
#[command(name = "transit", version)]
struct Cli {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides TRANSIT_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Directory of static viewer assets (overrides TRANSIT_PUBLIC_DIR).
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Pickup request file (overrides TRANSIT_DATA_FILE).
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Start without the demo routes, schedules and bus locations.
    #[arg(long)]
    empty: bool,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: tracing::Level,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(dir) = &self.public_dir {
            config.public_dir = dir.clone();
        }
        if let Some(file) = &self.data_file {
            config.data_file = file.clone();
        }
        if self.empty {
            config.seed = false;
        }
        config
    }
}

fn parse_level(raw: &str) -> Result<tracing::Level, String> {
    transit_telemetry::parse_level(raw).ok_or_else(|| format!("unknown log level: {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    transit_telemetry::init_telemetry(&TelemetryConfig {
        log_level: cli.log_level,
        json: cli.json_logs,
        ..Default::default()
    });

    let config = cli.server_config();
    tracing::info!(
        port = config.port,
        data_file = %config.data_file.display(),
        public_dir = %config.public_dir.display(),
        "Starting transit server"
    );

    let handle = transit_server::start(config).await?;
    tracing::info!(port = handle.port, "Transit server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
