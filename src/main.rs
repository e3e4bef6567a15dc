//! OCPP central system binary
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-central/config.toml)
//! ocpp-central
//!
//! # Custom config path and ports
//! ocpp-central --config /etc/ocpp-central/config.toml --ws-port 9000 --api-port 8080
//!
//! # Validate config without starting
//! ocpp-central --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ocpp_central::{default_config_path, init_tracing, AppConfig, ServerHandle, ServerOptions};

/// OCPP 1.6 central system for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-central",
    version,
    about = "OCPP 1.6-J central system: WebSocket endpoint for charge points plus a REST command API"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let loaded = AppConfig::load(&config_path);
    let mut config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => AppConfig::default(),
    };

    if let Some(port) = cli.api_port {
        config.server.api_port = port;
    }
    if let Some(port) = cli.ws_port {
        config.server.ws_port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if cli.check {
        return match loaded {
            Ok(_) => {
                config.validate()?;
                println!("Configuration is valid");
                println!("   Config file : {}", config_path.display());
                println!("   WS address  : {}", config.server.ws_address());
                println!("   API address : {}", config.server.api_address());
                println!("   Log level   : {}", config.logging.level);
                println!("   ID tags     : {}", config.id_tags.len());
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
    }

    init_tracing(&config);
    match loaded {
        Ok(_) => info!("Configuration loaded from {}", config_path.display()),
        Err(e) => {
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
        }
    }

    let handle = ServerHandle::start(ServerOptions { config }).await?;
    handle.install_signal_handler();
    info!("Press Ctrl+C to shut down gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
