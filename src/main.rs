//! Mini Proxy Command Line Tool
//!
//! This binary is the command-line interface for Mini Proxy.

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use mini_proxy::common::{init_logger, Result};
use mini_proxy::config::{log_config, ConfigLoader, ConfigValidator, ProxyConfig, DEFAULT_CONFIG_FILE, LOG_LEVEL_STR};
use mini_proxy::{APP_NAME, VERSION};

/// Mini Proxy: forwarding HTTP/HTTPS proxy chained through a parent proxy
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[clap(short, long, default_value = DEFAULT_CONFIG_FILE, env = "MINI_PROXY_CONFIG")]
    config: PathBuf,

    /// Log level, overrides the configuration file
    #[clap(long)]
    log_level: Option<String>,

    /// Annotate log lines with the client's process
    #[clap(long)]
    debug: bool,

    /// Validate the configuration, print it and exit
    #[clap(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = ProxyConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if args.debug {
        config.debug = true;
    }

    let level = match config.log_level.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => config.log_level.as_str(),
        _ => LOG_LEVEL_STR,
    };
    init_logger(level, config.log_file.as_deref())?;

    info!("Starting {} v{}", APP_NAME, VERSION);
    info!("Configuration loaded from {}", args.config.display());

    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    config.validate()?;

    if args.check {
        let rendered = serde_json::to_string_pretty(&config)
            .map_err(|e| mini_proxy::ProxyError::Config(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    log_config(&config);
    info!("Proxy service ready, press Ctrl+C to stop");

    mini_proxy::service::serve(config).await
}
