//! rtc-signaling - Main entry point
//!
//! Runs a relay server forwarding signaling messages between peers.

mod args;

use args::Args;
use clap::Parser;
use log::{error, info, warn};
use rtc_signaling::config::{Config, RtcConfig};
use rtc_signaling::transport::{run_relay_server, RelayHub};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}, using defaults", args.config, e);
            Config::default()
        }
    };
    args.apply_overrides(&mut config);

    // Initialize logging with noise filtering for third-party WebRTC crates
    env_logger::Builder::new()
        .parse_filters(&std::env::var("RTC_SIGNALING_LOG").unwrap_or_else(|_| config.logging.level.clone()))
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .init();

    info!("rtc-signaling v{}", env!("CARGO_PKG_VERSION"));

    // The relay never creates peer connections, so [rtc] is not validated
    if let Err(e) = config.validate_server() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }
    if config.rtc != RtcConfig::default() {
        warn!("Ignoring [rtc] settings: the relay does not create peer connections");
    }

    let hub = Arc::new(RelayHub::new());

    tokio::select! {
        result = run_relay_server(&config.server, hub) => {
            if let Err(e) = result {
                error!("Relay server failed: {}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("rtc-signaling stopped");
    Ok(())
}
