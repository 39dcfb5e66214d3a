use clap::Parser;
use std::path::PathBuf;

use rtc_signaling::config;

#[derive(Parser, Debug)]
#[command(name = "rtc-signaling")]
#[command(version)]
#[command(about = "WebRTC signaling relay server", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/rtc-signaling.toml")]
    pub config: PathBuf,

    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Relay endpoint path prefix
    #[arg(long)]
    pub path: Option<String>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }

    /// Apply command line overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref path) = self.path {
            config.server.path = path.clone();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let args = Args::parse_from(["rtc-signaling", "--port", "9100", "--host", "127.0.0.1", "-v"]);
        let mut config = config::Config::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.path, "/signal");
        assert_eq!(config.logging.level, "debug");
    }
}
