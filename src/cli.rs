use crate::relay::{self, RelayConfig, DEFAULT_TIMEOUT};
use anyhow::Result;
use clap::Parser;
use log::warn;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sockrelay",
    version,
    about = "Relay stdin/stdout to a TCP endpoint, optionally through a SOCKS5 proxy"
)]
pub struct Cli {
    /// Remote host name or IP address
    pub host: String,
    /// Remote TCP port
    #[arg(value_name = "PORT")]
    pub port: u16,
    /// Seconds to wait for remote output after local input ends (default 10)
    #[arg(value_name = "TIMEOUT")]
    pub timeout: Option<String>,
    /// SOCKS5 proxy as host:port (e.g. 127.0.0.1:9050 for Tor); empty disables
    #[arg(long, value_name = "ADDR")]
    pub proxy: Option<String>,
    /// Log level: error, info, debug
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Unparsable values keep the default rather than aborting the session.
fn parse_timeout(raw: Option<&str>) -> Duration {
    match raw {
        None => DEFAULT_TIMEOUT,
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(err) => {
                warn!(
                    "ignoring timeout \"{}\" ({}), using {}s",
                    value,
                    err,
                    DEFAULT_TIMEOUT.as_secs()
                );
                DEFAULT_TIMEOUT
            }
        },
    }
}

impl Cli {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            timeout: parse_timeout(self.timeout.as_deref()),
            host: self.host,
            port: self.port,
            proxy: self.proxy.filter(|p| !p.is_empty()),
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    relay::init_logger(&cli.log_level);
    relay::run(cli.into_config()).await
}
