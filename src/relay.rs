use crate::destination::{self, Destination};
use crate::dial;
use crate::proxy_io::{self, Summary};
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Write;
use std::time::Duration;
use tokio::io::{self, AsyncRead, AsyncWrite};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    /// SOCKS5 proxy as `host:port`; `None` dials directly.
    pub proxy: Option<String>,
}

pub struct Relay {
    destination: Destination,
    response_timeout: Duration,
    proxy: Option<String>,
}

pub fn init_logger(level_arg: &str) {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| writeln!(buf, "{}", record.args()));
    builder.parse_filters(level_arg);
    let _ = builder.try_init();
}

impl Relay {
    pub async fn new(config: RelayConfig) -> Result<Relay> {
        let destination = destination::resolve(&config.host, config.port)
            .await
            .context("invalid destination")?;
        debug!("[relay] resolved {} to {}", destination, destination.addr);

        Ok(Relay {
            destination,
            response_timeout: config.timeout,
            proxy: config.proxy.filter(|p| !p.is_empty()),
        })
    }

    /// Runs one session: connect, then relay until the drain window closes.
    pub async fn process<I, O>(&self, input: I, output: &mut O) -> Result<Summary>
    where
        I: AsyncRead + Send + Unpin + 'static,
        O: AsyncWrite + Unpin,
    {
        let stream = dial::connect(&self.destination, self.proxy.as_deref()).await?;
        info!(
            "[relay] connected to {}{}",
            self.destination,
            self.proxy
                .as_deref()
                .map(|p| format!(" via {}", p))
                .unwrap_or_default()
        );

        let summary = proxy_io::pump(stream, input, output, self.response_timeout)
            .await
            .with_context(|| format!("session with \"{}\" failed", self.destination))?;
        Ok(summary)
    }
}

pub async fn run(config: RelayConfig) -> Result<()> {
    let relay = Relay::new(config).await?;
    let mut stdout = io::stdout();
    relay.process(io::stdin(), &mut stdout).await?;
    Ok(())
}
