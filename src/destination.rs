use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::lookup_host;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("host must not be empty")]
    EmptyHost,
    #[error("failed to resolve \"{addr}\": {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("\"{addr}\" did not resolve to any address")]
    NoAddress { addr: String },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

/// Resolves `host`/`port` once; IPv4 results are preferred when both families come back.
pub async fn resolve(host: &str, port: u16) -> Result<Destination, DestinationError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(DestinationError::EmptyHost);
    }
    let joined = join_host_port(host, port);
    let lookup = host.trim_start_matches('[').trim_end_matches(']');

    let addrs: Vec<SocketAddr> = lookup_host((lookup, port))
        .await
        .map_err(|source| DestinationError::Resolve {
            addr: joined.clone(),
            source,
        })?
        .collect();

    let addr = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or(DestinationError::NoAddress { addr: joined })?;

    Ok(Destination {
        host: lookup.to_string(),
        port,
        addr,
    })
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
