use crate::destination::Destination;
use anyhow::{Context, Result};
use log::debug;
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

/// Opens the single connection of a session, either directly or through a SOCKS5 proxy.
pub async fn connect(destination: &Destination, proxy: Option<&str>) -> Result<TcpStream> {
    match proxy {
        Some(proxy) => {
            debug!("[dial] connecting to {} via socks5 proxy {}", destination, proxy);
            let stream = Socks5Stream::connect(proxy, destination.addr)
                .await
                .with_context(|| {
                    format!(
                        "failed to connect to \"{}\" through socks5 proxy {}",
                        destination, proxy
                    )
                })?;
            Ok(stream.into_inner())
        }
        None => {
            debug!("[dial] connecting to {} ({})", destination, destination.addr);
            TcpStream::connect(destination.addr)
                .await
                .with_context(|| format!("failed to connect to \"{}\"", destination))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Accepts one no-auth CONNECT to an IPv4 target, then echoes four bytes.
    async fn serve_socks5_once(listener: TcpListener) -> Vec<u8> {
        let (mut client, _) = listener.accept().await.unwrap();

        let mut greeting = [0u8; 2];
        client.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 5);
        let mut methods = vec![0u8; greeting[1] as usize];
        client.read_exact(&mut methods).await.unwrap();
        assert!(methods.contains(&0));
        client.write_all(&[5, 0]).await.unwrap();

        let mut request = [0u8; 4];
        client.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[..3], &[5, 1, 0]);
        assert_eq!(request[3], 1, "expected an IPv4 target");
        let mut target = vec![0u8; 6];
        client.read_exact(&mut target).await.unwrap();
        client
            .write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0])
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        client.write_all(&buf).await.unwrap();
        target
    }

    #[tokio::test]
    async fn direct_connect_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dest = destination::resolve("127.0.0.1", port).await.unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.map(|(s, _)| s) });
        let stream = connect(&dest, None).await.expect("direct connect");
        let peer = accept.await.unwrap().unwrap();
        assert_eq!(stream.peer_addr().unwrap(), peer.local_addr().unwrap());
    }

    #[tokio::test]
    async fn direct_connect_refused_is_an_error() {
        let dest = destination::resolve("127.0.0.1", closed_port().await)
            .await
            .unwrap();
        let err = connect(&dest, None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to connect"));
    }

    #[tokio::test]
    async fn unreachable_proxy_is_an_error() {
        let dest = destination::resolve("127.0.0.1", 80).await.unwrap();
        let proxy = format!("127.0.0.1:{}", closed_port().await);
        let err = connect(&dest, Some(&proxy)).await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("socks5 proxy"), "{}", msg);
        assert!(msg.contains(&proxy), "{}", msg);
    }

    #[tokio::test]
    async fn connect_through_socks5_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy = listener.local_addr().unwrap().to_string();
        let proxy_task = tokio::spawn(serve_socks5_once(listener));

        let dest = destination::resolve("127.0.0.1", 4242).await.unwrap();
        let mut stream = connect(&dest, Some(&proxy)).await.expect("proxy connect");
        stream.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        stream.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");

        let target = proxy_task.await.unwrap();
        assert_eq!(&target[..4], &[127, 0, 0, 1]);
        assert_eq!(u16::from_be_bytes([target[4], target[5]]), 4242);
    }
}
