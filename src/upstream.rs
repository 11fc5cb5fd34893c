use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ProxyError;

/// Opens a fresh connection to `host:port`, sends `request` and reads the
/// response until the origin closes the connection.
pub async fn fetch(
    host: &str,
    port: u16,
    request: &[u8],
    connect_timeout: Option<Duration>,
) -> Result<Vec<u8>, ProxyError> {
    let connect_err = |source| ProxyError::UpstreamConnect {
        host: host.to_string(),
        port,
        source,
    };

    let connect_future = TcpStream::connect((host, port));
    let mut server = match connect_timeout {
        Some(timeout_duration) => match timeout(timeout_duration, connect_future).await {
            Ok(res) => res.map_err(connect_err)?,
            Err(_) => {
                debug!("Upstream timeout {}:{}", host, port);
                return Err(connect_err(std::io::ErrorKind::TimedOut.into()));
            }
        },
        None => connect_future.await.map_err(connect_err)?,
    };

    let _ = server.set_nodelay(true);

    server.write_all(request).await.map_err(ProxyError::UpstreamIo)?;
    server.flush().await.map_err(ProxyError::UpstreamIo)?;

    let mut resp = Vec::new();
    server
        .read_to_end(&mut resp)
        .await
        .map_err(ProxyError::UpstreamIo)?;

    debug!("Fetched {} bytes from {}:{}", resp.len(), host, port);
    Ok(resp)
}
