use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::cache::{self, Source};
use crate::error::{ProxyError, RESPONSE_200};
use crate::request::{self, ParsedRequest};
use crate::route::Route;
use crate::state::ProxyState;
use crate::stats::Stats;

#[derive(Clone)]
pub struct ProxyConfig {
    pub state: Arc<ProxyState>,
    pub stats: Arc<Stats>,
    pub connect_timeout: Option<Duration>,
}

/// Serves exactly one request on `client` and closes it. Request and
/// upstream failures are answered with a status line; only client-side
/// I/O failures are returned.
pub async fn handle_connection<S>(
    mut client: S,
    client_addr: SocketAddr,
    config: ProxyConfig,
) -> Result<(), ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = match process(&mut client, &config).await {
        Ok(reply) => reply,
        Err(e) => {
            let Some(status) = e.status_line() else {
                return Err(e);
            };
            match e {
                ProxyError::BlockedDomain(ref host) => {
                    Stats::incr(&config.stats.blocked);
                    warn!("Blocked: {}", host);
                }
                ProxyError::UpstreamConnect { .. } | ProxyError::UpstreamIo(_) => {
                    Stats::incr(&config.stats.failed);
                    debug!("Upstream failure for {}: {}", client_addr, e);
                }
                _ => debug!("Rejected request from {}: {}", client_addr, e),
            }
            Cow::Borrowed(status)
        }
    };

    client.write_all(&reply).await?;
    client.flush().await?;
    config
        .stats
        .bytes_out
        .fetch_add(reply.len() as u64, Ordering::Relaxed);

    let _ = client.shutdown().await;
    Ok(())
}

async fn process<S>(client: &mut S, config: &ProxyConfig) -> Result<Cow<'static, [u8]>, ProxyError>
where
    S: AsyncRead + Unpin,
{
    let head = request::read_head(client).await?;
    let req = ParsedRequest::parse(&head)?;
    debug!("{} {} {}", req.method, req.uri, req.version);

    let target = match Route::from_uri(&req.uri)? {
        Route::Control(cmd) => {
            Stats::incr(&config.stats.control);
            if let Err(e) = config.state.apply(&cmd) {
                debug!("Control command ignored: {}", e);
            }
            return Ok(Cow::Borrowed(RESPONSE_200));
        }
        Route::Proxy(target) => target,
    };

    if config.state.is_blocked(&target.host) {
        return Err(ProxyError::BlockedDomain(target.host));
    }

    let (resp, source) =
        cache::serve(&config.state, &target, &req.headers, config.connect_timeout).await?;

    match source {
        Source::Fresh => Stats::incr(&config.stats.cache_misses),
        Source::Cached => Stats::incr(&config.stats.cache_hits),
        Source::Revalidated => Stats::incr(&config.stats.revalidated),
    }

    Ok(Cow::Owned(resp))
}
