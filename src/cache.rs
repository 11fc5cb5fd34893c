use std::time::Duration;

use tracing::debug;

use crate::error::ProxyError;
use crate::response::{self, StatusLine};
use crate::route::ProxyTarget;
use crate::state::{CacheEntry, ProxyState};
use crate::upstream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Full fetch; caching off or no entry for the key.
    Fresh,
    /// Origin answered 304, cached body served.
    Cached,
    /// Entry existed but the origin sent a full response.
    Revalidated,
}

/// Produces the bytes to forward for `target`, going through the cache when
/// it is enabled. The state lock is only taken around lookups and stores,
/// never across upstream I/O.
pub async fn serve(
    state: &ProxyState,
    target: &ProxyTarget,
    headers: &str,
    connect_timeout: Option<Duration>,
) -> Result<(Vec<u8>, Source), ProxyError> {
    let key = target.cache_key();
    let (enabled, entry) = state.lookup(&key);

    let entry = match entry {
        Some(entry) if enabled => entry,
        _ => {
            let resp = upstream::fetch(
                &target.host,
                target.port,
                &target.full_request(headers),
                connect_timeout,
            )
            .await?;
            debug!("Cache miss: {}", key);
            if enabled {
                remember(state, key, &resp);
            }
            return Ok((resp, Source::Fresh));
        }
    };

    let resp = upstream::fetch(
        &target.host,
        target.port,
        &target.conditional_request(&entry.last_modified),
        connect_timeout,
    )
    .await?;

    match StatusLine::parse(&resp) {
        Some(status) if status.is_not_modified() => {
            debug!("Cache hit: {}", key);
            return Ok((entry.body, Source::Cached));
        }
        Some(status) => debug!(
            "Cache revalidated: {} ({} {} {})",
            key, status.version, status.code, status.reason
        ),
        None => debug!("Cache revalidated: {} (unparsable status line)", key),
    }
    remember(state, key, &resp);
    Ok((resp, Source::Revalidated))
}

/// Stores `resp` only if it carries a usable `Last-Modified`; otherwise any
/// existing entry is left in place.
fn remember(state: &ProxyState, key: String, resp: &[u8]) {
    if let Some(last_modified) = response::last_modified(resp) {
        state.store(
            key,
            CacheEntry {
                body: resp.to_vec(),
                last_modified,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ControlCommand;
    use crate::upstream::testing::Origin;

    const DATED: &str = "HTTP/1.0 200 OK\r\nLast-Modified: Wed, 21 Oct 2015 07:28:00 GMT\r\n\r\nv1";
    const DATED_V2: &str = "HTTP/1.0 200 OK\r\nLast-Modified: Thu, 22 Oct 2015 07:28:00 GMT\r\n\r\nv2";
    const UNDATED: &str = "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nplain";
    const NOT_MODIFIED: &str = "HTTP/1.0 304 Not Modified\r\n\r\n";

    fn target(port: u16) -> ProxyTarget {
        ProxyTarget {
            host: "127.0.0.1".into(),
            port,
            path: "/doc".into(),
        }
    }

    fn cache_on() -> ProxyState {
        let state = ProxyState::default();
        state.apply(&ControlCommand::EnableCache).unwrap();
        state
    }

    #[tokio::test]
    async fn test_cache_disabled_always_fetches() {
        let origin = Origin::start(vec![DATED]).await;
        let state = ProxyState::default();
        let t = target(origin.port);

        for expected_hits in 1..=2 {
            let (resp, source) = serve(&state, &t, "\r\n", None).await.unwrap();
            assert_eq!(resp, DATED.as_bytes());
            assert_eq!(source, Source::Fresh);
            assert_eq!(origin.hits(), expected_hits);
        }
        assert_eq!(state.cache_len(), 0);
        assert!(!origin.request(1).contains("If-Modified-Since"));
    }

    #[tokio::test]
    async fn test_forwards_client_headers() {
        let origin = Origin::start(vec![UNDATED]).await;
        let state = ProxyState::default();

        serve(&state, &target(origin.port), "Accept: */*\r\n\r\n", None)
            .await
            .unwrap();

        assert_eq!(
            origin.request(0),
            "GET /doc HTTP/1.0\r\nHost: 127.0.0.1\r\nConnection: close\r\nAccept: */*\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_round_trip_not_modified() {
        let origin = Origin::start(vec![DATED, NOT_MODIFIED]).await;
        let state = cache_on();
        let t = target(origin.port);

        let (first, source) = serve(&state, &t, "\r\n", None).await.unwrap();
        assert_eq!(source, Source::Fresh);
        assert_eq!(
            state.cached("127.0.0.1/doc").unwrap().last_modified,
            " Wed, 21 Oct 2015 07:28:00 GMT"
        );

        let (second, source) = serve(&state, &t, "Accept: */*\r\n\r\n", None).await.unwrap();
        assert_eq!(source, Source::Cached);
        assert_eq!(second, first);
        assert_eq!(origin.hits(), 2);
        assert_eq!(
            origin.request(1),
            "GET /doc HTTP/1.0\r\nHost: 127.0.0.1\r\nIf-Modified-Since: Wed, 21 Oct 2015 07:28:00 GMT\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_revalidation_replaces_entry() {
        let origin = Origin::start(vec![DATED, DATED_V2]).await;
        let state = cache_on();
        let t = target(origin.port);

        serve(&state, &t, "\r\n", None).await.unwrap();
        let (resp, source) = serve(&state, &t, "\r\n", None).await.unwrap();

        assert_eq!(source, Source::Revalidated);
        assert_eq!(resp, DATED_V2.as_bytes());
        assert_eq!(state.cached("127.0.0.1/doc").unwrap().body, DATED_V2.as_bytes());
    }

    #[tokio::test]
    async fn test_revalidation_without_date_keeps_stale_entry() {
        let origin = Origin::start(vec![DATED, UNDATED]).await;
        let state = cache_on();
        let t = target(origin.port);

        serve(&state, &t, "\r\n", None).await.unwrap();
        let (resp, source) = serve(&state, &t, "\r\n", None).await.unwrap();

        assert_eq!(source, Source::Revalidated);
        assert_eq!(resp, UNDATED.as_bytes());
        assert_eq!(state.cached("127.0.0.1/doc").unwrap().body, DATED.as_bytes());
    }

    #[tokio::test]
    async fn test_undated_response_never_cached() {
        let origin = Origin::start(vec![UNDATED]).await;
        let state = cache_on();
        let t = target(origin.port);

        serve(&state, &t, "\r\n", None).await.unwrap();
        serve(&state, &t, "\r\n", None).await.unwrap();

        assert_eq!(state.cache_len(), 0);
        assert!(!origin.request(1).contains("If-Modified-Since"));
    }

    #[tokio::test]
    async fn test_flushed_entry_fetched_fresh() {
        let origin = Origin::start(vec![DATED]).await;
        let state = cache_on();
        let t = target(origin.port);

        serve(&state, &t, "\r\n", None).await.unwrap();
        state.apply(&ControlCommand::FlushCache).unwrap();
        let (_, source) = serve(&state, &t, "\r\n", None).await.unwrap();

        assert_eq!(source, Source::Fresh);
        assert!(!origin.request(1).contains("If-Modified-Since"));
    }
}
