use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::info;

use crate::blocklist;
use crate::error::ProxyError;
use crate::route::ControlCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Raw origin response, status line included.
    pub body: Vec<u8>,
    /// `Last-Modified` value from the response that produced `body`.
    pub last_modified: String,
}

#[derive(Default)]
struct Inner {
    cache_enabled: bool,
    block_enabled: bool,
    cache: HashMap<String, CacheEntry>,
    blocked: HashSet<String>,
}

/// Process-wide proxy state shared by every connection. All four fields sit
/// behind one lock and no method holds it past its own return.
#[derive(Default)]
pub struct ProxyState {
    inner: Mutex<Inner>,
}

impl ProxyState {
    pub fn new(cache_enabled: bool, block_enabled: bool, blocked: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cache_enabled,
                block_enabled,
                cache: HashMap::new(),
                blocked: blocked.into_iter().collect(),
            }),
        }
    }

    pub fn apply(&self, cmd: &ControlCommand) -> Result<(), ProxyError> {
        let mut inner = self.inner.lock();
        match cmd {
            ControlCommand::EnableCache => inner.cache_enabled = true,
            ControlCommand::DisableCache => inner.cache_enabled = false,
            ControlCommand::FlushCache => inner.cache.clear(),
            ControlCommand::EnableBlocklist => inner.block_enabled = true,
            ControlCommand::DisableBlocklist => inner.block_enabled = false,
            ControlCommand::FlushBlocklist => inner.blocked.clear(),
            ControlCommand::Block(host) => {
                inner.blocked.insert(host.clone());
            }
            ControlCommand::Unblock(host) => {
                if !inner.blocked.remove(host) {
                    return Err(ProxyError::NotBlocked(host.clone()));
                }
            }
        }
        drop(inner);
        info!("Control: {}", cmd);
        Ok(())
    }

    pub fn cache_enabled(&self) -> bool {
        self.inner.lock().cache_enabled
    }

    pub fn block_enabled(&self) -> bool {
        self.inner.lock().block_enabled
    }

    /// True when blocking is on and `host` matches the block list.
    pub fn is_blocked(&self, host: &str) -> bool {
        let inner = self.inner.lock();
        inner.block_enabled && blocklist::is_blocked(host, &inner.blocked)
    }

    #[cfg(test)]
    pub fn is_listed(&self, host: &str) -> bool {
        self.inner.lock().blocked.contains(host)
    }

    pub fn blocked_count(&self) -> usize {
        self.inner.lock().blocked.len()
    }

    /// Cache-enabled flag and the current entry for `key`, read atomically.
    pub fn lookup(&self, key: &str) -> (bool, Option<CacheEntry>) {
        let inner = self.inner.lock();
        (inner.cache_enabled, inner.cache.get(key).cloned())
    }

    /// Stores `entry` unless caching has been disabled meanwhile.
    pub fn store(&self, key: String, entry: CacheEntry) -> bool {
        let mut inner = self.inner.lock();
        if inner.cache_enabled {
            inner.cache.insert(key, entry);
        }
        inner.cache_enabled
    }

    #[cfg(test)]
    pub fn cached(&self, key: &str) -> Option<CacheEntry> {
        self.inner.lock().cache.get(key).cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(body: &str) -> CacheEntry {
        CacheEntry {
            body: body.as_bytes().to_vec(),
            last_modified: " yesterday".into(),
        }
    }

    #[test]
    fn test_flags_idempotent() {
        let state = ProxyState::default();
        assert!(!state.cache_enabled());

        state.apply(&ControlCommand::EnableCache).unwrap();
        state.apply(&ControlCommand::EnableCache).unwrap();
        assert!(state.cache_enabled());

        state.apply(&ControlCommand::DisableCache).unwrap();
        state.apply(&ControlCommand::DisableCache).unwrap();
        assert!(!state.cache_enabled());

        state.apply(&ControlCommand::EnableBlocklist).unwrap();
        assert!(state.block_enabled());
        state.apply(&ControlCommand::DisableBlocklist).unwrap();
        assert!(!state.block_enabled());
    }

    #[test]
    fn test_flush_cache() {
        let state = ProxyState::new(true, false, Vec::new());
        assert!(state.store("a.com/".into(), entry("a")));
        assert!(state.store("b.com/".into(), entry("b")));
        assert_eq!(state.cache_len(), 2);

        state.apply(&ControlCommand::FlushCache).unwrap();
        assert_eq!(state.cache_len(), 0);
    }

    #[test]
    fn test_store_requires_cache_enabled() {
        let state = ProxyState::default();
        assert!(!state.store("a.com/".into(), entry("a")));
        assert_eq!(state.cache_len(), 0);

        state.apply(&ControlCommand::EnableCache).unwrap();
        assert!(state.store("a.com/".into(), entry("a")));
        assert_eq!(state.cached("a.com/"), Some(entry("a")));

        // Disabling keeps entries; only a flush drops them.
        state.apply(&ControlCommand::DisableCache).unwrap();
        assert_eq!(state.cache_len(), 1);
    }

    #[test]
    fn test_block_unblock() {
        let state = ProxyState::default();
        state.apply(&ControlCommand::Block("evil".into())).unwrap();
        assert!(state.is_listed("evil"));

        // Listed but blocking disabled.
        assert!(!state.is_blocked("www.evil.com"));
        state.apply(&ControlCommand::EnableBlocklist).unwrap();
        assert!(state.is_blocked("www.evil.com"));

        state.apply(&ControlCommand::Unblock("evil".into())).unwrap();
        assert!(!state.is_blocked("www.evil.com"));

        let err = state.apply(&ControlCommand::Unblock("evil".into())).unwrap_err();
        assert!(matches!(err, ProxyError::NotBlocked(h) if h == "evil"));
    }

    #[test]
    fn test_flush_blocklist() {
        let state = ProxyState::new(false, true, vec!["a".into(), "b".into()]);
        assert_eq!(state.blocked_count(), 2);
        state.apply(&ControlCommand::FlushBlocklist).unwrap();
        assert_eq!(state.blocked_count(), 0);
    }

    #[test]
    fn test_concurrent_block_additions() {
        let state = Arc::new(ProxyState::default());
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    state.apply(&ControlCommand::Block(format!("host{}.com", i))).unwrap();
                    state.lookup("some.com/");
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(state.blocked_count(), 64);
        for i in 0..64 {
            assert!(state.is_listed(&format!("host{}.com", i)));
        }
    }
}
