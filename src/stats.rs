use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::state::ProxyState;

#[derive(Default)]
pub struct Stats {
    pub total: AtomicU64,
    pub active: AtomicU64,
    pub control: AtomicU64,
    pub blocked: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub revalidated: AtomicU64,
    pub failed: AtomicU64,
    pub bytes_out: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn print(&self, state: &ProxyState) {
        info!(
            "total={} active={} control={} blocked={} hits={} misses={} revalidated={} failed={} out={}KB cached={} blocklist={}",
            self.total.load(Ordering::Relaxed),
            self.active.load(Ordering::Relaxed),
            self.control.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
            self.revalidated.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed) / 1_000,
            state.cache_len(),
            state.blocked_count(),
        );
    }
}
