use crate::discovery::{CapabilitySource, CommandTable};
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

struct CachedScan {
    table: Arc<CommandTable>,
    captured_at: Instant,
}

/// Whole-table cache over a [`CapabilitySource`]. The table is one unit:
/// either fresh (age below the TTL) or rebuilt in full. There is no
/// per-command expiry. The lock is held across a rescan, so at most one
/// rescan is in flight and no caller ever sees a half-populated table.
pub struct CommandCache {
    source: Arc<dyn CapabilitySource>,
    ttl: Duration,
    inner: Mutex<Option<CachedScan>>,
}

impl CommandCache {
    pub fn new(source: Arc<dyn CapabilitySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            inner: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Arc<CommandTable> {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.captured_at.elapsed() < self.ttl
        {
            return Arc::clone(&cached.table);
        }

        let table = Arc::new(self.source.scan().await);
        tracing::debug!("Refreshed command table with {} entries", table.len());
        *guard = Some(CachedScan {
            table: Arc::clone(&table),
            captured_at: Instant::now(),
        });
        table
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
        tracing::info!("Command table cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::CommandInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        scans: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                scans: AtomicUsize::new(0),
            })
        }

        fn scan_count(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CapabilitySource for CountingSource {
        async fn scan(&self) -> CommandTable {
            self.scans.fetch_add(1, Ordering::SeqCst);
            let mut table = CommandTable::new();
            table.insert("mr".to_string(), CommandInfo::synthetic("glab", "mr"));
            table
        }
    }

    #[tokio::test]
    async fn test_fresh_cache_serves_without_rescan() {
        let source = CountingSource::new();
        let cache = CommandCache::new(source.clone(), Duration::from_secs(300));

        let first = cache.get().await;
        let second = cache.get().await;
        assert_eq!(source.scan_count(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_triggers_exactly_one_rescan() {
        let source = CountingSource::new();
        let cache = CommandCache::new(source.clone(), Duration::from_secs(300));

        cache.get().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.get().await;
        cache.get().await;
        assert_eq!(source.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rescan() {
        let source = CountingSource::new();
        let cache = CommandCache::new(source.clone(), Duration::from_secs(300));

        cache.get().await;
        cache.invalidate().await;
        cache.get().await;
        assert_eq!(source.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_scan() {
        let source = CountingSource::new();
        let cache = Arc::new(CommandCache::new(source.clone(), Duration::from_secs(300)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for handle in handles {
            let table = handle.await.unwrap();
            assert_eq!(table.len(), 1);
        }
        assert_eq!(source.scan_count(), 1);
    }
}
