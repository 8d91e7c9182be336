use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::time::{Duration, Instant};

const PURGE_THRESHOLD: usize = 10_000;

#[derive(Clone)]
enum Entry {
    Valid(RefreshTokenRecord),
    Tombstone,
}

pub struct MemoryValidationCache {
    ttl: Duration,
    entries: DashMap<TokenHash, (Entry, Instant)>,
}

impl MemoryValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn purge_stale(&self, now: Instant) {
        if self.entries.len() >= PURGE_THRESHOLD {
            self.entries.retain(|_, (_, deadline)| *deadline > now);
        }
    }
}

#[async_trait::async_trait]
impl ValidationCache for MemoryValidationCache {
    async fn get(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let now = Instant::now();
        Ok(self.entries.get(hash).and_then(|slot| match &*slot {
            (Entry::Valid(rec), deadline) if *deadline > now => Some(rec.clone()),
            _ => None,
        }))
    }

    async fn put(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let now = Instant::now();
        self.purge_stale(now);
        let deadline = now + self.ttl;
        self.entries
            .entry(record.token_hash)
            .and_modify(|slot| {
                // a live tombstone wins over any late writer
                if matches!(slot, (Entry::Tombstone, d) if *d > now) {
                    return;
                }
                *slot = (Entry::Valid(record.clone()), deadline);
            })
            .or_insert_with(|| (Entry::Valid(record.clone()), deadline));
        Ok(())
    }

    async fn invalidate(&self, hash: &TokenHash) -> Result<(), AuthError> {
        let now = Instant::now();
        self.purge_stale(now);
        self.entries.insert(*hash, (Entry::Tombstone, now + self.ttl));
        Ok(())
    }
}
