//! Applied key/value state of one routing group

use crate::storage::StorageEvent;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Ordered key/value data that command handlers read and mutate.
///
/// Write handlers may also record [`StorageEvent`]s; the store publishes them
/// once the command has been applied.
///
/// Expired entries read as absent and are dropped by the next write.
#[derive(Debug, Default)]
pub struct ShardData {
    entries: BTreeMap<Vec<u8>, Entry>,
    /// Deadlines of TTL writes in expiry order. May hold stale pairs for keys
    /// that were overwritten or deleted since.
    expiry: BTreeSet<(Instant, Vec<u8>)>,
    events: Vec<StorageEvent>,
}

impl ShardData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.as_slice())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.purge_expired(Instant::now());
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    /// Stores `value` until `ttl` elapses. A zero TTL, or one too large to
    /// represent as a deadline, never expires.
    pub fn set_with_ttl(&mut self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        self.purge_expired(now);
        let expires_at = if ttl.is_zero() { None } else { now.checked_add(ttl) };
        if let Some(at) = expires_at {
            self.expiry.insert((at, key.clone()));
        }
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drops every entry whose deadline has passed, returning how many.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some((at, _)) = self.expiry.first() {
            if *at > now {
                break;
            }
            let Some((at, key)) = self.expiry.pop_first() else {
                break;
            };
            // Only remove the entry if this deadline is still its own
            if self.entries.get(&key).map_or(false, |e| e.expires_at == Some(at)) {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every key in `[start, end)`, returning how many were removed.
    pub fn delete_range(&mut self, start: &[u8], end: &[u8]) -> usize {
        if start >= end {
            return 0;
        }
        let doomed: Vec<Vec<u8>> = self
            .entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed.len()
    }

    /// Live entries in `[start, end)` in key order, at most `limit` of them
    /// (`0` means no limit).
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<(&[u8], &[u8])> {
        if start >= end {
            return Vec::new();
        }
        let now = Instant::now();
        let live = self
            .entries
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, entry)| (key.as_slice(), entry.value.as_slice()));

        if limit == 0 {
            live.collect()
        } else {
            live.take(limit).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn emit(&mut self, event: StorageEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<StorageEvent> {
        std::mem::take(&mut self.events)
    }
}
