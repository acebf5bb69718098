use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::sequence::SequenceId;

/// When a dedup record stops suppressing its package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    At(Instant),
    Never,
}

impl Expiry {
    /// `None` means the record never expires.
    pub fn after(now: Instant, ttl: Option<Duration>) -> Self {
        match ttl.and_then(|ttl| now.checked_add(ttl)) {
            Some(at) => Expiry::At(at),
            None => Expiry::Never,
        }
    }

    pub fn is_expired(self, now: Instant) -> bool {
        match self {
            Expiry::At(at) => now >= at,
            Expiry::Never => false,
        }
    }
}

/// Ids of packages the application has declared settled.
///
/// Not synchronized; the listener wraps it in its own mutex.
#[derive(Debug, Default)]
pub struct DedupTable {
    records: HashMap<SequenceId, Expiry>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as settled. Re-registering replaces the expiry.
    pub fn register(&mut self, id: SequenceId, expiry: Expiry) {
        self.records.insert(id, expiry);
    }

    pub fn contains(&self, id: SequenceId) -> bool {
        self.records.contains_key(&id)
    }

    /// Whether `id` is recorded and its expiry has not passed at `now`.
    ///
    /// Records that have expired but not yet been swept count as absent.
    pub fn contains_live(&self, id: SequenceId, now: Instant) -> bool {
        self.records
            .get(&id)
            .is_some_and(|expiry| !expiry.is_expired(now))
    }

    pub fn remove(&mut self, id: SequenceId) -> bool {
        self.records.remove(&id).is_some()
    }

    /// Remove every record expired at `now` and return their ids in ascending
    /// order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<SequenceId> {
        let mut expired: Vec<SequenceId> = self
            .records
            .iter()
            .filter(|(_, expiry)| expiry.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.records.remove(id);
        }
        expired.sort_unstable();
        expired
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
