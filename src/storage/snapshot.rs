//! Point-in-time copies of the keyspace.
//!
//! A [`Snapshot`] is what the persistence layer writes to disk and what the
//! engine bulk-loads at startup. It keeps each kind of value in its own
//! namespace and records expirations as unix-epoch milliseconds, because the
//! engine's monotonic `Instant`s mean nothing to another process.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A consistent copy of every live entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub strings: HashMap<Bytes, Bytes>,
    pub lists: HashMap<Bytes, Vec<Bytes>>,
    pub hashes: HashMap<Bytes, HashMap<Bytes, Bytes>>,
    pub sets: HashMap<Bytes, HashSet<Bytes>>,
    /// Absolute expiration per key, in milliseconds since the unix epoch.
    pub expiry: HashMap<Bytes, u64>,
}

impl Snapshot {
    /// Number of keys across all namespaces.
    pub fn len(&self) -> usize {
        self.strings.len() + self.lists.len() + self.hashes.len() + self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pairs a monotonic clock reading with a wall clock reading so the two
/// time bases can be converted into each other.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClockPair {
    now: Instant,
    wall_ms: u64,
}

impl ClockPair {
    pub(crate) fn now() -> Self {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            now: Instant::now(),
            wall_ms,
        }
    }

    pub(crate) fn instant(&self) -> Instant {
        self.now
    }

    /// Converts a deadline into unix-epoch milliseconds.
    pub(crate) fn to_unix_ms(&self, at: Instant) -> u64 {
        let remaining = at.saturating_duration_since(self.now);
        self.wall_ms + remaining.as_millis() as u64
    }

    /// Converts unix-epoch milliseconds into a deadline.
    pub(crate) fn to_instant(&self, unix_ms: u64) -> Deadline {
        if unix_ms <= self.wall_ms {
            return Deadline::Passed;
        }
        match self
            .now
            .checked_add(Duration::from_millis(unix_ms - self.wall_ms))
        {
            Some(at) => Deadline::At(at),
            None => Deadline::Unbounded,
        }
    }
}

/// A stored expiry, seen from the restoring process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Deadline {
    /// Already at or before now.
    Passed,
    At(Instant),
    /// Too far ahead for this platform's `Instant`; kept without expiry.
    Unbounded,
}
