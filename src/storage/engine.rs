//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core storage engine for BoltKV.
//! Every key maps to one [`Entry`] holding a typed [`Value`] (string, list,
//! hash or set) and an optional expiration deadline.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **One Keyspace**: A key holds exactly one kind of value; typed commands
//!    against another kind fail with [`StorageError::WrongType`].
//! 3. **Lazy Expiry**: Reads treat expired entries as absent without removing
//!    them. Writes purge an expired entry before touching the key, and the
//!    background sweeper removes the rest.
//! 4. **Empty Containers Vanish**: Popping the last list element, deleting the
//!    last hash field or removing the last set member deletes the key.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every public operation is a single critical section on the shard that owns
//! the key, so read-modify-write commands are atomic per key. [`StorageEngine::snapshot`]
//! holds every shard's read lock at once to copy a single consistent instant.

use crate::storage::snapshot::{ClockPair, Deadline, Snapshot};
use bytes::Bytes;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
/// 64 is a good balance for most workloads.
const NUM_SHARDS: usize = 64;

/// Errors returned by typed storage operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("invalid expire time")]
    ExpireOverflow,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Absolute deadline `ttl` from now.
fn deadline(ttl: Duration) -> StorageResult<Instant> {
    Instant::now()
        .checked_add(ttl)
        .ok_or(StorageError::ExpireOverflow)
}

/// The value held by a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
}

impl Value {
    /// The name reported by the TYPE command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }

    fn as_string(&self) -> StorageResult<&Bytes> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_list(&self) -> StorageResult<&VecDeque<Bytes>> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_list_mut(&mut self) -> StorageResult<&mut VecDeque<Bytes>> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_hash(&self) -> StorageResult<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_hash_mut(&mut self) -> StorageResult<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Ok(h),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_set(&self) -> StorageResult<&HashSet<Bytes>> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }

    fn as_set_mut(&mut self) -> StorageResult<&mut HashSet<Bytes>> {
        match self {
            Value::Set(s) => Ok(s),
            _ => Err(StorageError::WrongType),
        }
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
        }
    }
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry that expires at `at`.
    pub fn with_expiry(value: Value, at: Instant) -> Self {
        Self {
            value,
            expires_at: Some(at),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks expiry against a caller-supplied clock reading.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Remaining lifetime of a key, as reported by [`StorageEngine::ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist or its deadline has passed.
    Expired,
    /// The key exists and never expires.
    NoExpiry,
    /// The key exists and expires after the given duration.
    HasExpiry(Duration),
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard containing a portion of the keyspace.
#[derive(Debug, Default)]
struct Shard {
    entries: RwLock<ShardMap>,
}

/// The main storage engine for BoltKV.
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks and the expiry sweeper.
///
/// # Example
///
/// ```
/// use boltkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name").unwrap(), Some(Bytes::from("Ariz")));
///
/// engine.rpush(Bytes::from("queue"), vec![Bytes::from("job-1")]).unwrap();
/// assert_eq!(engine.llen(b"queue").unwrap(), 1);
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60)).unwrap();
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Statistics: GET calls that found a value
    hit_count: AtomicU64,

    /// Statistics: GET calls that found nothing
    miss_count: AtomicU64,

    /// Statistics: number of expired keys cleaned up
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .field("expired", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Runs `f` against the live value of `key` under a read lock.
    ///
    /// Returns `Ok(None)` if the key is absent or expired.
    fn read<T>(
        &self,
        key: &[u8],
        f: impl FnOnce(&Value) -> StorageResult<T>,
    ) -> StorageResult<Option<T>> {
        let entries = self.get_shard(key).entries.read();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => f(&entry.value).map(Some),
            _ => Ok(None),
        }
    }

    /// Takes the write lock for `key`'s shard, first purging the key if it
    /// has expired so callers only ever see live entries.
    fn write(&self, key: &[u8]) -> RwLockWriteGuard<'_, ShardMap> {
        let mut entries = self.get_shard(key).entries.write();
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
        entries
    }

    /// Applies `f` to an existing value and deletes the key if that leaves
    /// an empty container behind.
    fn update<T>(
        &self,
        key: &[u8],
        f: impl FnOnce(&mut Value) -> StorageResult<T>,
    ) -> StorageResult<Option<T>> {
        let mut entries = self.write(key);
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };

        let result = f(&mut entry.value)?;
        if entry.value.is_empty_container() {
            entries.remove(key);
        }
        Ok(Some(result))
    }

    /// Applies `f` to the value at `key`, creating it with `init` if absent.
    fn upsert<T>(
        &self,
        key: Bytes,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut entries = self.write(&key);
        let entry = entries
            .entry(key)
            .or_insert_with(|| Entry::new(init()));
        f(&mut entry.value)
    }

    // ========================================================================
    // STRING OPERATIONS
    // ========================================================================

    /// Sets a key-value pair without expiry.
    ///
    /// Any previous value, of any kind, and any previous expiry are replaced.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        let mut entries = self.write(&key);
        entries
            .insert(key, Entry::new(Value::String(value)))
            .is_none()
    }

    /// Sets a key-value pair that expires at the absolute instant `at`.
    pub fn set_with_expiry(&self, key: Bytes, value: Bytes, at: Instant) -> bool {
        let mut entries = self.write(&key);
        entries
            .insert(key, Entry::with_expiry(Value::String(value), at))
            .is_none()
    }

    /// Sets a key-value pair with a TTL (Time-To-Live).
    ///
    /// Fails with [`StorageError::ExpireOverflow`] if the deadline cannot be
    /// represented; nothing is written in that case.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> StorageResult<bool> {
        let at = deadline(ttl)?;
        Ok(self.set_with_expiry(key, value, at))
    }

    /// Gets the string value for a key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired. An expired
    /// key is left in place for the sweeper.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let value = self.read(key, |v| v.as_string().cloned())?;
        let counter = if value.is_some() {
            &self.hit_count
        } else {
            &self.miss_count
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    // ========================================================================
    // KEY OPERATIONS
    // ========================================================================

    /// Checks if a key of any kind exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        let entries = self.get_shard(key).entries.read();
        entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Counts how many of the given keys exist.
    pub fn exists_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.exists(k)).count() as u64
    }

    /// Deletes a key of any kind.
    ///
    /// # Returns
    ///
    /// Returns `true` if a live key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut entries = self.write(key);
        entries.remove(key).is_some()
    }

    /// Deletes multiple keys, returning how many were removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|k| self.delete(k)).count() as u64
    }

    /// Sets an absolute expiry on an existing key.
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was set, `false` if the key doesn't exist.
    pub fn expire_at(&self, key: &[u8], at: Instant) -> bool {
        let mut entries = self.write(key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Sets an expiry relative to now on an existing key.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> StorageResult<bool> {
        let at = deadline(ttl)?;
        Ok(self.expire_at(key, at))
    }

    /// Removes the expiry from a key (makes it persistent).
    ///
    /// # Returns
    ///
    /// Returns `true` if an expiry was removed, `false` if the key doesn't
    /// exist or didn't have one.
    pub fn persist(&self, key: &[u8]) -> bool {
        let mut entries = self.write(key);
        entries
            .get_mut(key)
            .and_then(|entry| entry.expires_at.take())
            .is_some()
    }

    /// Reports the remaining lifetime of a key.
    pub fn ttl(&self, key: &[u8]) -> KeyTtl {
        let entries = self.get_shard(key).entries.read();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => match entry.expires_at {
                Some(at) => KeyTtl::HasExpiry(at - now),
                None => KeyTtl::NoExpiry,
            },
            _ => KeyTtl::Expired,
        }
    }

    /// Returns the type of a key ("string", "list", "hash", "set" or "none").
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        self.read(key, |v| Ok(v.type_name()))
            .ok()
            .flatten()
            .unwrap_or("none")
    }

    // ========================================================================
    // LIST OPERATIONS
    // ========================================================================

    /// Pushes values to the head of a list, one at a time, so
    /// `LPUSH key a b c` leaves `[c, b, a]`. Creates the list if needed.
    ///
    /// # Returns
    /// The length of the list after the push operation.
    pub fn lpush(&self, key: Bytes, values: Vec<Bytes>) -> StorageResult<usize> {
        self.push(key, values, true)
    }

    /// Pushes values to the tail of a list. Creates the list if needed.
    ///
    /// # Returns
    /// The length of the list after the push operation.
    pub fn rpush(&self, key: Bytes, values: Vec<Bytes>) -> StorageResult<usize> {
        self.push(key, values, false)
    }

    fn push(&self, key: Bytes, values: Vec<Bytes>, front: bool) -> StorageResult<usize> {
        if values.is_empty() {
            return self.llen(&key);
        }
        self.upsert(
            key,
            || Value::List(VecDeque::new()),
            |value| {
                let list = value.as_list_mut()?;
                for v in values {
                    if front {
                        list.push_front(v);
                    } else {
                        list.push_back(v);
                    }
                }
                Ok(list.len())
            },
        )
    }

    /// Removes and returns the first element (head) of a list.
    pub fn lpop(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        Ok(self.update(key, |v| Ok(v.as_list_mut()?.pop_front()))?.flatten())
    }

    /// Removes and returns the last element (tail) of a list.
    pub fn rpop(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        Ok(self.update(key, |v| Ok(v.as_list_mut()?.pop_back()))?.flatten())
    }

    /// Returns the length of a list, or 0 if the key doesn't exist.
    pub fn llen(&self, key: &[u8]) -> StorageResult<usize> {
        Ok(self.read(key, |v| Ok(v.as_list()?.len()))?.unwrap_or(0))
    }

    /// Returns a range of elements from a list.
    ///
    /// Both start and stop are inclusive. Negative indices count from the end
    /// (-1 is the last element) and out-of-range bounds are clamped.
    ///
    /// # Returns
    /// `None` if the key doesn't exist, otherwise the (possibly empty) slice.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> StorageResult<Option<Vec<Bytes>>> {
        self.read(key, |v| {
            let list = v.as_list()?;
            let len = list.len() as i64;

            let start = if start < 0 { (len + start).max(0) } else { start };
            let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

            if start > stop || start >= len {
                return Ok(Vec::new());
            }

            Ok(list
                .iter()
                .skip(start as usize)
                .take((stop - start + 1) as usize)
                .cloned()
                .collect())
        })
    }

    // ========================================================================
    // HASH OPERATIONS
    // ========================================================================

    /// Sets hash fields, creating the hash if needed.
    ///
    /// # Returns
    /// The number of fields that were newly created (updates count as 0).
    pub fn hset(&self, key: Bytes, pairs: Vec<(Bytes, Bytes)>) -> StorageResult<usize> {
        if pairs.is_empty() {
            return self.hlen(&key).map(|_| 0);
        }
        self.upsert(
            key,
            || Value::Hash(HashMap::new()),
            |value| {
                let hash = value.as_hash_mut()?;
                let mut created = 0;
                for (field, val) in pairs {
                    if hash.insert(field, val).is_none() {
                        created += 1;
                    }
                }
                Ok(created)
            },
        )
    }

    /// Gets one field of a hash.
    pub fn hget(&self, key: &[u8], field: &[u8]) -> StorageResult<Option<Bytes>> {
        Ok(self.read(key, |v| Ok(v.as_hash()?.get(field).cloned()))?.flatten())
    }

    /// Deletes hash fields, returning how many existed.
    pub fn hdel(&self, key: &[u8], fields: &[Bytes]) -> StorageResult<usize> {
        let removed = self.update(key, |v| {
            let hash = v.as_hash_mut()?;
            Ok(fields.iter().filter(|f| hash.remove(*f).is_some()).count())
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Returns all fields and values as `[field, value, field, value, ...]`.
    pub fn hgetall(&self, key: &[u8]) -> StorageResult<Vec<Bytes>> {
        let flat = self.read(key, |v| {
            Ok(v.as_hash()?
                .iter()
                .flat_map(|(f, val)| [f.clone(), val.clone()])
                .collect())
        })?;
        Ok(flat.unwrap_or_default())
    }

    /// Returns the field names of a hash.
    pub fn hkeys(&self, key: &[u8]) -> StorageResult<Vec<Bytes>> {
        let keys = self.read(key, |v| Ok(v.as_hash()?.keys().cloned().collect()))?;
        Ok(keys.unwrap_or_default())
    }

    /// Returns the number of fields in a hash.
    pub fn hlen(&self, key: &[u8]) -> StorageResult<usize> {
        Ok(self.read(key, |v| Ok(v.as_hash()?.len()))?.unwrap_or(0))
    }

    // ========================================================================
    // SET OPERATIONS
    // ========================================================================

    /// Adds members to a set, creating it if needed.
    ///
    /// # Returns
    /// The number of members that were not already present.
    pub fn sadd(&self, key: Bytes, members: Vec<Bytes>) -> StorageResult<usize> {
        if members.is_empty() {
            return self.scard(&key).map(|_| 0);
        }
        self.upsert(
            key,
            || Value::Set(HashSet::new()),
            |value| {
                let set = value.as_set_mut()?;
                Ok(members.into_iter().filter(|m| set.insert(m.clone())).count())
            },
        )
    }

    /// Removes members from a set, returning how many were present.
    pub fn srem(&self, key: &[u8], members: &[Bytes]) -> StorageResult<usize> {
        let removed = self.update(key, |v| {
            let set = v.as_set_mut()?;
            Ok(members.iter().filter(|m| set.remove(*m)).count())
        })?;
        Ok(removed.unwrap_or(0))
    }

    /// Returns every member of a set.
    pub fn smembers(&self, key: &[u8]) -> StorageResult<Vec<Bytes>> {
        let members = self.read(key, |v| Ok(v.as_set()?.iter().cloned().collect()))?;
        Ok(members.unwrap_or_default())
    }

    /// Checks set membership.
    pub fn sismember(&self, key: &[u8], member: &[u8]) -> StorageResult<bool> {
        Ok(self
            .read(key, |v| Ok(v.as_set()?.contains(member)))?
            .unwrap_or(false))
    }

    /// Returns the number of members in a set.
    pub fn scard(&self, key: &[u8]) -> StorageResult<usize> {
        Ok(self.read(key, |v| Ok(v.as_set()?.len()))?.unwrap_or(0))
    }

    // ========================================================================
    // WHOLE-KEYSPACE OPERATIONS
    // ========================================================================

    /// Clears all data from the database.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.entries.write().clear();
        }
    }

    /// Returns the number of stored keys, including expired keys the sweeper
    /// has not reached yet.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.read().len()).sum()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        let now = Instant::now();
        let mut keys = 0;
        let mut expires = 0;

        for shard in &self.shards {
            let entries = shard.entries.read();
            for entry in entries.values().filter(|e| !e.is_expired_at(now)) {
                keys += 1;
                if entry.expires_at.is_some() {
                    expires += 1;
                }
            }
        }

        StorageStats {
            keys,
            expires,
            expired: self.expired_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Removes every expired key from all shards.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut entries = shard.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += (before - entries.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Copies every live entry at a single instant.
    ///
    /// All shard read locks are held together while copying, so no write can
    /// land halfway through. Expired entries are left out.
    pub fn snapshot(&self) -> Snapshot {
        let guards: Vec<_> = self.shards.iter().map(|s| s.entries.read()).collect();
        let clock = ClockPair::now();
        let mut snapshot = Snapshot::default();

        for entries in &guards {
            for (key, entry) in entries.iter() {
                if entry.is_expired_at(clock.instant()) {
                    continue;
                }
                match &entry.value {
                    Value::String(s) => {
                        snapshot.strings.insert(key.clone(), s.clone());
                    }
                    Value::List(l) => {
                        snapshot.lists.insert(key.clone(), l.iter().cloned().collect());
                    }
                    Value::Hash(h) => {
                        snapshot.hashes.insert(key.clone(), h.clone());
                    }
                    Value::Set(s) => {
                        snapshot.sets.insert(key.clone(), s.clone());
                    }
                }
                if let Some(at) = entry.expires_at {
                    snapshot.expiry.insert(key.clone(), clock.to_unix_ms(at));
                }
            }
        }

        snapshot
    }

    /// Bulk-loads a snapshot, overwriting keys that already exist.
    ///
    /// Entries whose recorded expiry is already in the past are skipped, as
    /// are empty containers. If a key appears in more than one namespace the
    /// later one (strings, lists, hashes, sets) wins.
    ///
    /// # Returns
    ///
    /// Returns the number of keys loaded.
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        let clock = ClockPair::now();
        let Snapshot {
            strings,
            lists,
            hashes,
            sets,
            expiry,
        } = snapshot;

        let values = strings
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .chain(lists.into_iter().map(|(k, v)| (k, Value::List(v.into()))))
            .chain(hashes.into_iter().map(|(k, v)| (k, Value::Hash(v))))
            .chain(sets.into_iter().map(|(k, v)| (k, Value::Set(v))));

        let mut loaded = 0;
        for (key, value) in values {
            if value.is_empty_container() {
                continue;
            }
            let entry = match expiry.get(&key) {
                Some(&unix_ms) => match clock.to_instant(unix_ms) {
                    Deadline::At(at) => Entry::with_expiry(value, at),
                    Deadline::Unbounded => Entry::new(value),
                    Deadline::Passed => continue,
                },
                None => Entry::new(value),
            };
            self.get_shard(&key).entries.write().insert(key, entry);
            loaded += 1;
        }

        loaded
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of live keys
    pub keys: u64,
    /// Live keys that carry an expiry
    pub expires: u64,
    /// Total expired keys cleaned up
    pub expired: u64,
    /// GET calls that found a value
    pub hits: u64,
    /// GET calls that found nothing
    pub misses: u64,
}
