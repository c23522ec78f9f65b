//! Storage Engine Module
//!
//! This module provides the core storage functionality for BoltKV.
//! It includes a thread-safe, sharded keyspace holding strings, lists, hashes
//! and sets with TTL support, a background expiry sweeper, and the
//! [`Snapshot`] type used for persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                                   │
//!          │                                   ▼ snapshot()
//!  ┌───────┴───────────┐             ┌───────────────────┐
//!  │   ExpirySweeper   │             │     Snapshot      │
//!  │  (Tokio task, 1s) │             │ (serde, per kind) │
//!  └───────────────────┘             └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use boltkv::storage::{KeyTtl, StorageEngine};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name").unwrap(), Some(Bytes::from("Ariz")));
//!
//! engine.hset(Bytes::from("user:1"), vec![(Bytes::from("lang"), Bytes::from("rust"))]).unwrap();
//! assert!(engine.get(b"user:1").is_err()); // WRONGTYPE
//!
//! engine.expire(b"name", Duration::from_secs(3600)).unwrap();
//! assert!(matches!(engine.ttl(b"name"), KeyTtl::HasExpiry(_)));
//! ```

pub mod engine;
pub mod expiry;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{
    Entry, KeyTtl, StorageEngine, StorageError, StorageResult, StorageStats, Value,
};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use snapshot::Snapshot;
