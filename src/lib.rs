//! # BoltKV - An In-Memory Key-Value Server
//!
//! BoltKV is a Redis-style, in-memory key-value server written in Rust. It
//! speaks RESP over TCP and stores strings (with optional expiry), lists,
//! hashes and sets, with a small publish/subscribe facility on the side.
//!
//! ## Features
//!
//! - **RESP wire protocol**: works with `redis-cli` and common client libraries
//! - **Sharded storage**: 64 independently locked shards
//! - **Lazy + active expiry**: reads hide expired keys, a background sweeper
//!   removes them
//! - **Pub/Sub**: `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`
//! - **Snapshots**: `SAVE` / `BGSAVE` to a checksummed file, restored on start
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              BoltKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │──┐               │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │  │               │
//! │  └─────────────┘    └──────▲──────┘    └──────┬──────┘  │               │
//! │                            │ messages         │         ▼               │
//! │                     ┌──────┴──────┐           │   ┌──────────────┐      │
//! │                     │   Broker    │<──────────┤   │SnapshotStore │      │
//! │                     └─────────────┘           ▼   └──────────────┘      │
//! │                     ┌──────────────────────────────────────────────┐   │
//! │                     │              StorageEngine                   │   │
//! │                     │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │                     │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP request parser and reply types
//! - [`storage`]: Thread-safe storage engine, expiry sweeper, snapshots
//! - [`pubsub`]: Channel registry and message fan-out
//! - [`commands`]: Command table and dispatcher
//! - [`connection`]: Per-client session loop
//! - [`persistence`]: Snapshot stores
//! - [`config`]: Command-line and environment configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod pubsub;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{FileSnapshotStore, SnapshotStore};
pub use protocol::{ParseError, RequestParser, RespValue};
pub use pubsub::{Broker, Subscriber};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port BoltKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host BoltKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of BoltKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
