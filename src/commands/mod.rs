//! Command Handler Module
//!
//! This module implements the command processing layer for BoltKV.
//! It receives decoded requests, executes them against the storage engine,
//! the pub/sub broker or the snapshot store, and returns replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │  Vec<Bytes>
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine / │
//! │ Broker / Store  │
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - Server: `PING`, `ECHO`, `INFO`, `DBSIZE`, `FLUSHDB`, `SAVE`, `BGSAVE`
//! - Strings and keys: `GET`, `SET`, `DEL`, `EXISTS`, `SETEX`, `TTL`,
//!   `EXPIRE`, `PERSIST`, `TYPE`
//! - Lists: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LRANGE`, `LLEN`
//! - Hashes: `HSET`, `HGET`, `HDEL`, `HGETALL`, `HKEYS`, `HLEN`
//! - Sets: `SADD`, `SREM`, `SISMEMBER`, `SCARD`, `SMEMBERS`
//! - Pub/sub: `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`

pub mod handler;
pub mod table;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler, CommandResult};
pub use table::{CommandSpec, COMMANDS};
