//! Command Handler Module
//!
//! Routes a decoded request to the storage engine, the pub/sub broker or the
//! snapshot store and builds the reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  lookup()   │───>│ arity check │───>│ dispatch()  │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                 ┌─────────────────┬───────────┴──────┐      │
//! │                 ▼                 ▼                  ▼      │
//! │          StorageEngine         Broker         SnapshotStore │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure short of a framing error becomes an error reply; the
//! connection keeps going.

use crate::commands::table::{self, CommandSpec};
use crate::connection::ConnectionStats;
use crate::persistence::{PersistError, SnapshotStore};
use crate::protocol::RespValue;
use crate::pubsub::{Broker, Subscriber};
use crate::storage::{KeyTtl, StorageEngine, StorageError};
use bytes::Bytes;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, error, info};

/// Why a command produced an error reply.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid operation")]
    UnknownCommand,

    #[error("Wrong number of arguments")]
    WrongArity,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("invalid expire time")]
    InvalidExpire,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("persistence is disabled")]
    PersistenceDisabled,

    #[error("{0}")]
    Persistence(#[from] PersistError),
}

pub type CommandResult = Result<RespValue, CommandError>;

/// Executes commands against the shared server state.
///
/// Cheap to clone; each connection holds its own clone.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    broker: Arc<Broker>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    stats: Arc<ConnectionStats>,
    /// Server start time for INFO command
    start_time: Instant,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("storage", &self.storage)
            .field("persistence", &self.snapshots.is_some())
            .finish()
    }
}

impl CommandHandler {
    /// Creates a handler. Without a snapshot store, `SAVE` and `BGSAVE`
    /// reply with an error.
    pub fn new(
        storage: Arc<StorageEngine>,
        broker: Arc<Broker>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self {
            storage,
            broker,
            snapshots,
            stats: Arc::new(ConnectionStats::new()),
            start_time: Instant::now(),
        }
    }

    /// Shares the server's connection statistics so INFO can report them.
    pub fn with_stats(mut self, stats: Arc<ConnectionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Executes one request on behalf of `client` and returns the reply.
    ///
    /// The first argument is the verb.
    pub fn execute(&self, args: Vec<Bytes>, client: &Subscriber) -> RespValue {
        match self.try_execute(&args, client) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(
                    client = client.id(),
                    command = %args.first().map(|v| String::from_utf8_lossy(v)).unwrap_or_default(),
                    error = %e,
                    "Command failed"
                );
                RespValue::error(e.to_string())
            }
        }
    }

    fn try_execute(&self, args: &[Bytes], client: &Subscriber) -> CommandResult {
        let (verb, rest) = args.split_first().ok_or(CommandError::UnknownCommand)?;
        let spec = table::lookup(verb).ok_or(CommandError::UnknownCommand)?;
        if rest.len() < spec.min_args {
            return Err(CommandError::WrongArity);
        }
        self.dispatch(spec, rest, client)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, spec: &CommandSpec, args: &[Bytes], client: &Subscriber) -> CommandResult {
        match spec.name {
            // Server commands
            "PING" => self.cmd_ping(args),
            "ECHO" => Ok(RespValue::bulk_string(args[0].clone())),
            "DBSIZE" => Ok(RespValue::integer(self.storage.stats().keys as i64)),
            "FLUSHDB" => self.cmd_flushdb(),
            "INFO" => self.cmd_info(args),
            "SAVE" => self.cmd_save(),
            "BGSAVE" => self.cmd_bgsave(),

            // String and key commands
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),
            "DEL" => Ok(RespValue::integer(self.storage.delete_many(args) as i64)),
            "EXISTS" => Ok(RespValue::integer(self.storage.exists_many(args) as i64)),
            "SETEX" => self.cmd_setex(args),
            "TTL" => self.cmd_ttl(args),
            "EXPIRE" => self.cmd_expire(args),
            "PERSIST" => Ok(bool_reply(self.storage.persist(&args[0]))),
            "TYPE" => Ok(RespValue::simple_string(self.storage.key_type(&args[0]))),

            // List commands
            "LPUSH" => self.cmd_lpush(args),
            "RPUSH" => self.cmd_rpush(args),
            "LPOP" => Ok(RespValue::optional_bulk(self.storage.lpop(&args[0])?)),
            "RPOP" => Ok(RespValue::optional_bulk(self.storage.rpop(&args[0])?)),
            "LRANGE" => self.cmd_lrange(args),
            "LLEN" => Ok(len_reply(self.storage.llen(&args[0])?)),

            // Hash commands
            "HSET" => self.cmd_hset(args),
            "HGET" => Ok(RespValue::optional_bulk(
                self.storage.hget(&args[0], &args[1])?,
            )),
            "HDEL" => Ok(len_reply(self.storage.hdel(&args[0], &args[1..])?)),
            "HGETALL" => Ok(RespValue::bulk_array(self.storage.hgetall(&args[0])?)),
            "HKEYS" => Ok(RespValue::bulk_array(self.storage.hkeys(&args[0])?)),
            "HLEN" => Ok(len_reply(self.storage.hlen(&args[0])?)),

            // Set commands
            "SADD" => self.cmd_sadd(args),
            "SREM" => Ok(len_reply(self.storage.srem(&args[0], &args[1..])?)),
            "SISMEMBER" => Ok(bool_reply(self.storage.sismember(&args[0], &args[1])?)),
            "SCARD" => Ok(len_reply(self.storage.scard(&args[0])?)),
            "SMEMBERS" => Ok(RespValue::bulk_array(self.storage.smembers(&args[0])?)),

            // Pub/sub commands
            "SUBSCRIBE" => self.cmd_subscribe(args, client),
            "UNSUBSCRIBE" => {
                self.broker.unsubscribe(&args[0], client);
                Ok(RespValue::ok())
            }
            "PUBLISH" => Ok(len_reply(self.broker.publish(&args[0], args[1].clone()))),

            _ => Err(CommandError::UnknownCommand),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> CommandResult {
        Ok(match args.first() {
            Some(message) => RespValue::bulk_string(message.clone()),
            None => RespValue::pong(),
        })
    }

    /// FLUSHDB
    fn cmd_flushdb(&self) -> CommandResult {
        self.storage.flush();
        info!("Database flushed");
        Ok(RespValue::ok())
    }

    /// INFO [section]
    fn cmd_info(&self, args: &[Bytes]) -> CommandResult {
        let wanted = args
            .first()
            .map(|s| String::from_utf8_lossy(s).to_lowercase());
        let include = |section: &str| wanted.as_deref().map_or(true, |w| w == section);

        let stats = self.storage.stats();
        let mut info = String::new();

        // Writing to a String never fails.
        if include("server") {
            let _ = write!(
                info,
                "# Server\r\nboltkv_version:{}\r\nos:{}\r\nuptime_in_seconds:{}\r\n\r\n",
                crate::VERSION,
                std::env::consts::OS,
                self.start_time.elapsed().as_secs(),
            );
        }
        if include("clients") {
            let _ = write!(
                info,
                "# Clients\r\nconnected_clients:{}\r\n\r\n",
                self.stats.active(),
            );
        }
        if include("stats") {
            let _ = write!(
                info,
                "# Stats\r\n\
                 total_connections_received:{}\r\n\
                 total_commands_processed:{}\r\n\
                 expired_keys:{}\r\n\
                 keyspace_hits:{}\r\n\
                 keyspace_misses:{}\r\n\
                 pubsub_channels:{}\r\n\r\n",
                self.stats.accepted(),
                self.stats.commands(),
                stats.expired,
                stats.hits,
                stats.misses,
                self.broker.channel_count(),
            );
        }
        if include("keyspace") {
            let _ = write!(
                info,
                "# Keyspace\r\ndb0:keys={},expires={}\r\n",
                stats.keys, stats.expires,
            );
        }

        Ok(RespValue::bulk_string(Bytes::from(info)))
    }

    /// SAVE
    ///
    /// The snapshot is taken under the shard locks; the file write happens
    /// after they are released. On a multi-threaded runtime the write is
    /// moved off the async worker with `block_in_place`.
    fn cmd_save(&self) -> CommandResult {
        let store = self
            .snapshots
            .as_ref()
            .ok_or(CommandError::PersistenceDisabled)?;
        let snapshot = self.storage.snapshot();
        let save = || store.save(&snapshot);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if runtime.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(save)?
            }
            _ => save()?,
        }
        Ok(RespValue::ok())
    }

    /// BGSAVE
    ///
    /// Snapshot and write both happen on a detached worker. Failures are
    /// only reported in the server log.
    fn cmd_bgsave(&self) -> CommandResult {
        let store = Arc::clone(
            self.snapshots
                .as_ref()
                .ok_or(CommandError::PersistenceDisabled)?,
        );
        let storage = Arc::clone(&self.storage);

        let job = move || {
            let snapshot = storage.snapshot();
            match store.save(&snapshot) {
                Ok(()) => info!(keys = snapshot.len(), "Background save finished"),
                Err(e) => error!(error = %e, "Background save failed"),
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn_blocking(job)),
            Err(_) => drop(std::thread::spawn(job)),
        }

        Ok(RespValue::simple_string("Background saving started"))
    }

    // ========================================================================
    // String and Key Commands
    // ========================================================================

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        Ok(RespValue::optional_bulk(self.storage.get(&args[0])?))
    }

    /// SET key value
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        self.storage.set(args[0].clone(), args[1].clone());
        Ok(RespValue::ok())
    }

    /// SETEX key seconds value
    fn cmd_setex(&self, args: &[Bytes]) -> CommandResult {
        let seconds = parse_integer(&args[1])?;
        if seconds <= 0 {
            return Err(CommandError::InvalidExpire);
        }
        self.storage.set_with_ttl(
            args[0].clone(),
            args[2].clone(),
            Duration::from_secs(seconds as u64),
        )?;
        Ok(RespValue::ok())
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> CommandResult {
        let ttl = match self.storage.ttl(&args[0]) {
            KeyTtl::Expired => -2,
            KeyTtl::NoExpiry => -1,
            KeyTtl::HasExpiry(left) => ((left.as_millis() + 500) / 1000) as i64,
        };
        Ok(RespValue::integer(ttl))
    }

    /// EXPIRE key seconds
    ///
    /// A non-positive timeout deletes the key.
    fn cmd_expire(&self, args: &[Bytes]) -> CommandResult {
        let seconds = parse_integer(&args[1])?;
        let applied = if seconds <= 0 {
            self.storage.delete(&args[0])
        } else {
            self.storage
                .expire(&args[0], Duration::from_secs(seconds as u64))?
        };
        Ok(bool_reply(applied))
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// LPUSH key value [value ...]
    fn cmd_lpush(&self, args: &[Bytes]) -> CommandResult {
        let len = self.storage.lpush(args[0].clone(), args[1..].to_vec())?;
        Ok(len_reply(len))
    }

    /// RPUSH key value [value ...]
    fn cmd_rpush(&self, args: &[Bytes]) -> CommandResult {
        let len = self.storage.rpush(args[0].clone(), args[1..].to_vec())?;
        Ok(len_reply(len))
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> CommandResult {
        let start = parse_integer(&args[1])?;
        let stop = parse_integer(&args[2])?;
        Ok(match self.storage.lrange(&args[0], start, stop)? {
            Some(items) => RespValue::bulk_array(items),
            None => RespValue::null(),
        })
    }

    // ========================================================================
    // Hash and Set Commands
    // ========================================================================

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, args: &[Bytes]) -> CommandResult {
        let fields = &args[1..];
        if fields.len() % 2 != 0 {
            return Err(CommandError::WrongArity);
        }
        let pairs = fields
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        Ok(len_reply(self.storage.hset(args[0].clone(), pairs)?))
    }

    /// SADD key member [member ...]
    fn cmd_sadd(&self, args: &[Bytes]) -> CommandResult {
        let added = self.storage.sadd(args[0].clone(), args[1..].to_vec())?;
        Ok(len_reply(added))
    }

    // ========================================================================
    // Pub/Sub Commands
    // ========================================================================

    /// SUBSCRIBE channel
    ///
    /// Extra channel arguments are ignored.
    fn cmd_subscribe(&self, args: &[Bytes], client: &Subscriber) -> CommandResult {
        let channel = args[0].clone();
        let count = self.broker.subscribe(channel.clone(), client);
        debug!(client = client.id(), channel = %String::from_utf8_lossy(&channel), "Subscribed");
        Ok(RespValue::array(vec![
            RespValue::bulk_string(Bytes::from_static(b"subscribe")),
            RespValue::bulk_string(channel),
            RespValue::integer(count as i64),
        ]))
    }
}

/// Parses a base-10 signed integer argument.
fn parse_integer(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

fn bool_reply(value: bool) -> RespValue {
    RespValue::integer(value as i64)
}

fn len_reply(len: usize) -> RespValue {
    RespValue::integer(len as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::FileSnapshotStore;
    use tempfile::TempDir;
    use tokio::sync::mpsc::Receiver;

    struct Harness {
        handler: CommandHandler,
        client: Subscriber,
        _inbox: Receiver<Bytes>,
    }

    impl Harness {
        fn run(&self, args: &[&str]) -> RespValue {
            self.handler.execute(make_command(args), &self.client)
        }
    }

    fn harness_with(snapshots: Option<Arc<dyn SnapshotStore>>) -> Harness {
        let broker = Arc::new(Broker::new());
        let (client, inbox) = broker.register();
        let handler = CommandHandler::new(Arc::new(StorageEngine::new()), broker, snapshots);
        Harness {
            handler,
            client,
            _inbox: inbox,
        }
    }

    fn create_handler() -> Harness {
        harness_with(None)
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    fn bulk(s: &str) -> RespValue {
        RespValue::bulk_string(Bytes::from(s.to_string()))
    }

    fn sorted_array(reply: RespValue) -> Vec<RespValue> {
        let mut items = reply.as_array().expect("array reply").to_vec();
        items.sort_by_key(|v| v.to_string());
        items
    }

    #[test]
    fn test_ping() {
        let h = create_handler();
        assert_eq!(h.run(&["PING"]), RespValue::simple_string("PONG"));
        assert_eq!(h.run(&["PING", "hello"]), bulk("hello"));
        assert_eq!(h.run(&["ECHO", "hi there"]), bulk("hi there"));
    }

    #[test]
    fn test_unknown_and_lowercase_verbs() {
        let h = create_handler();
        assert_eq!(h.run(&["FLY"]), RespValue::error("Invalid operation"));
        assert_eq!(h.run(&["get", "k"]), RespValue::error("Invalid operation"));
        assert_eq!(h.run(&[]), RespValue::error("Invalid operation"));
    }

    #[test]
    fn test_arity_is_checked_before_mutation() {
        let h = create_handler();
        assert_eq!(
            h.run(&["SET", "k"]),
            RespValue::error("Wrong number of arguments")
        );
        assert_eq!(h.run(&["GET", "k"]), RespValue::null());

        assert_eq!(
            h.run(&["HSET", "h", "f", "v", "dangling"]),
            RespValue::error("Wrong number of arguments")
        );
        assert_eq!(h.run(&["HLEN", "h"]), RespValue::integer(0));
    }

    #[test]
    fn test_set_get() {
        let h = create_handler();
        assert_eq!(h.run(&["SET", "key", "value"]), RespValue::ok());
        assert_eq!(h.run(&["GET", "key"]), bulk("value"));
        assert_eq!(h.run(&["GET", "nonexistent"]), RespValue::null());
    }

    #[test]
    fn test_del_and_exists() {
        let h = create_handler();
        h.run(&["SET", "key1", "value1"]);
        h.run(&["SET", "key2", "value2"]);

        assert_eq!(h.run(&["EXISTS", "key1", "key2", "key3"]), RespValue::integer(2));
        assert_eq!(h.run(&["DEL", "key1", "key2", "key3"]), RespValue::integer(2));
        assert_eq!(h.run(&["EXISTS", "key1"]), RespValue::integer(0));
    }

    #[test]
    fn test_setex_and_ttl() {
        let h = create_handler();
        assert_eq!(h.run(&["SETEX", "k", "100", "v"]), RespValue::ok());
        assert_eq!(h.run(&["GET", "k"]), bulk("v"));
        assert_eq!(h.run(&["TTL", "k"]), RespValue::integer(100));

        assert_eq!(
            h.run(&["SETEX", "k", "soon", "v"]),
            RespValue::error("value is not an integer or out of range")
        );
        assert_eq!(
            h.run(&["SETEX", "k", "0", "v"]),
            RespValue::error("invalid expire time")
        );
    }

    #[test]
    fn test_huge_timeouts_are_rejected() {
        let h = create_handler();
        assert_eq!(
            h.run(&["SETEX", "k", "9223372036854775807", "v"]),
            RespValue::error("invalid expire time")
        );
        assert_eq!(h.run(&["EXISTS", "k"]), RespValue::integer(0));

        h.run(&["SET", "k", "v"]);
        assert_eq!(
            h.run(&["EXPIRE", "k", "9223372036854775807"]),
            RespValue::error("invalid expire time")
        );
        assert_eq!(h.run(&["TTL", "k"]), RespValue::integer(-1));
        assert_eq!(h.run(&["GET", "k"]), bulk("v"));
    }

    #[test]
    fn test_ttl_polarity() {
        let h = create_handler();
        assert_eq!(h.run(&["TTL", "missing"]), RespValue::integer(-2));
        h.run(&["SET", "forever", "v"]);
        assert_eq!(h.run(&["TTL", "forever"]), RespValue::integer(-1));
    }

    #[test]
    fn test_expire_and_persist() {
        let h = create_handler();
        assert_eq!(h.run(&["EXPIRE", "missing", "10"]), RespValue::integer(0));

        h.run(&["SET", "k", "v"]);
        assert_eq!(h.run(&["EXPIRE", "k", "10"]), RespValue::integer(1));
        assert_eq!(h.run(&["TTL", "k"]), RespValue::integer(10));
        assert_eq!(h.run(&["PERSIST", "k"]), RespValue::integer(1));
        assert_eq!(h.run(&["TTL", "k"]), RespValue::integer(-1));

        assert_eq!(
            h.run(&["EXPIRE", "k", "ten"]),
            RespValue::error("value is not an integer or out of range")
        );

        assert_eq!(h.run(&["EXPIRE", "k", "0"]), RespValue::integer(1));
        assert_eq!(h.run(&["GET", "k"]), RespValue::null());
    }

    #[test]
    fn test_type() {
        let h = create_handler();
        h.run(&["SET", "s", "v"]);
        h.run(&["RPUSH", "l", "a"]);
        h.run(&["HSET", "h", "f", "v"]);
        h.run(&["SADD", "z", "m"]);

        assert_eq!(h.run(&["TYPE", "s"]), RespValue::simple_string("string"));
        assert_eq!(h.run(&["TYPE", "l"]), RespValue::simple_string("list"));
        assert_eq!(h.run(&["TYPE", "h"]), RespValue::simple_string("hash"));
        assert_eq!(h.run(&["TYPE", "z"]), RespValue::simple_string("set"));
        assert_eq!(h.run(&["TYPE", "nope"]), RespValue::simple_string("none"));
    }

    #[test]
    fn test_wrong_type_reply() {
        let h = create_handler();
        h.run(&["RPUSH", "list", "a"]);

        let reply = h.run(&["GET", "list"]);
        assert_eq!(
            reply.serialize(),
            b"-ERR WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
        );
        assert!(h.run(&["SADD", "list", "m"]).is_error());
    }

    #[test]
    fn test_list_commands() {
        let h = create_handler();
        assert_eq!(h.run(&["LPUSH", "l", "a"]), RespValue::integer(1));
        assert_eq!(h.run(&["LPUSH", "l", "b"]), RespValue::integer(2));
        assert_eq!(h.run(&["RPUSH", "l", "c", "d"]), RespValue::integer(4));

        assert_eq!(
            h.run(&["LRANGE", "l", "0", "-1"]),
            RespValue::bulk_array(["b", "a", "c", "d"].map(Bytes::from))
        );
        assert_eq!(
            h.run(&["LRANGE", "l", "1", "2"]),
            RespValue::bulk_array(["a", "c"].map(Bytes::from))
        );
        assert_eq!(h.run(&["LLEN", "l"]), RespValue::integer(4));

        assert_eq!(h.run(&["LPOP", "l"]), bulk("b"));
        assert_eq!(h.run(&["RPOP", "l"]), bulk("d"));
        assert_eq!(h.run(&["LPOP", "l"]), bulk("a"));
        assert_eq!(h.run(&["LPOP", "l"]), bulk("c"));
        assert_eq!(h.run(&["LPOP", "l"]), RespValue::null());
        assert_eq!(h.run(&["LLEN", "l"]), RespValue::integer(0));
        assert_eq!(h.run(&["LRANGE", "l", "0", "-1"]), RespValue::null());

        assert_eq!(
            h.run(&["LRANGE", "l", "zero", "1"]),
            RespValue::error("value is not an integer or out of range")
        );
    }

    #[test]
    fn test_hash_commands() {
        let h = create_handler();
        assert_eq!(h.run(&["HSET", "user", "name", "Ariz"]), RespValue::integer(1));
        assert_eq!(h.run(&["HSET", "user", "name", "Bo"]), RespValue::integer(0));
        assert_eq!(
            h.run(&["HSET", "user", "lang", "rust", "os", "linux"]),
            RespValue::integer(2)
        );

        assert_eq!(h.run(&["HGET", "user", "name"]), bulk("Bo"));
        assert_eq!(h.run(&["HGET", "user", "age"]), RespValue::null());
        assert_eq!(h.run(&["HLEN", "user"]), RespValue::integer(3));

        assert_eq!(
            sorted_array(h.run(&["HKEYS", "user"])),
            vec![bulk("lang"), bulk("name"), bulk("os")]
        );
        let all = h.run(&["HGETALL", "user"]);
        assert_eq!(all.as_array().map(|a| a.len()), Some(6));

        assert_eq!(h.run(&["HDEL", "user", "name", "age"]), RespValue::integer(1));
        assert_eq!(h.run(&["HGETALL", "missing"]), RespValue::array(vec![]));
    }

    #[test]
    fn test_set_commands() {
        let h = create_handler();
        assert_eq!(h.run(&["SADD", "s", "a", "b", "a"]), RespValue::integer(2));
        assert_eq!(h.run(&["SADD", "s", "a"]), RespValue::integer(0));
        assert_eq!(h.run(&["SCARD", "s"]), RespValue::integer(2));
        assert_eq!(h.run(&["SISMEMBER", "s", "a"]), RespValue::integer(1));
        assert_eq!(h.run(&["SISMEMBER", "s", "z"]), RespValue::integer(0));
        assert_eq!(
            sorted_array(h.run(&["SMEMBERS", "s"])),
            vec![bulk("a"), bulk("b")]
        );

        assert_eq!(h.run(&["SREM", "s", "a", "z"]), RespValue::integer(1));
        assert_eq!(h.run(&["SREM", "s", "b"]), RespValue::integer(1));
        assert_eq!(h.run(&["EXISTS", "s"]), RespValue::integer(0));
    }

    #[test]
    fn test_dbsize_and_flushdb() {
        let h = create_handler();
        h.run(&["SET", "a", "1"]);
        h.run(&["SADD", "b", "x"]);
        assert_eq!(h.run(&["DBSIZE"]), RespValue::integer(2));

        assert_eq!(h.run(&["FLUSHDB"]), RespValue::ok());
        assert_eq!(h.run(&["DBSIZE"]), RespValue::integer(0));
    }

    #[test]
    fn test_info_sections() {
        let h = create_handler();
        h.run(&["SET", "a", "1"]);

        let RespValue::BulkString(all) = h.run(&["INFO"]) else {
            panic!("INFO should reply with a bulk string");
        };
        let all = String::from_utf8(all.to_vec()).unwrap();
        assert!(all.contains("# Server"));
        assert!(all.contains("# Clients"));
        assert!(all.contains("db0:keys=1,expires=0"));

        let RespValue::BulkString(one) = h.run(&["INFO", "keyspace"]) else {
            panic!("INFO should reply with a bulk string");
        };
        let one = String::from_utf8(one.to_vec()).unwrap();
        assert!(one.starts_with("# Keyspace"));
        assert!(!one.contains("# Server"));
    }

    #[test]
    fn test_subscribe_publish_unsubscribe() {
        let broker = Arc::new(Broker::new());
        let handler =
            CommandHandler::new(Arc::new(StorageEngine::new()), Arc::clone(&broker), None);
        let (listener, mut inbox) = broker.register();
        let (publisher, _publisher_inbox) = broker.register();

        let reply = handler.execute(make_command(&["SUBSCRIBE", "news", "ignored"]), &listener);
        assert_eq!(
            reply,
            RespValue::array(vec![bulk("subscribe"), bulk("news"), RespValue::integer(1)])
        );
        assert!(broker.is_subscribed(&listener));
        assert_eq!(broker.channel_count(), 1);

        let reply = handler.execute(make_command(&["PUBLISH", "news", "hi"]), &publisher);
        assert_eq!(reply, RespValue::integer(1));
        assert_eq!(
            inbox.try_recv().unwrap(),
            &b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n"[..]
        );

        let reply = handler.execute(make_command(&["UNSUBSCRIBE", "news"]), &listener);
        assert_eq!(reply, RespValue::ok());
        assert!(!broker.is_subscribed(&listener));

        let reply = handler.execute(make_command(&["PUBLISH", "news", "late"]), &publisher);
        assert_eq!(reply, RespValue::integer(0));
    }

    #[test]
    fn test_save_without_store() {
        let h = create_handler();
        assert_eq!(h.run(&["SAVE"]), RespValue::error("persistence is disabled"));
        assert_eq!(h.run(&["BGSAVE"]), RespValue::error("persistence is disabled"));
    }

    #[test]
    fn test_save_writes_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSnapshotStore::new(dir.path().join("dump.bkv")));
        let h = harness_with(Some(store.clone() as Arc<dyn SnapshotStore>));

        h.run(&["SET", "a", "1"]);
        h.run(&["RPUSH", "l", "x", "y"]);
        assert_eq!(h.run(&["SAVE"]), RespValue::ok());

        let restored = StorageEngine::new();
        let snapshot = store.load().unwrap().expect("snapshot was saved");
        assert_eq!(restored.restore(snapshot), 2);
        assert_eq!(restored.get(b"a").unwrap(), Some(Bytes::from("1")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_save_from_runtime_worker() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSnapshotStore::new(dir.path().join("dump.bkv")));
        let h = harness_with(Some(store.clone() as Arc<dyn SnapshotStore>));

        h.run(&["HSET", "user", "name", "ana"]);
        assert_eq!(h.run(&["SAVE"]), RespValue::ok());
        let snapshot = store.load().unwrap().expect("snapshot was saved");
        assert_eq!(snapshot.hashes.len(), 1);
    }

    #[tokio::test]
    async fn test_bgsave_writes_snapshot_eventually() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSnapshotStore::new(dir.path().join("dump.bkv")));
        let h = harness_with(Some(store.clone() as Arc<dyn SnapshotStore>));

        h.run(&["SADD", "tags", "a"]);
        assert_eq!(
            h.run(&["BGSAVE"]),
            RespValue::simple_string("Background saving started")
        );

        let deadline = Instant::now() + Duration::from_secs(2);
        while !store.path().exists() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let snapshot = store.load().unwrap().expect("snapshot was saved");
        assert_eq!(snapshot.sets.len(), 1);
    }
}
