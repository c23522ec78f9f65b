//! The fixed command table.
//!
//! Verbs are matched exactly and case-sensitively. `min_args` counts the
//! arguments after the verb; requests with fewer are rejected before the
//! command runs.

/// One entry in the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub min_args: usize,
}

const fn spec(name: &'static str, min_args: usize) -> CommandSpec {
    CommandSpec { name, min_args }
}

/// Every command the server understands.
pub const COMMANDS: &[CommandSpec] = &[
    // Connection / server
    spec("PING", 0),
    spec("ECHO", 1),
    spec("DBSIZE", 0),
    spec("FLUSHDB", 0),
    spec("INFO", 0),
    spec("SAVE", 0),
    spec("BGSAVE", 0),
    // Strings and keys
    spec("GET", 1),
    spec("SET", 2),
    spec("DEL", 1),
    spec("EXISTS", 1),
    spec("SETEX", 3),
    spec("TTL", 1),
    spec("EXPIRE", 2),
    spec("PERSIST", 1),
    spec("TYPE", 1),
    // Lists
    spec("LPUSH", 2),
    spec("RPUSH", 2),
    spec("LPOP", 1),
    spec("RPOP", 1),
    spec("LRANGE", 3),
    spec("LLEN", 1),
    // Hashes
    spec("HSET", 3),
    spec("HGET", 2),
    spec("HDEL", 2),
    spec("HGETALL", 1),
    spec("HKEYS", 1),
    spec("HLEN", 1),
    // Sets
    spec("SADD", 2),
    spec("SREM", 2),
    spec("SISMEMBER", 2),
    spec("SCARD", 1),
    spec("SMEMBERS", 1),
    // Pub/sub
    spec("SUBSCRIBE", 1),
    spec("UNSUBSCRIBE", 1),
    spec("PUBLISH", 2),
];

/// Verbs a connection may still send while it is subscribed to a channel.
pub const SUBSCRIBED_MODE_COMMANDS: &[&str] = &["SUBSCRIBE", "UNSUBSCRIBE", "PING"];

/// Looks a verb up in the table.
pub fn lookup(verb: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name.as_bytes() == verb)
}

/// True if `verb` may be sent while the connection is subscribed.
pub fn allowed_while_subscribed(verb: &[u8]) -> bool {
    SUBSCRIBED_MODE_COMMANDS
        .iter()
        .any(|name| name.as_bytes() == verb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(lookup(b"GET").map(|c| c.min_args), Some(1));
        assert!(lookup(b"get").is_none());
        assert!(lookup(b"INCR").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in COMMANDS.iter().enumerate() {
            assert!(COMMANDS[i + 1..].iter().all(|b| b.name != a.name), "{}", a.name);
        }
    }

    #[test]
    fn test_subscribed_mode_gate() {
        assert!(allowed_while_subscribed(b"PING"));
        assert!(allowed_while_subscribed(b"UNSUBSCRIBE"));
        assert!(!allowed_while_subscribed(b"GET"));
        assert!(!allowed_while_subscribed(b"subscribe"));
    }
}
