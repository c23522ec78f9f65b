//! Channel Registry and Fan-Out
//!
//! The broker maps channel names to the connections subscribed to them. A
//! connection is represented by a [`Subscriber`] handle: a unique id plus the
//! sending half of that connection's outbound message queue. Publishing
//! encodes the message once as a RESP frame and pushes the same bytes to every
//! subscriber's queue; each connection task then writes whole frames to its
//! socket.
//!
//! ```text
//!   PUBLISH news hi
//!         │
//!         ▼
//!  ┌──────────────────────────────┐
//!  │ Broker (Mutex)               │
//!  │  "news" ─> { #1, #4 }        │──> mpsc #1 ──> client 1 socket
//!  │  "jobs" ─> { #4 }            │──> mpsc #4 ──> client 4 socket
//!  └──────────────────────────────┘
//! ```
//!
//! Delivery happens while the registry lock is held, so a subscribe or
//! unsubscribe that completed before a publish is always observed by it.
//!
//! Queues are bounded. A subscriber whose queue is full (its connection has
//! stopped draining it) is treated like a closed one and dropped.

use crate::protocol::RespValue;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Frames a subscriber may have queued before it is considered stalled.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// A connection's identity within the broker.
///
/// Cloning a handle is cheap; every clone refers to the same connection.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

impl Subscriber {
    /// The unique id assigned by [`Broker::register`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queues an already-encoded frame for this connection.
    ///
    /// Never waits. Fails when the connection has gone away or its queue
    /// is full.
    fn deliver(&self, frame: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.tx.try_send(frame)
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

type Registry = HashMap<Bytes, HashMap<u64, Subscriber>>;

/// The publish/subscribe broker, shared by every connection.
#[derive(Debug)]
pub struct Broker {
    channels: Mutex<Registry>,
    next_id: AtomicU64,
    inbox_capacity: usize,
}

impl Default for Broker {
    fn default() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker whose subscriber queues hold at most `capacity`
    /// frames (minimum 1).
    pub fn with_inbox_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            inbox_capacity: capacity.max(1),
        }
    }

    /// Issues a new connection handle and the receiver its messages arrive on.
    pub fn register(&self) -> (Subscriber, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(self.inbox_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        (Subscriber { id, tx }, rx)
    }

    /// Adds `subscriber` to `channel`.
    ///
    /// Subscribing twice is a no-op. Returns the channel's subscriber count.
    pub fn subscribe(&self, channel: Bytes, subscriber: &Subscriber) -> usize {
        let mut channels = self.channels.lock();
        let members = channels.entry(channel).or_default();
        members
            .entry(subscriber.id)
            .or_insert_with(|| subscriber.clone());
        members.len()
    }

    /// Removes `subscriber` from `channel`. Absent handles are ignored.
    pub fn unsubscribe(&self, channel: &[u8], subscriber: &Subscriber) {
        let mut channels = self.channels.lock();
        if let Some(members) = channels.get_mut(channel) {
            members.remove(&subscriber.id);
            if members.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Removes `subscriber` from every channel. Returns how many channels it
    /// was removed from.
    pub fn unsubscribe_all(&self, subscriber: &Subscriber) -> usize {
        let mut channels = self.channels.lock();
        remove_everywhere(&mut channels, subscriber.id)
    }

    /// Sends `["message", channel, message]` to every subscriber of `channel`.
    ///
    /// A subscriber whose connection has closed, or whose queue is full, is
    /// skipped and dropped from the registry; the remaining subscribers still
    /// receive the message.
    /// Returns the number of successful deliveries.
    pub fn publish(&self, channel: &[u8], message: Bytes) -> usize {
        let frame = Bytes::from(
            RespValue::bulk_array([
                Bytes::from_static(b"message"),
                Bytes::copy_from_slice(channel),
                message,
            ])
            .serialize(),
        );

        let mut channels = self.channels.lock();
        let Some(members) = channels.get(channel) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscriber in members.values() {
            match subscriber.deliver(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "queue full",
                        TrySendError::Closed(_) => "connection closed",
                    };
                    warn!(
                        subscriber = subscriber.id,
                        channel = %String::from_utf8_lossy(channel),
                        reason,
                        "Dropping subscriber"
                    );
                    dead.push(subscriber.id);
                }
            }
        }

        for id in dead {
            remove_everywhere(&mut channels, id);
        }

        debug!(
            channel = %String::from_utf8_lossy(channel),
            delivered = delivered,
            "Published message"
        );
        delivered
    }

    /// True if the handle still appears under any channel.
    pub fn is_subscribed(&self, subscriber: &Subscriber) -> bool {
        self.channels
            .lock()
            .values()
            .any(|members| members.contains_key(&subscriber.id))
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Number of subscribers on one channel.
    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.lock().get(channel).map_or(0, HashMap::len)
    }
}

fn remove_everywhere(channels: &mut Registry, id: u64) -> usize {
    let mut removed = 0;
    channels.retain(|_, members| {
        if members.remove(&id).is_some() {
            removed += 1;
        }
        !members.is_empty()
    });
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ch(name: &'static str) -> Bytes {
        Bytes::from_static(name.as_bytes())
    }

    #[test]
    fn test_register_issues_unique_ids() {
        let broker = Broker::new();
        let (a, _rx_a) = broker.register();
        let (b, _rx_b) = broker.register();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let broker = Broker::new();
        let (a, _rx_a) = broker.register();
        let (b, _rx_b) = broker.register();

        assert_eq!(broker.subscribe(ch("news"), &a), 1);
        assert_eq!(broker.subscribe(ch("news"), &a), 1);
        assert_eq!(broker.subscribe(ch("news"), &b), 2);
        assert_eq!(broker.subscriber_count(b"news"), 2);
    }

    #[test]
    fn test_publish_fans_out_whole_frames() {
        let broker = Broker::new();
        let (a, mut rx_a) = broker.register();
        let (b, mut rx_b) = broker.register();
        broker.subscribe(ch("news"), &a);
        broker.subscribe(ch("news"), &b);

        assert_eq!(broker.publish(b"news", ch("hi")), 2);

        let expected: &[u8] = b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$2\r\nhi\r\n";
        assert_eq!(rx_a.try_recv().unwrap(), expected);
        assert_eq!(rx_b.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broker = Broker::new();
        assert_eq!(broker.publish(b"nobody", ch("hello")), 0);
    }

    #[test]
    fn test_no_delivery_after_unsubscribe() {
        let broker = Broker::new();
        let (a, mut rx_a) = broker.register();
        broker.subscribe(ch("news"), &a);
        broker.unsubscribe(b"news", &a);

        assert_eq!(broker.publish(b"news", ch("late")), 0);
        assert!(rx_a.try_recv().is_err());
        assert!(!broker.is_subscribed(&a));
        assert_eq!(broker.channel_count(), 0);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let broker = Broker::new();
        let (a, _rx) = broker.register();
        broker.unsubscribe(b"never", &a);
        assert!(!broker.is_subscribed(&a));
    }

    #[test]
    fn test_closed_subscriber_is_skipped_and_removed() {
        let broker = Broker::new();
        let (alive, mut rx_alive) = broker.register();
        let (gone, rx_gone) = broker.register();
        broker.subscribe(ch("news"), &alive);
        broker.subscribe(ch("news"), &gone);
        broker.subscribe(ch("other"), &gone);
        drop(rx_gone);

        assert_eq!(broker.publish(b"news", ch("hi")), 1);
        assert!(rx_alive.try_recv().is_ok());
        assert!(!broker.is_subscribed(&gone));
        assert_eq!(broker.subscriber_count(b"news"), 1);
        assert_eq!(broker.channel_count(), 1);
    }

    #[test]
    fn test_stalled_subscriber_is_dropped() {
        let broker = Broker::with_inbox_capacity(2);
        let (reader, mut rx_reader) = broker.register();
        let (stalled, _rx_stalled) = broker.register();
        broker.subscribe(ch("news"), &reader);
        broker.subscribe(ch("news"), &stalled);

        assert_eq!(broker.publish(b"news", ch("1")), 2);
        assert_eq!(broker.publish(b"news", ch("2")), 2);
        rx_reader.try_recv().unwrap();
        rx_reader.try_recv().unwrap();

        // The stalled queue is full: that delivery fails and the handle goes.
        assert_eq!(broker.publish(b"news", ch("3")), 1);
        assert!(!broker.is_subscribed(&stalled));
        assert_eq!(broker.subscriber_count(b"news"), 1);

        for i in 0..5 {
            assert_eq!(broker.publish(b"news", Bytes::from(i.to_string())), 1);
            assert!(rx_reader.try_recv().is_ok());
        }
    }

    #[test]
    fn test_unsubscribe_all() {
        let broker = Broker::new();
        let (a, _rx) = broker.register();
        broker.subscribe(ch("one"), &a);
        broker.subscribe(ch("two"), &a);
        assert!(broker.is_subscribed(&a));

        assert_eq!(broker.unsubscribe_all(&a), 2);
        assert!(!broker.is_subscribed(&a));
        assert_eq!(broker.channel_count(), 0);
    }

    #[test]
    fn test_concurrent_subscribe_and_publish() {
        let broker = Arc::new(Broker::new());
        let (a, mut rx_a) = broker.register();
        broker.subscribe(ch("news"), &a);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let broker = Arc::clone(&broker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let (s, _rx) = broker.register();
                        broker.subscribe(ch("news"), &s);
                        broker.publish(b"news", ch("m"));
                        broker.unsubscribe(b"news", &s);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut received = 0;
        while let Ok(frame) = rx_a.try_recv() {
            assert_eq!(&frame[..], b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$1\r\nm\r\n");
            received += 1;
        }
        assert_eq!(received, 400);
    }
}
