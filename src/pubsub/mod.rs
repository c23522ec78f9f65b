//! Publish/Subscribe
//!
//! A minimal channel broker: connections subscribe to named channels and
//! `PUBLISH` fans a message out to every current subscriber.
//!
//! ## Example
//!
//! ```
//! use boltkv::pubsub::Broker;
//! use bytes::Bytes;
//!
//! let broker = Broker::new();
//! let (client, mut inbox) = broker.register();
//!
//! broker.subscribe(Bytes::from("news"), &client);
//! assert_eq!(broker.publish(b"news", Bytes::from("hello")), 1);
//!
//! let frame = inbox.try_recv().unwrap();
//! assert!(frame.starts_with(b"*3\r\n$7\r\nmessage\r\n"));
//! ```

pub mod broker;

pub use broker::{Broker, Subscriber, DEFAULT_INBOX_CAPACITY};
