//! RESP Protocol Implementation
//!
//! The wire codec for BoltKV: requests arrive as RESP arrays of bulk strings
//! and replies leave as typed RESP values.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental, strict parser for incoming requests
//!
//! ## Example
//!
//! ```
//! use boltkv::protocol::{decode, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing an incoming request
//! let args = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
//! assert_eq!(args[1], "name");
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{decode, ParseError, ParseResult, RequestParser};
pub use types::RespValue;
