//! Incremental Request Parser
//!
//! Clients send every request as a RESP array of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n
//! ```
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((args, consumed)))` - a whole request, `consumed` bytes were used
//! - `Ok(None)` - the request is incomplete, read more and try again
//! - `Err(ParseError)` - the bytes can never form a valid request
//!
//! A partially received request never yields a partial argument vector. Any
//! error is a framing error and the caller is expected to drop the connection.

use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while framing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A count or length line had no content
    #[error("empty header line")]
    EmptyLine,

    /// The request did not start with `*`
    #[error("expected '*', found {0:#04x}")]
    ExpectedArray(u8),

    /// An element did not start with `$`
    #[error("expected '$', found {0:#04x}")]
    ExpectedBulkString(u8),

    /// Count or length line is not a decimal integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Array count is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Bulk length is negative (null bulk strings are not valid in requests)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Payload was not followed by CRLF
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A single bulk string exceeds the configured maximum
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The request has more elements than allowed
    #[error("too many arguments: {count} (max: {max})")]
    TooManyArguments { count: usize, max: usize },

    /// The buffer ended before the request was complete
    #[error("incomplete request")]
    Incomplete,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one request
pub const MAX_ARGUMENTS: usize = 1024 * 1024;

/// Upper bound on the argument vector preallocated from an array header.
const INITIAL_ARGS_CAPACITY: usize = 64;

/// Parser for RESP request arrays.
///
/// # Example
///
/// ```
/// use boltkv::protocol::RequestParser;
///
/// let parser = RequestParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (args, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(args[0], "GET");
/// assert_eq!(consumed, buf.len());
/// ```
#[derive(Debug, Clone)]
pub struct RequestParser {
    max_bulk_size: usize,
    max_arguments: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with the default limits.
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
            max_arguments: MAX_ARGUMENTS,
        }
    }

    /// Creates a parser with custom size limits.
    pub fn with_limits(max_bulk_size: usize, max_arguments: usize) -> Self {
        Self {
            max_bulk_size,
            max_arguments,
        }
    }

    /// Attempts to frame one request from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::ARRAY {
            return Err(ParseError::ExpectedArray(first));
        }

        let (count, mut consumed) = match read_integer_line(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }
        let count = count as usize;
        if count > self.max_arguments {
            return Err(ParseError::TooManyArguments {
                count,
                max: self.max_arguments,
            });
        }

        // Grows as arguments actually arrive.
        let mut args = Vec::with_capacity(count.min(INITIAL_ARGS_CAPACITY));
        for _ in 0..count {
            match self.parse_bulk_string(&buf[consumed..])? {
                Some((arg, used)) => {
                    args.push(arg);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((args, consumed)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Option<(Bytes, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first != prefix::BULK_STRING {
            return Err(ParseError::ExpectedBulkString(first));
        }

        let (length, data_start) = match read_integer_line(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }
        let length = length as usize;
        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let total_needed = data_start + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
        Ok(Some((data, total_needed)))
    }
}

/// Reads `<prefix><integer>\r\n` and returns the integer and the bytes used.
fn read_integer_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let digits = &buf[1..1 + end];
    if digits.is_empty() {
        return Err(ParseError::EmptyLine);
    }

    let value = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(digits).into_owned()))?;

    Ok(Some((value, 1 + end + CRLF.len())))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes exactly one request from a buffer that is known to be complete.
///
/// An unfinished request is reported as [`ParseError::Incomplete`]. Bytes
/// after the first request are ignored.
pub fn decode(buf: &[u8]) -> ParseResult<Vec<Bytes>> {
    match RequestParser::new().parse(buf)? {
        Some((args, _)) => Ok(args),
        None => Err(ParseError::Incomplete),
    }
}
