//! RESP (REdis Serialization Protocol) value types, decoding and encoding.
//!
//! This module provides the wire primitives used by the queue client:
//! [`Value`] for replies and [`Command`] for requests. Decoding is
//! buffer-oriented: [`Value::parse`] either returns a complete value together
//! with the number of bytes it consumed, or [`ProtocolError::Incomplete`] when
//! the caller must read more data from the socket first.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

pub mod command;

pub use command::Command;

/// Two-byte terminator that ends every line and bulk payload.
pub const CRLF: &[u8] = b"\r\n";

/// Largest bulk string we accept (512 MiB, the store's own default limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Deepest array nesting we decode before giving up.
pub const MAX_DEPTH: usize = 512;

/// Upper bound on the capacity pre-allocated for an array reply.
const MAX_PREALLOCATED_ITEMS: usize = 1024;

/// Errors that can occur while decoding a reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reply is incomplete; more data needed")]
    Incomplete,

    #[error("unsupported reply prefix: {0:?}")]
    UnknownPrefix(char),

    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("bulk string is not terminated by CRLF")]
    MissingTerminator,

    #[error("bulk string of {len} bytes exceeds maximum of {max} bytes")]
    BulkTooLarge { len: usize, max: usize },

    #[error("arrays nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// A single RESP value.
///
/// # Examples
///
/// ```
/// use crucible::protocol::Value;
///
/// let (value, consumed) = Value::parse(b"*2\r\n$3\r\nfoo\r\n$-1\r\n").unwrap();
/// assert_eq!(consumed, 18);
/// assert_eq!(
///     value,
///     Value::Array(Some(vec![Value::bulk("foo"), Value::Bulk(None)]))
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n`, or `$-1\r\n` for null.
    Bulk(Option<Bytes>),
    /// `*2\r\n...`, or `*-1\r\n` for null.
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Convenience constructor for a non-null bulk string.
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Self::Bulk(Some(Bytes::copy_from_slice(data.as_ref())))
    }

    /// Parses one value from the front of `buf`.
    ///
    /// Returns the value and the number of bytes it occupied, so the caller
    /// can drop exactly that prefix from its read buffer.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Incomplete`]: `buf` holds only part of a value.
    /// - Any other variant: the data is malformed and cannot be decoded.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), ProtocolError> {
        let mut pos = 0;
        let value = parse_value(buf, &mut pos, 0)?;
        Ok((value, pos))
    }

    /// Appends the wire form of this value to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Simple(s) => put_line(buf, b'+', s.as_bytes()),
            Self::Error(s) => put_line(buf, b'-', s.as_bytes()),
            Self::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Self::Bulk(None) => buf.put_slice(b"$-1\r\n"),
            Self::Bulk(Some(data)) => {
                put_line(buf, b'$', data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Self::Array(None) => buf.put_slice(b"*-1\r\n"),
            Self::Array(Some(items)) => {
                put_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    /// Serializes this value into a fresh buffer.
    pub fn into_bytes(self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }

    /// Returns `true` for the null bulk string and the null array.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Bulk(None) | Self::Array(None))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(s) => f.write_str(s),
            Self::Error(s) => write!(f, "(error) {s}"),
            Self::Integer(n) => write!(f, "(integer) {n}"),
            Self::Bulk(None) | Self::Array(None) => f.write_str("(nil)"),
            Self::Bulk(Some(data)) => write!(f, "{:?}", String::from_utf8_lossy(data)),
            Self::Array(Some(items)) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

fn put_line(buf: &mut BytesMut, prefix: u8, line: &[u8]) {
    buf.put_u8(prefix);
    buf.put_slice(line);
    buf.put_slice(CRLF);
}

fn parse_value(buf: &[u8], pos: &mut usize, depth: usize) -> Result<Value, ProtocolError> {
    let prefix = *buf.get(*pos).ok_or(ProtocolError::Incomplete)?;
    *pos += 1;

    match prefix {
        b'+' => Ok(Value::Simple(read_text(buf, pos)?)),
        b'-' => Ok(Value::Error(read_text(buf, pos)?)),
        b':' => Ok(Value::Integer(read_integer(buf, pos)?)),
        b'$' => {
            let Some(len) = read_length(buf, pos)? else {
                return Ok(Value::Bulk(None));
            };
            if len > MAX_BULK_LEN {
                return Err(ProtocolError::BulkTooLarge {
                    len,
                    max: MAX_BULK_LEN,
                });
            }
            let end = *pos + len;
            if buf.len() < end + CRLF.len() {
                return Err(ProtocolError::Incomplete);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(ProtocolError::MissingTerminator);
            }
            let data = Bytes::copy_from_slice(&buf[*pos..end]);
            *pos = end + CRLF.len();
            Ok(Value::Bulk(Some(data)))
        }
        b'*' => {
            let Some(count) = read_length(buf, pos)? else {
                return Ok(Value::Array(None));
            };
            if count > 0 && depth >= MAX_DEPTH {
                return Err(ProtocolError::TooDeep { max: MAX_DEPTH });
            }
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
            for _ in 0..count {
                items.push(parse_value(buf, pos, depth + 1)?);
            }
            Ok(Value::Array(Some(items)))
        }
        other => Err(ProtocolError::UnknownPrefix(char::from(other))),
    }
}

/// Reads up to the next CRLF and advances `pos` past it.
fn read_line<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], ProtocolError> {
    let rest = &buf[*pos..];
    let end = rest
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .ok_or(ProtocolError::Incomplete)?;
    *pos += end + CRLF.len();
    Ok(&rest[..end])
}

fn read_text(buf: &[u8], pos: &mut usize) -> Result<String, ProtocolError> {
    let line = read_line(buf, pos)?;
    String::from_utf8(line.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn read_integer(buf: &[u8], pos: &mut usize) -> Result<i64, ProtocolError> {
    let line = read_line(buf, pos)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Reads a bulk/array length header. `-1` means null and yields `None`.
fn read_length(buf: &[u8], pos: &mut usize) -> Result<Option<usize>, ProtocolError> {
    match read_integer(buf, pos)? {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength(n)),
        n => usize::try_from(n)
            .map(Some)
            .map_err(|_| ProtocolError::InvalidLength(n)),
    }
}
