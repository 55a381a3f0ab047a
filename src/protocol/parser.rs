//! Incremental RESP Parser
//!
//! The parser works on a byte buffer that may hold a partial frame, one
//! frame, or several pipelined frames. Each call returns one of:
//!
//! - `Ok(Some((value, consumed)))`: a complete value; the caller advances the
//!   buffer by `consumed` bytes
//! - `Ok(None)`: the frame is incomplete, read more bytes and retry
//! - `Err(ProtocolError)`: the bytes can never form a valid frame
//!
//! Stray `\r` / `\n` bytes where a type tag is expected are skipped. Lines end
//! at `\n`, with an optional `\r` before it. Simple string and error lines
//! are taken verbatim, whatever bytes they hold.
//!
//! [`FrameScanner`] is the cheap first pass used by the stream reader: it only
//! finds where a frame ends, and remembers its progress across reads.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Decode-tier errors. Any of these ends the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Type tag outside `* $ + - :`
    #[error("unknown type: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0:?}")]
    InvalidInteger(String),

    /// Bulk length below -1
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Negative array count
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Bulk payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,

    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// Declared bulk length above the hard limit
    #[error("bulk string too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Buffered bytes exceeded the reader's frame limit
    #[error("frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    /// Stream ended in the middle of a frame
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Stream ended between frames
    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Upper bound on elements preallocated for an array before they arrive
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use emberkv::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"+PONG\r\n+OK\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::pong());
/// assert_eq!(consumed, 7);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        let skipped = stray_terminators(buf);
        let buf = &buf[skipped..];

        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let parsed = match buf[0] {
            // Simple strings and errors are kept byte for byte
            prefix::SIMPLE_STRING => parse_line(buf).map(|(line, used)| {
                (RespValue::SimpleString(Bytes::copy_from_slice(line)), used)
            }),
            prefix::ERROR => parse_line(buf).map(|(line, used)| {
                (RespValue::Error(Bytes::copy_from_slice(line)), used)
            }),
            prefix::INTEGER => self.parse_integer(buf)?,
            prefix::BULK_STRING => self.parse_bulk_string(buf)?,
            prefix::ARRAY => self.parse_array(buf)?,
            other => return Err(ProtocolError::UnknownPrefix(other)),
        };

        Ok(parsed.map(|(value, consumed)| (value, skipped + consumed)))
    }

    /// `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::INTEGER);

        match parse_line(buf) {
            Some((line, used)) => Ok(Some((RespValue::Integer(parse_i64(line)?), used))),
            None => Ok(None),
        }
    }

    /// `$<length>\r\n<data>\r\n`, or `$-1\r\n` for null
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (line, data_start) = match parse_line(buf) {
            Some(found) => found,
            None => return Ok(None),
        };

        let length = match bulk_length(line)? {
            Some(length) => length,
            None => return Ok(Some((RespValue::Null, data_start))),
        };

        let total_needed = data_start + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ProtocolError::MissingTerminator);
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);

        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (line, mut consumed) = match parse_line(buf) {
            Some(found) => found,
            None => return Ok(None),
        };

        let count = array_length(line)?;
        let mut elements = Vec::with_capacity(count.min(MAX_PREALLOCATED_ELEMENTS));

        self.depth += 1;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }

        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Finds where the first complete frame in a growing buffer ends, without
/// building any values.
///
/// The scan resumes where the previous call stopped, so feeding a large frame
/// in many small reads costs time linear in its size. Between calls the
/// caller may only append to the buffer; once a frame is found (or the front
/// of the buffer changes) the scanner starts over from offset zero.
///
/// Validation matches [`RespParser`], so a scanned frame always parses.
#[derive(Debug, Default)]
pub struct FrameScanner {
    /// Bytes already accounted for, from the start of the buffer
    offset: usize,
    /// Elements still expected by each open array, outermost first
    pending: Vec<usize>,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the scan is inside an array.
    pub fn in_frame(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.pending.clear();
    }

    /// Returns the length of the first complete frame in `buf`, or `None` if
    /// more bytes are needed.
    pub fn scan(&mut self, buf: &[u8]) -> ProtocolResult<Option<usize>> {
        loop {
            let rest = &buf[self.offset..];
            let skipped = stray_terminators(rest);
            let rest = &rest[skipped..];

            if rest.is_empty() {
                self.offset += skipped;
                return Ok(None);
            }

            if self.pending.len() > MAX_NESTING_DEPTH {
                return Err(ProtocolError::NestingTooDeep(MAX_NESTING_DEPTH));
            }

            let tag = rest[0];
            if !matches!(
                tag,
                prefix::SIMPLE_STRING
                    | prefix::ERROR
                    | prefix::INTEGER
                    | prefix::BULK_STRING
                    | prefix::ARRAY
            ) {
                return Err(ProtocolError::UnknownPrefix(tag));
            }

            let (line, header) = match parse_line(rest) {
                Some(found) => found,
                None => {
                    self.offset += skipped;
                    return Ok(None);
                }
            };

            let value_len = match tag {
                prefix::INTEGER => {
                    parse_i64(line)?;
                    header
                }
                prefix::BULK_STRING => match bulk_length(line)? {
                    None => header,
                    Some(length) => {
                        let total = header + length + CRLF.len();
                        if rest.len() < total {
                            self.offset += skipped;
                            return Ok(None);
                        }
                        if &rest[header + length..total] != CRLF {
                            return Err(ProtocolError::MissingTerminator);
                        }
                        total
                    }
                },
                prefix::ARRAY => {
                    let count = array_length(line)?;
                    if count > 0 {
                        self.offset += skipped + header;
                        self.pending.push(count);
                        continue;
                    }
                    header
                }
                _ => header,
            };
            self.offset += skipped + value_len;

            // One value finished; close every array it completes.
            loop {
                match self.pending.last_mut() {
                    None => {
                        let end = self.offset;
                        self.reset();
                        return Ok(Some(end));
                    }
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.pending.pop();
                    }
                }
            }
        }
    }
}

/// Number of `\r` / `\n` bytes at the front of `buf`.
#[inline]
pub(crate) fn stray_terminators(buf: &[u8]) -> usize {
    buf.iter()
        .take_while(|&&b| b == b'\r' || b == b'\n')
        .count()
}

/// Reads the line after a type tag. The consumed count includes the tag.
#[inline]
fn parse_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    read_line(&buf[1..]).map(|(line, used)| (line, 1 + used))
}

/// Splits off one line ending in `\n`.
///
/// Returns the content without its terminator (`\r\n` or bare `\n`) and the
/// number of bytes consumed including the terminator.
#[inline]
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let newline = buf.iter().position(|&b| b == b'\n')?;
    let line = &buf[..newline];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, newline + 1))
}

fn parse_i64(line: &[u8]) -> ProtocolResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Payload length from a bulk string header; `None` for the null bulk string.
fn bulk_length(line: &[u8]) -> ProtocolResult<Option<usize>> {
    let length = parse_i64(line)?;
    if length == -1 {
        return Ok(None);
    }

    let length = usize::try_from(length).map_err(|_| ProtocolError::InvalidBulkLength(length))?;
    if length > MAX_BULK_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }
    Ok(Some(length))
}

fn array_length(line: &[u8]) -> ProtocolResult<usize> {
    let count = parse_i64(line)?;
    usize::try_from(count).map_err(|_| ProtocolError::InvalidArrayLength(count))
}

/// Parses a single RESP message from the front of `buf`.
pub fn parse_message(buf: &[u8]) -> ProtocolResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
