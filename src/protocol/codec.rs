//! Stream Codec
//!
//! [`RespReader`] turns an async byte stream into a sequence of [`RespValue`]s.
//! It accumulates bytes in a `BytesMut` buffer, lets a [`FrameScanner`] pick
//! up where it left off after every read, and runs the [`RespParser`] once
//! the scanner reports a complete frame. Partial reads and pipelined frames
//! both work, and a frame split over many reads is only walked once.
//!
//! [`RespWriter`] writes one reply at a time and flushes after each, so a
//! client never waits on a reply sitting in our buffer.

use crate::protocol::parser::{
    stray_terminators, FrameScanner, ProtocolError, ProtocolResult, RespParser, MAX_BULK_SIZE,
};
use crate::protocol::types::RespValue;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::trace;

/// Default cap on buffered bytes for a single frame: one maximal bulk string
/// plus room for its header and the surrounding array.
pub const DEFAULT_MAX_FRAME_SIZE: usize = MAX_BULK_SIZE + 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Decodes RESP values from an async byte stream.
#[derive(Debug)]
pub struct RespReader<R> {
    inner: R,
    buffer: BytesMut,
    scanner: FrameScanner,
    parser: RespParser,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a reader that gives up once `max_frame_size` bytes are
    /// buffered without completing a frame.
    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            scanner: FrameScanner::new(),
            parser: RespParser::new(),
            max_frame_size,
        }
    }

    /// Decodes the next value, reading from the stream as needed.
    ///
    /// Consumes exactly the bytes of one value (plus any stray line
    /// terminators in front of it); later pipelined frames stay buffered.
    pub async fn decode(&mut self) -> ProtocolResult<RespValue> {
        loop {
            self.discard_stray_terminators();

            if let Some(end) = self.scanner.scan(&self.buffer)? {
                // The scanner validated the frame, so this cannot come up short
                let (value, consumed) = self
                    .parser
                    .parse(&self.buffer[..end])?
                    .ok_or(ProtocolError::UnexpectedEof)?;
                self.buffer.advance(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    kind = value.kind(),
                    "Decoded frame"
                );
                return Ok(value);
            }

            if self.buffer.len() >= self.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    max: self.max_frame_size,
                });
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(self.eof_error());
            }
            trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        }
    }

    /// Drops `\r` / `\n` bytes waiting in front of the next frame so they
    /// never pile up in the buffer.
    fn discard_stray_terminators(&mut self) {
        if self.scanner.in_frame() {
            return;
        }
        let stray = stray_terminators(&self.buffer);
        if stray > 0 {
            self.buffer.advance(stray);
        }
        self.scanner.reset();
    }

    /// End of stream between frames is a normal close; anything else left in
    /// the buffer was a truncated frame.
    fn eof_error(&self) -> ProtocolError {
        if stray_terminators(&self.buffer) == self.buffer.len() {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::UnexpectedEof
        }
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Encodes replies onto an async byte stream, flushing after every reply.
#[derive(Debug)]
pub struct RespWriter<W> {
    inner: BufWriter<W>,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            scratch: Vec::with_capacity(64),
        }
    }

    /// `+<s>\r\n`
    pub async fn write_simple_string(&mut self, s: &str) -> std::io::Result<usize> {
        self.write_value(&RespValue::simple_string(Bytes::copy_from_slice(s.as_bytes())))
            .await
    }

    /// `-<message>\r\n`
    pub async fn write_error(&mut self, message: &str) -> std::io::Result<usize> {
        self.write_value(&RespValue::error(Bytes::copy_from_slice(message.as_bytes())))
            .await
    }

    /// `$<len>\r\n<data>\r\n`
    pub async fn write_bulk_string(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.write_value(&RespValue::bulk_string(Bytes::copy_from_slice(data)))
            .await
    }

    /// `$-1\r\n`
    pub async fn write_null_bulk_string(&mut self) -> std::io::Result<usize> {
        self.write_value(&RespValue::Null).await
    }

    /// `:<n>\r\n`
    pub async fn write_integer(&mut self, n: i64) -> std::io::Result<usize> {
        self.write_value(&RespValue::Integer(n)).await
    }

    /// Writes any value and flushes. Returns the number of bytes written.
    pub async fn write_value(&mut self, value: &RespValue) -> std::io::Result<usize> {
        self.scratch.clear();
        value.serialize_into(&mut self.scratch);
        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        trace!(bytes = self.scratch.len(), kind = value.kind(), "Sent response");
        Ok(self.scratch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_decode_sequence_of_frames() {
        let input: &[u8] = b"*1\r\n$4\r\nPING\r\n+OK\r\n:42\r\n";
        let mut reader = RespReader::new(input);

        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::Array(vec![RespValue::bulk_string(Bytes::from("PING"))])
        );
        assert_eq!(reader.decode().await.unwrap(), RespValue::ok());
        assert_eq!(reader.decode().await.unwrap(), RespValue::Integer(42));
        assert!(matches!(
            reader.decode().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_decode_across_partial_reads() {
        let stream = tokio_test::io::Builder::new()
            .read(b"*2\r\n$3\r")
            .read(b"\nGET\r\n$")
            .read(b"5\r\nhel")
            .read(b"lo\r\n")
            .build();
        let mut reader = RespReader::new(stream);

        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::Array(vec![
                RespValue::bulk_string(Bytes::from("GET")),
                RespValue::bulk_string(Bytes::from("hello")),
            ])
        );
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_decode_binary_bulk_string() {
        let input: &[u8] = b"$4\r\n\r\n\x00\xff\r\n";
        let mut reader = RespReader::new(input);
        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::bulk_string(Bytes::from_static(b"\r\n\x00\xff"))
        );
    }

    #[tokio::test]
    async fn test_decode_trailing_terminators_then_close() {
        let input: &[u8] = b"+OK\r\n\r\n\n";
        let mut reader = RespReader::new(input);
        assert_eq!(reader.decode().await.unwrap(), RespValue::ok());
        assert!(matches!(
            reader.decode().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_decode_eof_mid_frame() {
        let input: &[u8] = b"*2\r\n$3\r\nGET\r\n";
        let mut reader = RespReader::new(input);
        assert!(matches!(
            reader.decode().await,
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_decode_malformed() {
        let input: &[u8] = b"!oops\r\n";
        let mut reader = RespReader::new(input);
        assert!(matches!(
            reader.decode().await,
            Err(ProtocolError::UnknownPrefix(b'!'))
        ));
    }

    #[tokio::test]
    async fn test_decode_frame_limit() {
        let input = vec![b'+'; 256];
        let mut reader = RespReader::with_max_frame_size(&input[..], 64);
        assert!(matches!(
            reader.decode().await,
            Err(ProtocolError::FrameTooLarge { max: 64 })
        ));
    }

    #[tokio::test]
    async fn test_writer_formats() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut writer = RespWriter::new(server);

        assert_eq!(writer.write_simple_string("PONG").await.unwrap(), 7);
        writer.write_error("syntax error").await.unwrap();
        writer.write_bulk_string(b"").await.unwrap();
        writer.write_bulk_string(b"hi").await.unwrap();
        writer.write_null_bulk_string().await.unwrap();
        writer.write_integer(-2).await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).await.unwrap();
        assert_eq!(
            wire,
            b"+PONG\r\n-syntax error\r\n$0\r\n\r\n$2\r\nhi\r\n$-1\r\n:-2\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_writer_flushes_each_reply() {
        let stream = tokio_test::io::Builder::new()
            .write(b"+OK\r\n")
            .write(b":1\r\n")
            .build();
        let mut writer = RespWriter::new(stream);

        writer.write_simple_string("OK").await.unwrap();
        writer.write_integer(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_then_reader_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = RespWriter::new(server);
        writer.write_bulk_string(b"a\x00b").await.unwrap();
        writer.write_error("empty command").await.unwrap();
        writer.write_integer(i64::MAX).await.unwrap();

        let mut reader = RespReader::new(client);
        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::bulk_string(Bytes::from_static(b"a\x00b"))
        );
        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::error("empty command")
        );
        assert_eq!(reader.decode().await.unwrap(), RespValue::Integer(i64::MAX));
    }

    #[tokio::test]
    async fn test_decode_large_array_over_small_reads() {
        const ELEMENTS: usize = 50_000;

        let mut wire = format!("*{}\r\n", ELEMENTS).into_bytes();
        for i in 0..ELEMENTS {
            let item = format!("item:{}", i);
            wire.extend_from_slice(format!("${}\r\n{}\r\n", item.len(), item).as_bytes());
        }
        wire.extend_from_slice(b"+NEXT\r\n");

        let mut builder = tokio_test::io::Builder::new();
        for chunk in wire.chunks(1024) {
            builder.read(chunk);
        }
        let mut reader = RespReader::new(builder.build());

        let value = tokio::time::timeout(Duration::from_secs(10), reader.decode())
            .await
            .expect("decode finished in time")
            .unwrap();
        match value {
            RespValue::Array(items) => {
                assert_eq!(items.len(), ELEMENTS);
                assert_eq!(items[0], RespValue::bulk_string(Bytes::from("item:0")));
                assert_eq!(
                    items[ELEMENTS - 1],
                    RespValue::bulk_string(Bytes::from(format!("item:{}", ELEMENTS - 1)))
                );
            }
            other => panic!("expected array, got {:?}", other),
        }
        assert_eq!(reader.decode().await.unwrap(), RespValue::simple_string("NEXT"));
    }

    #[tokio::test]
    async fn test_stray_terminators_do_not_count_toward_frame_limit() {
        let mut wire = b"\r\n".repeat(2048);
        wire.extend_from_slice(b"+OK\r\n");

        let mut builder = tokio_test::io::Builder::new();
        for chunk in wire.chunks(100) {
            builder.read(chunk);
        }
        let mut reader = RespReader::with_max_frame_size(builder.build(), 128);

        assert_eq!(reader.decode().await.unwrap(), RespValue::ok());
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_decode_non_utf8_simple_string() {
        let input: &[u8] = b"+\xff\xfe\r\n-\x80\r\n";
        let mut reader = RespReader::new(input);
        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::simple_string(Bytes::from_static(b"\xff\xfe"))
        );
        assert_eq!(
            reader.decode().await.unwrap(),
            RespValue::error(Bytes::from_static(b"\x80"))
        );
    }
}
