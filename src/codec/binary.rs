//! CBOR encoding for JSON-like values.
//!
//! `BufferWriter` and `BufferReader` are the byte sinks and sources the
//! codec runs over; the reader doubles as an async source for the packet
//! codec.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{AppError, Result};

/// Nesting deeper than this is rejected when decoding.
pub const MAX_DEPTH: usize = 128;

/// Growable output buffer.
#[derive(Debug, Default)]
pub struct BufferWriter {
    buf: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_length(&self) -> usize {
        self.buf.len()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Takes the written bytes, leaving the writer empty.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cursor over an owned byte buffer.
#[derive(Debug, Default)]
pub struct BufferReader {
    data: Vec<u8>,
    pos: usize,
}

impl BufferReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// `true` while unread bytes remain.
    pub fn readable(&self) -> bool {
        self.pos < self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads exactly `len` bytes.
    pub fn read_exact_slice(&mut self, len: usize) -> Result<&[u8]> {
        if self.remaining() < len {
            return Err(AppError::InvalidArgument(format!(
                "Unexpected end of buffer: wanted {} bytes, {} left",
                len,
                self.remaining()
            )));
        }

        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Returns every unread byte and exhausts the reader.
    pub fn drain(&mut self) -> Vec<u8> {
        let rest = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        rest
    }

    fn copy_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.remaining().min(out.len());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

impl io::Read for BufferReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        Ok(self.copy_into(out))
    }
}

impl AsyncRead for BufferReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = self.get_mut().copy_into(buf.initialize_unfilled());
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

/// Appends the CBOR encoding of `value` to `writer`.
pub fn serialize(writer: &mut BufferWriter, value: &Value) -> Result<()> {
    ciborium::into_writer(value, writer)
        .map_err(|e| AppError::InvalidArgument(format!("Failed to encode value: {}", e)))
}

/// Decodes one CBOR value from `reader`, consuming only its bytes.
pub fn deserialize(reader: &mut BufferReader) -> Result<Value> {
    ciborium::de::from_reader_with_recursion_limit(reader, MAX_DEPTH)
        .map_err(|e| AppError::InvalidArgument(format!("Failed to decode value: {}", e)))
}

/// Encodes `value` into a fresh buffer.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut writer = BufferWriter::new();
    serialize(&mut writer, value)?;
    Ok(writer.drain())
}

/// Decodes a buffer that must contain exactly one value.
pub fn from_bytes(bytes: Vec<u8>) -> Result<Value> {
    let mut reader = BufferReader::new(bytes);
    let value = deserialize(&mut reader)?;

    if reader.readable() {
        return Err(AppError::InvalidArgument(format!(
            "{} trailing bytes after value",
            reader.remaining()
        )));
    }

    Ok(value)
}
