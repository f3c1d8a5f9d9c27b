//! # Byte Streams — the wire between the core and scene modules
//!
//! [`OutputBlob`] and [`InputBlob`] are the growable writer and the borrowing
//! reader used for every byte layout the universe produces: the skeleton
//! file, prefab blobs, and the temporary buffers a clone round-trips
//! component payloads through.
//!
//! Scalars and `#[repr(C)]` records go through [`bytemuck`]: anything
//! [`NoUninit`] can be written, anything [`AnyBitPattern`] can be read back.
//! Byte order is the host's, which is little-endian on every platform the
//! engine targets.
//!
//! ## Strings
//!
//! ```text
//! i32 size        ← byte length including the NUL terminator (0 = no string)
//! u8  bytes[size] ← UTF-8 text followed by a single 0
//! ```

use bytemuck::{AnyBitPattern, NoUninit};

use crate::error::BlobError;

/// A growable in-memory byte sink.
#[derive(Debug, Clone, Default)]
pub struct OutputBlob {
    data: Vec<u8>,
}

impl OutputBlob {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Append one plain-old-data value.
    pub fn write<T: NoUninit>(&mut self, value: T) {
        self.data.extend_from_slice(bytemuck::bytes_of(&value));
    }

    /// Append a contiguous block of records with no length prefix.
    pub fn write_slice<T: NoUninit>(&mut self, values: &[T]) {
        self.data.extend_from_slice(bytemuck::cast_slice(values));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a length-prefixed, NUL-terminated string.
    pub fn write_string(&mut self, value: &str) {
        let size = value.len() + 1;
        self.write(size as i32);
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// A bounds-checked cursor over borrowed bytes.
#[derive(Debug, Clone)]
pub struct InputBlob<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> InputBlob<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read one plain-old-data value. Alignment of the source is irrelevant.
    pub fn read<T: AnyBitPattern>(&mut self) -> Result<T, BlobError> {
        let bytes = self.read_bytes(size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Read `count` consecutive records.
    pub fn read_vec<T: AnyBitPattern>(&mut self, count: usize) -> Result<Vec<T>, BlobError> {
        let record = size_of::<T>();
        let total = record
            .checked_mul(count)
            .ok_or(BlobError::UnexpectedEnd {
                needed: usize::MAX,
                remaining: self.remaining(),
            })?;
        let bytes = self.read_bytes(total)?;
        Ok(bytes
            .chunks_exact(record.max(1))
            .take(count)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BlobError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(BlobError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read a string written by [`OutputBlob::write_string`].
    ///
    /// Strings longer than `max_len` bytes are rejected after being consumed,
    /// so the cursor stays aligned with the stream.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, BlobError> {
        let size = self.read::<i32>()?;
        if size < 0 {
            return Err(BlobError::InvalidLength(size));
        }
        if size == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(size as usize)?;
        let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        if text.len() > max_len {
            return Err(BlobError::StringTooLong {
                len: text.len(),
                max: max_len,
            });
        }
        String::from_utf8(text.to_vec()).map_err(|_| BlobError::InvalidUtf8)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }
}
