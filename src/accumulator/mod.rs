//! Chunked byte accumulator for one direction of one connection.
//!
//! [`ByteAccumulator`] collects every fragment delivered so far and lets the
//! reassembler peek, search, and consume bytes from the front without
//! reallocating a contiguous buffer per append. Sub-ranges share storage
//! with the backing chunks whenever the requested range lies within one
//! chunk; consuming a prefix via [`ByteAccumulator::truncate`] is the only
//! way bytes ever leave the buffer.


use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors raised for out-of-range accumulator access.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BoundsError {
    /// A requested sub-range does not fit the buffered bytes.
    #[error("range {start}..{end} out of bounds for accumulator of {len} bytes")]
    Range {
        /// Start of the requested range.
        start: usize,
        /// End of the requested range (exclusive).
        end: usize,
        /// Bytes currently buffered.
        len: usize,
    },
    /// A truncation asked for more bytes than are buffered.
    #[error("cannot truncate {requested} bytes from accumulator of {len} bytes")]
    Truncate {
        /// Bytes the caller asked to remove.
        requested: usize,
        /// Bytes currently buffered.
        len: usize,
    },
}

/// Append-only chunked byte buffer with prefix consumption.
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl ByteAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    /// Whether the accumulator holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Number of backing chunks. Exposed for storage-sharing assertions.
    #[must_use]
    pub fn chunk_count(&self) -> usize { self.chunks.len() }

    /// Append a fragment. Empty fragments are ignored.
    pub fn append(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.chunks.push_back(bytes);
    }

    /// Copy-free view of `start..end` where possible.
    ///
    /// The returned [`Bytes`] shares storage with the backing chunk when the
    /// range falls within a single chunk (which includes the whole-buffer
    /// case after coalescing); ranges spanning chunk boundaries are copied
    /// into a minimal independent slice. Either way the view is unaffected
    /// by later truncation of the accumulator.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsError::Range`] when `start > end` or `end` exceeds
    /// the buffered length.
    pub fn sub_range(&self, start: usize, end: usize) -> Result<Bytes, BoundsError> {
        if start > end || end > self.len {
            return Err(BoundsError::Range {
                start,
                end,
                len: self.len,
            });
        }
        if start == end {
            return Ok(Bytes::new());
        }

        let mut offset = 0;
        let mut wanted = end - start;
        let mut assembled: Option<BytesMut> = None;
        for chunk in &self.chunks {
            let chunk_end = offset + chunk.len();
            if chunk_end <= start {
                offset = chunk_end;
                continue;
            }
            let from = start.saturating_sub(offset).min(chunk.len());
            let take = (chunk.len() - from).min(wanted);
            if assembled.is_none() && take == wanted {
                // whole range inside one chunk: share its storage
                return Ok(chunk.slice(from..from + take));
            }
            assembled
                .get_or_insert_with(|| BytesMut::with_capacity(end - start))
                .extend_from_slice(&chunk[from..from + take]);
            wanted -= take;
            if wanted == 0 {
                break;
            }
            offset = chunk_end;
        }
        Ok(assembled.map(BytesMut::freeze).unwrap_or_default())
    }

    /// View of the entire buffered contents, coalescing multi-chunk storage
    /// into one chunk so repeated peeks stay copy-free.
    pub fn coalesced(&mut self) -> Bytes {
        if self.chunks.len() > 1 {
            let mut merged = BytesMut::with_capacity(self.len);
            for chunk in &self.chunks {
                merged.extend_from_slice(chunk);
            }
            self.chunks.clear();
            self.chunks.push_back(merged.freeze());
        }
        self.chunks.front().cloned().unwrap_or_default()
    }

    /// Remove the first `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BoundsError::Truncate`] when `n` exceeds the buffered
    /// length.
    pub fn truncate(&mut self, n: usize) -> Result<(), BoundsError> {
        if n > self.len {
            return Err(BoundsError::Truncate {
                requested: n,
                len: self.len,
            });
        }
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut front) = self.chunks.pop_front() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
            } else {
                front.advance(remaining);
                remaining = 0;
                self.chunks.push_front(front);
            }
        }
        self.len -= n;
        Ok(())
    }

    /// Whether the buffered bytes start with `needle`.
    #[must_use]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        if needle.len() > self.len {
            return false;
        }
        let mut pos = 0;
        for chunk in &self.chunks {
            let take = (needle.len() - pos).min(chunk.len());
            if chunk[..take] != needle[pos..pos + take] {
                return false;
            }
            pos += take;
            if pos == needle.len() {
                return true;
            }
        }
        pos == needle.len()
    }

    /// Whether the buffered bytes end with `needle`.
    #[must_use]
    pub fn ends_with(&self, needle: &[u8]) -> bool {
        if needle.len() > self.len {
            return false;
        }
        let mut pos = needle.len();
        for chunk in self.chunks.iter().rev() {
            let take = pos.min(chunk.len());
            if chunk[chunk.len() - take..] != needle[pos - take..pos] {
                return false;
            }
            pos -= take;
            if pos == 0 {
                return true;
            }
        }
        pos == 0
    }

    /// First position of `needle` within the buffered bytes, searching
    /// across chunk boundaries without materialising a copy.
    #[must_use]
    pub fn index_of(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        if needle.len() > self.len {
            return None;
        }
        let mut window: VecDeque<u8> = VecDeque::with_capacity(needle.len());
        let mut pos = 0;
        for chunk in &self.chunks {
            for &byte in chunk.iter() {
                if window.len() == needle.len() {
                    window.pop_front();
                }
                window.push_back(byte);
                pos += 1;
                if window.len() == needle.len() && window.iter().eq(needle.iter()) {
                    return Some(pos - needle.len());
                }
            }
        }
        None
    }

    /// Whether `needle` occurs anywhere in the buffered bytes.
    #[must_use]
    pub fn contains(&self, needle: &[u8]) -> bool { self.index_of(needle).is_some() }
}
