//! Buffered, nibble-packed DNA access.
//!
//! Two bases are packed per byte (low nibble first), `N` is a distinct
//! nibble value rather than a side mask, and a `remainder` flag records
//! whether the final nibble of an odd-length sequence is unused. Reads and
//! writes go through a single paged byte window; `flush` must run before
//! the handle is dropped, and a dirty drop is reported loudly.

use thiserror::Error;

use crate::storage::chunked_array::{ChunkedArray, ChunkedArrayBackend, InMemoryBackend, StorageError};

/// Errors raised while reading or writing packed DNA.
#[derive(Debug, Error)]
pub enum DnaError {
    /// A byte outside `{A,C,G,T,N}` (case-insensitive) was written.
    #[error("unsupported nucleotide '{0}' at position {1}")]
    UnsupportedBase(char, usize),
    /// Propagated from the underlying paged byte array.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A `set_string` call supplied a string of the wrong length.
    #[error("string length {actual} does not match DNA length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

const NIBBLE_A: u8 = 0;
const NIBBLE_C: u8 = 1;
const NIBBLE_G: u8 = 2;
const NIBBLE_T: u8 = 3;
const NIBBLE_N: u8 = 4;

fn encode_nibble(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(NIBBLE_A),
        b'C' | b'c' => Some(NIBBLE_C),
        b'G' | b'g' => Some(NIBBLE_G),
        b'T' | b't' | b'U' | b'u' => Some(NIBBLE_T),
        b'N' | b'n' => Some(NIBBLE_N),
        _ => None,
    }
}

fn decode_nibble(nibble: u8) -> u8 {
    match nibble & 0x0F {
        NIBBLE_A => b'A',
        NIBBLE_C => b'C',
        NIBBLE_G => b'G',
        NIBBLE_T => b'T',
        _ => b'N',
    }
}

fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// Buffered random-access window over packed DNA.
///
/// `get_base`/`set_base` are amortized O(1): the underlying [`ChunkedArray`]
/// keeps one resident byte-chunk, so consecutive accesses to nearby bases
/// never re-read from the backend.
#[derive(Debug)]
pub struct DnaAccess<B: ChunkedArrayBackend<u8> = InMemoryBackend<u8>> {
    bytes: ChunkedArray<u8, B>,
    len: usize,
    /// True when `len` is odd, i.e. the final nibble of the last byte is
    /// unused.
    remainder: bool,
}

impl DnaAccess<InMemoryBackend<u8>> {
    /// Allocate storage for `len` bases, packed two per byte.
    pub fn create(len: usize, chunk_size: usize, buffer_chunks: usize) -> Result<Self, DnaError> {
        let byte_len = len.div_ceil(2);
        let backend = InMemoryBackend::<u8>::with_len(byte_len);
        let bytes = ChunkedArray::create(backend, chunk_size.max(1), buffer_chunks.max(1))?;
        Ok(Self {
            bytes,
            len,
            remainder: len % 2 == 1,
        })
    }
}

impl<B: ChunkedArrayBackend<u8>> DnaAccess<B> {
    /// Number of bases addressable through this handle.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when there are no bases.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the final nibble is unused padding (odd total length).
    pub fn has_remainder(&self) -> bool {
        self.remainder
    }

    fn locate(&self, i: usize) -> (usize, bool) {
        (i / 2, i % 2 == 1)
    }

    /// Read the uppercase ASCII base at genome-relative position `i`.
    pub fn get_base(&mut self, i: usize) -> Result<u8, DnaError> {
        if i >= self.len {
            return Err(StorageError::IndexOutOfRange { index: i, len: self.len }.into());
        }
        let (byte_idx, high) = self.locate(i);
        let byte = *self.bytes.get(byte_idx)?;
        let nibble = if high { byte >> 4 } else { byte & 0x0F };
        Ok(decode_nibble(nibble))
    }

    /// Write `c` (one of `A,C,G,T,N`, case-insensitive) at position `i`.
    pub fn set_base(&mut self, i: usize, c: u8) -> Result<(), DnaError> {
        if i >= self.len {
            return Err(StorageError::IndexOutOfRange { index: i, len: self.len }.into());
        }
        let nibble = encode_nibble(c).ok_or(DnaError::UnsupportedBase(c as char, i))?;
        let (byte_idx, high) = self.locate(i);
        let slot = self.bytes.update(byte_idx)?;
        if high {
            *slot = (*slot & 0x0F) | (nibble << 4);
        } else {
            *slot = (*slot & 0xF0) | nibble;
        }
        Ok(())
    }

    /// Read `[start, end)` as an uppercase ASCII string, forward strand.
    pub fn get_string(&mut self, start: usize, end: usize) -> Result<String, DnaError> {
        let mut out = String::with_capacity(end.saturating_sub(start));
        for i in start..end {
            out.push(self.get_base(i)? as char);
        }
        Ok(out)
    }

    /// Overwrite `[0, len)` from an ASCII string matching `[ACGTNacgtn]*`.
    pub fn set_string(&mut self, s: &str) -> Result<(), DnaError> {
        if s.len() != self.len {
            return Err(DnaError::LengthMismatch {
                expected: self.len,
                actual: s.len(),
            });
        }
        for (i, b) in s.bytes().enumerate() {
            self.set_base(i, b)?;
        }
        Ok(())
    }

    /// Read a single base, optionally complemented for the reverse strand.
    pub fn get_base_strand(&mut self, i: usize, reverse: bool) -> Result<u8, DnaError> {
        let base = self.get_base(i)?;
        Ok(if reverse { complement(base) } else { base })
    }

    /// Write back any dirty buffered page. Required before the handle is
    /// dropped.
    pub fn flush(&mut self) {
        self.bytes.flush();
    }

    /// Whether there is unflushed state.
    pub fn is_dirty(&self) -> bool {
        self.bytes.is_dirty()
    }
}

impl<B: ChunkedArrayBackend<u8>> Drop for DnaAccess<B> {
    fn drop(&mut self) {
        if self.bytes.is_dirty() {
            tracing::error!("DnaAccess dropped while dirty; call flush() before dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_matches_setstring_getstring() {
        let mut dna = DnaAccess::create(8, 4, 1).unwrap();
        dna.set_string("ACGTNNAC").unwrap();
        assert_eq!(dna.get_string(0, 8).unwrap(), "ACGTNNAC");
    }

    #[test]
    fn odd_length_tracks_remainder() {
        let dna = DnaAccess::create(5, 4, 1).unwrap();
        assert!(dna.has_remainder());
        let even = DnaAccess::create(4, 4, 1).unwrap();
        assert!(!even.has_remainder());
    }

    #[test]
    fn reverse_strand_complements() {
        let mut dna = DnaAccess::create(4, 4, 1).unwrap();
        dna.set_string("ACGT").unwrap();
        assert_eq!(dna.get_base_strand(0, true).unwrap(), b'T');
        assert_eq!(dna.get_base_strand(3, true).unwrap(), b'A');
    }

    #[test]
    fn unsupported_base_is_rejected() {
        let mut dna = DnaAccess::create(1, 4, 1).unwrap();
        assert!(matches!(
            dna.set_base(0, b'X'),
            Err(DnaError::UnsupportedBase('X', 0))
        ));
    }

    #[test]
    fn case_insensitive_reads() {
        let mut dna = DnaAccess::create(4, 4, 1).unwrap();
        dna.set_string("acgt").unwrap();
        assert_eq!(dna.get_string(0, 4).unwrap(), "ACGT");
    }
}
