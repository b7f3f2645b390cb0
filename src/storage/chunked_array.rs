//! Paged, fixed-length typed array with a single write-back buffer.
//!
//! A hierarchical-data or memory-mapped file container is pluggable behind
//! [`ChunkedArrayBackend`]; this crate only ships [`InMemoryBackend`],
//! which is sufficient for every operation the core needs since the
//! physical container format is an external collaborator referenced only
//! via its access contract.

use std::marker::PhantomData;

use thiserror::Error;
use tracing::trace;

/// Errors raised by the chunked array / storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Index fell outside `[0, len)`.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// Index that was requested.
        index: usize,
        /// Length of the array.
        len: usize,
    },
    /// Chunk size or buffer width was zero.
    #[error("chunk size and buffer width must be non-zero")]
    InvalidChunking,
}

/// Backend responsible for durable storage of the full array.
///
/// A real deployment would implement this over a compressed/chunked HDF5 (or
/// similarly pluggable) array; [`InMemoryBackend`] implements it directly
/// over a `Vec<T>` since the on-disk format itself belongs to the external
/// container.
pub trait ChunkedArrayBackend<T> {
    /// Total number of elements backing the array.
    fn len(&self) -> usize;

    /// Read `len` consecutive elements starting at `start`.
    fn read_chunk(&self, start: usize, len: usize) -> Vec<T>;

    /// Overwrite `data.len()` consecutive elements starting at `start`.
    fn write_chunk(&mut self, start: usize, data: &[T]);

    /// Grow or shrink the backing store, filling new elements with `fill`.
    fn resize(&mut self, new_len: usize, fill: T)
    where
        T: Clone;
}

/// A plain `Vec<T>`-backed implementation of [`ChunkedArrayBackend`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend<T> {
    data: Vec<T>,
}

impl<T: Clone + Default> InMemoryBackend<T> {
    /// Allocate a backend with `count` default-initialized elements.
    pub fn with_len(count: usize) -> Self {
        Self {
            data: vec![T::default(); count],
        }
    }
}

impl<T: Clone> ChunkedArrayBackend<T> for InMemoryBackend<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_chunk(&self, start: usize, len: usize) -> Vec<T> {
        self.data[start..start + len].to_vec()
    }

    fn write_chunk(&mut self, start: usize, data: &[T]) {
        self.data[start..start + data.len()].clone_from_slice(data);
    }

    fn resize(&mut self, new_len: usize, fill: T) {
        self.data.resize(new_len, fill);
    }
}

/// A resident window `[start, end)` of the backing array, with a dirty flag.
#[derive(Debug)]
struct Buffer<T> {
    start: usize,
    end: usize,
    data: Vec<T>,
    dirty: bool,
}

/// Fixed-length, paged, typed array with a single write-back buffer.
///
/// At most one chunk range is resident at a time: accessing an index
/// outside the current buffer triggers a write-back of the dirty buffer (if
/// any) followed by a fresh read of the chunk covering the new index.
#[derive(Debug)]
pub struct ChunkedArray<T, B = InMemoryBackend<T>> {
    backend: B,
    chunk_size: usize,
    buffer_chunks: usize,
    buffer: Option<Buffer<T>>,
    default: T,
    _marker: PhantomData<T>,
}

impl<T, B> ChunkedArray<T, B>
where
    T: Clone + Default,
    B: ChunkedArrayBackend<T>,
{
    /// Allocate a new chunked array of `count` default elements.
    pub fn create(backend: B, chunk_size: usize, buffer_chunks: usize) -> Result<Self, StorageError> {
        if chunk_size == 0 || buffer_chunks == 0 {
            return Err(StorageError::InvalidChunking);
        }
        Ok(Self {
            backend,
            chunk_size,
            buffer_chunks,
            buffer: None,
            default: T::default(),
            _marker: PhantomData,
        })
    }

    /// Attach to an already-populated backend.
    pub fn load(backend: B, chunk_size: usize, buffer_chunks: usize) -> Result<Self, StorageError> {
        Self::create(backend, chunk_size, buffer_chunks)
    }

    /// Number of elements in the array.
    pub fn len(&self) -> usize {
        self.backend.len()
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window_for(&self, index: usize) -> (usize, usize) {
        let width = self.chunk_size * self.buffer_chunks;
        let chunk_start = (index / width) * width;
        let chunk_end = (chunk_start + width).min(self.len());
        (chunk_start, chunk_end)
    }

    fn ensure_paged(&mut self, index: usize) -> Result<(), StorageError> {
        if index >= self.len() {
            return Err(StorageError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        if let Some(buf) = &self.buffer {
            if index >= buf.start && index < buf.end {
                return Ok(());
            }
        }
        self.flush();
        let (start, end) = self.window_for(index);
        trace!(start, end, "paging in chunk");
        let data = self.backend.read_chunk(start, end - start);
        self.buffer = Some(Buffer {
            start,
            end,
            data,
            dirty: false,
        });
        Ok(())
    }

    /// Write the resident buffer back to the backend if dirty.
    pub fn flush(&mut self) {
        if let Some(buf) = self.buffer.take() {
            if buf.dirty {
                trace!(start = buf.start, end = buf.end, "flushing dirty chunk");
                self.backend.write_chunk(buf.start, &buf.data);
            }
        }
    }

    /// Immutable access to element `i`, paging in its chunk if necessary.
    pub fn get(&mut self, i: usize) -> Result<&T, StorageError> {
        self.ensure_paged(i)?;
        let buf = self.buffer.as_ref().expect("paged above");
        Ok(&buf.data[i - buf.start])
    }

    /// Mutable access to element `i`; marks the buffer dirty.
    pub fn update(&mut self, i: usize) -> Result<&mut T, StorageError> {
        self.ensure_paged(i)?;
        let buf = self.buffer.as_mut().expect("paged above");
        buf.dirty = true;
        Ok(&mut buf.data[i - buf.start])
    }

    /// Typed, read-only projection of a field within element `i`.
    pub fn get_field<F>(&mut self, i: usize, project: impl FnOnce(&T) -> F) -> Result<F, StorageError> {
        self.get(i).map(project)
    }

    /// Typed, write-only projection of a field within element `i`.
    pub fn set_field(&mut self, i: usize, project: impl FnOnce(&mut T)) -> Result<(), StorageError> {
        let slot = self.update(i)?;
        project(slot);
        Ok(())
    }

    /// Replace the whole array, resizing the backend and dropping any
    /// resident buffer. Used by destructive reshapes (`set_dimensions`).
    pub fn reset(&mut self, new_len: usize) {
        self.buffer = None;
        self.backend.resize(new_len, self.default.clone());
    }

    /// Reference to the backend, e.g. for bulk iteration.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the resident buffer holds unflushed writes.
    pub fn is_dirty(&self) -> bool {
        self.buffer.as_ref().is_some_and(|b| b.dirty)
    }
}

impl<T, B> Drop for ChunkedArray<T, B> {
    fn drop(&mut self) {
        if let Some(buf) = &self.buffer {
            if buf.dirty {
                tracing::warn!("chunked array dropped with a dirty unflushed buffer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_reads_back_written_values() {
        let backend = InMemoryBackend::<i64>::with_len(10);
        let mut arr = ChunkedArray::create(backend, 3, 1).unwrap();
        for i in 0..10 {
            *arr.update(i).unwrap() = i as i64 * 2;
        }
        arr.flush();
        for i in 0..10 {
            assert_eq!(*arr.get(i).unwrap(), i as i64 * 2);
        }
    }

    #[test]
    fn out_of_range_is_reported() {
        let backend = InMemoryBackend::<i64>::with_len(4);
        let mut arr = ChunkedArray::create(backend, 2, 1).unwrap();
        assert!(matches!(
            arr.get(4),
            Err(StorageError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn field_projection_round_trips() {
        let backend = InMemoryBackend::<(i64, u8)>::with_len(4);
        let mut arr = ChunkedArray::create(backend, 2, 2).unwrap();
        arr.set_field(1, |rec| *rec = (42, 1)).unwrap();
        let value = arr.get_field(1, |rec| rec.0).unwrap();
        assert_eq!(value, 42);
    }
}
