//! Storage primitives: paged typed arrays and buffered DNA access.
//!
//! These are the two leaf components of the crate. Everything above them in
//! the stack (segments, iterators, genomes, the column walk) is built
//! purely in terms of the contracts exposed here.

pub mod chunked_array;
pub mod dna;

pub use chunked_array::{ChunkedArray, ChunkedArrayBackend, InMemoryBackend, StorageError};
pub use dna::{DnaAccess, DnaError};
