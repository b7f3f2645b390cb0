//! Cursor objects over segment arrays and DNA.

pub mod dna_iterator;
pub mod gapped;
pub mod segment_iterator;

pub use dna_iterator::DnaIterator;
pub use gapped::{GappedBottomIterator, GappedTopIterator};
pub use segment_iterator::{BottomSegmentIterator, Kind, SegmentIterator, TopSegmentIterator};
