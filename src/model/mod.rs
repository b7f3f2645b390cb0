//! Data model: sequences, segment records, and metadata.

pub mod metadata;
pub mod segment_record;
pub mod sequence;

pub use metadata::MetaData;
pub use segment_record::{BottomSegmentRecord, ChildSlot, TopSegmentRecord, NULL_INDEX};
pub use sequence::{Sequence, SequenceDirectory};
