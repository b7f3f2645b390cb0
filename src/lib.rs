//! # hal-core
//!
//! Storage engine and traversal API for Hierarchical Alignment (HAL)
//! multiple-genome alignments organized around a phylogenetic tree. Each
//! internal node of the tree is an ancestral (reconstructed) genome; leaves
//! are extant genomes. Homology between a parent and each child is encoded
//! as paired segment arrays that partition both genomes into aligned
//! intervals with strand orientation.
//!
//! Three tightly coupled subsystems form the core:
//!
//! 1. The segmented-genome data model ([`genome`], [`model`], [`storage`]):
//!    a genome is DNA plus two parallel segment arrays (top: child-to-parent;
//!    bottom: parent-to-children) plus a sequence directory.
//! 2. The iterator family ([`iter`]): cursors over segment arrays with
//!    slicing, reverse-complement, and parent/child/paralogy navigation, plus
//!    gapped iterators that agglomerate runs of short indels.
//! 3. The column iterator and segment mapper ([`column`], [`mapper`]): a
//!    left-to-right traversal that materializes full multiple-alignment
//!    columns, and a mapper that projects an interval from one genome onto
//!    any other by walking up to the MRCA and back down.
//!
//! ## Usage
//!
//! ```
//! use hal_core::{Alignment, genome::SequenceDimensions};
//!
//! let mut aln = Alignment::new();
//! aln.add_root_genome(
//!     "root",
//!     &[SequenceDimensions { name: "chr1".into(), length: 4, top_segments: 0, bottom_segments: 1 }],
//!     true,
//! ).unwrap();
//! aln.add_child_genome(
//!     "root",
//!     "leaf",
//!     1.0,
//!     &[SequenceDimensions { name: "chr1".into(), length: 4, top_segments: 1, bottom_segments: 0 }],
//!     true,
//! ).unwrap();
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod alignment;
pub mod column;
pub mod error;
pub mod genome;
pub mod iter;
pub mod mapper;
pub mod model;
pub mod phylogeny;
pub mod rearrangement;
pub mod storage;
pub mod validate;

pub use alignment::Alignment;
pub use column::{Column, ColumnIterator, ColumnIteratorFlags, ColumnTree};
pub use error::{HalError, HalResult};
pub use genome::Genome;
pub use iter::{
    BottomSegmentIterator, DnaIterator, GappedBottomIterator, GappedTopIterator, Kind,
    SegmentIterator, TopSegmentIterator,
};
pub use mapper::{MappedSegment, SegmentMapper};
pub use model::{MetaData, Sequence, SequenceDirectory};
pub use phylogeny::Phylogeny;
pub use rearrangement::{Rearrangement, RearrangementClassifier, RearrangementConfig};
pub use validate::{validate_alignment, validate_genome};

/// Initialize a `tracing-subscriber` formatter for binaries and tests. The
/// library itself never installs a global subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
