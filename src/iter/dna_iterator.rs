//! Cursor over a genome's DNA with reverse-complement on read.

use crate::error::HalResult;
use crate::genome::Genome;

/// A single-base cursor. The column iterator's emitted map associates each
/// visited `Sequence` with an ordered set of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnaIterator {
    position: u64,
    reversed: bool,
}

impl DnaIterator {
    /// A cursor at `position`, reading the given strand.
    pub fn new(position: u64, reversed: bool) -> Self {
        Self { position, reversed }
    }

    /// Genome-relative position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether this cursor reads the reverse strand.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Read the base at the current position, complemented if reversed.
    pub fn get_base(&self, genome: &mut Genome) -> HalResult<u8> {
        genome.get_base_strand(self.position, self.reversed)
    }

    /// Advance one base in the logical reading direction.
    pub fn to_right(&mut self) {
        if self.reversed {
            self.position = self.position.saturating_sub(1);
        } else {
            self.position += 1;
        }
    }
}
