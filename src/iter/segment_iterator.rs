//! Sliceable cursors over a genome's top or bottom segment array.

use crate::error::{HalError, HalResult};
use crate::genome::Genome;
use crate::model::{BottomSegmentRecord, ChildSlot, TopSegmentRecord};

/// Discriminates which array a segment iterator walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Child-side array.
    Top,
    /// Parent-side array.
    Bottom,
}

/// Behavior shared by [`TopSegmentIterator`] and [`BottomSegmentIterator`].
pub trait SegmentIterator {
    /// Which array this cursor walks.
    fn kind(&self) -> Kind;
    /// Current array index.
    fn array_index(&self) -> usize;
    /// Current orientation.
    fn is_reversed(&self) -> bool;
    /// Flip orientation without touching the slice offsets.
    fn to_reverse(&mut self);
    /// Flip orientation and swap the slice offsets, yielding the same
    /// interval read in the other direction.
    fn to_reverse_in_place(&mut self);
}

/// A cursor over a genome's top (child-side) segment array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopSegmentIterator {
    index: usize,
    start_offset: u64,
    end_offset: u64,
    reversed: bool,
}

impl TopSegmentIterator {
    /// A fresh, unsliced cursor at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
        }
    }

    /// Effective start coordinate, honoring orientation and slicing.
    pub fn start(&self, genome: &mut Genome) -> HalResult<u64> {
        if self.reversed {
            Ok(genome.top_end(self.index)? - self.start_offset)
        } else {
            Ok(genome.top_start(self.index)? + self.start_offset)
        }
    }

    /// Effective end coordinate (exclusive in forward reading order).
    pub fn end(&self, genome: &mut Genome) -> HalResult<u64> {
        if self.reversed {
            Ok(genome.top_start(self.index)? + self.end_offset)
        } else {
            Ok(genome.top_end(self.index)? - self.end_offset)
        }
    }

    /// Length of the effective interval.
    pub fn length(&self, genome: &mut Genome) -> HalResult<u64> {
        let full = genome.top_length(self.index)?;
        Ok(full.saturating_sub(self.start_offset + self.end_offset))
    }

    /// Sub-slice within the current segment.
    pub fn slice(&mut self, start_off: u64, end_off: u64, genome: &mut Genome) -> HalResult<()> {
        let full = genome.top_length(self.index)?;
        if start_off + end_off > full {
            return Err(HalError::InvalidArgument(
                "slice offsets exceed segment length".to_string(),
            ));
        }
        self.start_offset = start_off;
        self.end_offset = end_off;
        Ok(())
    }

    /// Move to the adjacent segment toward decreasing genome coordinate,
    /// consuming a pending slice offset first.
    pub fn to_left(&mut self, genome: &mut Genome, cutoff: Option<u64>) -> HalResult<()> {
        if self.start_offset > 0 {
            self.start_offset = 0;
            return Ok(());
        }
        if self.index == 0 {
            return Err(HalError::OutOfRange("already at first top segment".to_string()));
        }
        self.index -= 1;
        self.start_offset = 0;
        self.end_offset = 0;
        if let Some(cutoff) = cutoff {
            self.clamp_to_cutoff(genome, cutoff)?;
        }
        Ok(())
    }

    /// Move to the adjacent segment toward increasing genome coordinate.
    pub fn to_right(&mut self, genome: &mut Genome, cutoff: Option<u64>) -> HalResult<()> {
        if self.end_offset > 0 {
            self.end_offset = 0;
            return Ok(());
        }
        if self.index + 1 >= genome.num_top_segments() {
            return Err(HalError::OutOfRange("already at last top segment".to_string()));
        }
        self.index += 1;
        self.start_offset = 0;
        self.end_offset = 0;
        if let Some(cutoff) = cutoff {
            self.clamp_to_cutoff(genome, cutoff)?;
        }
        Ok(())
    }

    fn clamp_to_cutoff(&mut self, genome: &mut Genome, cutoff: u64) -> HalResult<()> {
        let start = genome.top_start(self.index)?;
        let end = genome.top_end(self.index)?;
        if cutoff > start && cutoff < end {
            if self.reversed {
                self.start_offset = end - cutoff;
            } else {
                self.end_offset = end - cutoff;
            }
        }
        Ok(())
    }

    /// Jump to the segment containing genome position `pos`, optionally
    /// collapsing to a single base.
    pub fn to_site(&mut self, genome: &mut Genome, pos: u64, slice: bool) -> HalResult<()> {
        self.index = genome.top_index_at(pos)?;
        self.reversed = false;
        self.start_offset = 0;
        self.end_offset = 0;
        if slice {
            let start = genome.top_start(self.index)?;
            let end = genome.top_end(self.index)?;
            self.start_offset = pos - start;
            self.end_offset = end - pos - 1;
        }
        Ok(())
    }

    /// Whether `p` is strictly left of the effective interval.
    pub fn left_of(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(p < self.start(genome)?.min(self.end(genome)?))
    }

    /// Whether `p` is strictly right of the effective interval.
    pub fn right_of(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(p >= self.start(genome)?.max(self.end(genome)?))
    }

    /// Whether `p` lies within the effective interval.
    pub fn overlaps(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(!self.left_of(genome, p)? && !self.right_of(genome, p)?)
    }

    /// This segment's own record.
    pub fn record<'g>(&self, genome: &'g mut Genome) -> HalResult<&'g TopSegmentRecord> {
        genome.top_record(self.index)
    }

    /// Whether this cursor has a non-trivial slice (gapped iterators reject
    /// sliced seeds).
    pub fn is_sliced(&self) -> bool {
        self.start_offset > 0 || self.end_offset > 0
    }

    /// Move to the child segment named by a parent bottom segment's child
    /// slot (top-only operation).
    pub fn to_child(&mut self, bottom_record: &BottomSegmentRecord, slot: usize) -> HalResult<()> {
        let c: &ChildSlot = bottom_record
            .children
            .get(slot)
            .ok_or_else(|| HalError::OutOfRange(format!("no child slot {slot}")))?;
        if !c.is_linked() {
            return Err(HalError::NotFound("child slot has no link".to_string()));
        }
        self.index = c.child_index as usize;
        self.reversed = c.child_reversed;
        self.start_offset = 0;
        self.end_offset = 0;
        Ok(())
    }

    /// Move to the child segment named by genome name, given the parent's
    /// bottom record and the ordered list of child genome names.
    pub fn to_child_g(
        &mut self,
        bottom_record: &BottomSegmentRecord,
        child_names: &[String],
        target: &str,
    ) -> HalResult<()> {
        let slot = child_names
            .iter()
            .position(|n| n == target)
            .ok_or_else(|| HalError::NotFound(format!("genome {target} is not a child")))?;
        self.to_child(bottom_record, slot)
    }

    /// Follow this segment's own parse link, repositioning `bottom_it` onto
    /// this genome's bottom array at the matching coordinate.
    pub fn to_parse_up(
        &self,
        genome: &mut Genome,
        bottom_it: &mut BottomSegmentIterator,
    ) -> HalResult<()> {
        let parse_start = genome.top_record(self.index)?.bottom_parse_index;
        if parse_start < 0 {
            return Err(HalError::NotFound("no parse link".to_string()));
        }
        let pos = self.start(genome)?;
        let end = self.end(genome)?;
        let mut idx = parse_start as usize;
        loop {
            let s = genome.bottom_start(idx)?;
            let e = genome.bottom_end(idx)?;
            if pos >= s && pos < e {
                bottom_it.index = idx;
                bottom_it.reversed = self.reversed;
                bottom_it.start_offset = pos - s;
                bottom_it.end_offset = e.saturating_sub(end.max(s));
                return Ok(());
            }
            idx += 1;
        }
    }

    /// Walk the paralogy cycle forward one step.
    pub fn to_next_paralogy(&mut self, genome: &mut Genome) -> HalResult<()> {
        let next = genome.top_record(self.index)?.next_paralogy_index;
        if next < 0 {
            return Err(HalError::NotFound("no paralogy link".to_string()));
        }
        self.index = next as usize;
        self.start_offset = 0;
        self.end_offset = 0;
        Ok(())
    }
}

impl SegmentIterator for TopSegmentIterator {
    fn kind(&self) -> Kind {
        Kind::Top
    }

    fn array_index(&self) -> usize {
        self.index
    }

    fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn to_reverse(&mut self) {
        self.reversed = !self.reversed;
    }

    fn to_reverse_in_place(&mut self) {
        self.reversed = !self.reversed;
        std::mem::swap(&mut self.start_offset, &mut self.end_offset);
    }
}

/// A cursor over a genome's bottom (parent-side) segment array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BottomSegmentIterator {
    index: usize,
    start_offset: u64,
    end_offset: u64,
    reversed: bool,
}

impl BottomSegmentIterator {
    /// A fresh, unsliced cursor at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            start_offset: 0,
            end_offset: 0,
            reversed: false,
        }
    }

    /// Effective start coordinate.
    pub fn start(&self, genome: &mut Genome) -> HalResult<u64> {
        if self.reversed {
            Ok(genome.bottom_end(self.index)? - self.start_offset)
        } else {
            Ok(genome.bottom_start(self.index)? + self.start_offset)
        }
    }

    /// Effective end coordinate.
    pub fn end(&self, genome: &mut Genome) -> HalResult<u64> {
        if self.reversed {
            Ok(genome.bottom_start(self.index)? + self.end_offset)
        } else {
            Ok(genome.bottom_end(self.index)? - self.end_offset)
        }
    }

    /// Length of the effective interval.
    pub fn length(&self, genome: &mut Genome) -> HalResult<u64> {
        let full = genome.bottom_length(self.index)?;
        Ok(full.saturating_sub(self.start_offset + self.end_offset))
    }

    /// Sub-slice within the current segment.
    pub fn slice(&mut self, start_off: u64, end_off: u64, genome: &mut Genome) -> HalResult<()> {
        let full = genome.bottom_length(self.index)?;
        if start_off + end_off > full {
            return Err(HalError::InvalidArgument(
                "slice offsets exceed segment length".to_string(),
            ));
        }
        self.start_offset = start_off;
        self.end_offset = end_off;
        Ok(())
    }

    /// Move toward decreasing genome coordinate.
    pub fn to_left(&mut self, genome: &mut Genome, cutoff: Option<u64>) -> HalResult<()> {
        if self.start_offset > 0 {
            self.start_offset = 0;
            return Ok(());
        }
        if self.index == 0 {
            return Err(HalError::OutOfRange(
                "already at first bottom segment".to_string(),
            ));
        }
        self.index -= 1;
        self.start_offset = 0;
        self.end_offset = 0;
        if let Some(cutoff) = cutoff {
            self.clamp_to_cutoff(genome, cutoff)?;
        }
        Ok(())
    }

    /// Move toward increasing genome coordinate.
    pub fn to_right(&mut self, genome: &mut Genome, cutoff: Option<u64>) -> HalResult<()> {
        if self.end_offset > 0 {
            self.end_offset = 0;
            return Ok(());
        }
        if self.index + 1 >= genome.num_bottom_segments() {
            return Err(HalError::OutOfRange(
                "already at last bottom segment".to_string(),
            ));
        }
        self.index += 1;
        self.start_offset = 0;
        self.end_offset = 0;
        if let Some(cutoff) = cutoff {
            self.clamp_to_cutoff(genome, cutoff)?;
        }
        Ok(())
    }

    fn clamp_to_cutoff(&mut self, genome: &mut Genome, cutoff: u64) -> HalResult<()> {
        let start = genome.bottom_start(self.index)?;
        let end = genome.bottom_end(self.index)?;
        if cutoff > start && cutoff < end {
            if self.reversed {
                self.start_offset = end - cutoff;
            } else {
                self.end_offset = end - cutoff;
            }
        }
        Ok(())
    }

    /// Jump to the segment containing genome position `pos`.
    pub fn to_site(&mut self, genome: &mut Genome, pos: u64, slice: bool) -> HalResult<()> {
        self.index = genome.bottom_index_at(pos)?;
        self.reversed = false;
        self.start_offset = 0;
        self.end_offset = 0;
        if slice {
            let start = genome.bottom_start(self.index)?;
            let end = genome.bottom_end(self.index)?;
            self.start_offset = pos - start;
            self.end_offset = end - pos - 1;
        }
        Ok(())
    }

    /// Whether `p` is strictly left of the effective interval.
    pub fn left_of(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(p < self.start(genome)?.min(self.end(genome)?))
    }

    /// Whether `p` is strictly right of the effective interval.
    pub fn right_of(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(p >= self.start(genome)?.max(self.end(genome)?))
    }

    /// Whether `p` lies within the effective interval.
    pub fn overlaps(&self, genome: &mut Genome, p: u64) -> HalResult<bool> {
        Ok(!self.left_of(genome, p)? && !self.right_of(genome, p)?)
    }

    /// This segment's own record.
    pub fn record<'g>(&self, genome: &'g mut Genome) -> HalResult<&'g BottomSegmentRecord> {
        genome.bottom_record(self.index)
    }

    /// Whether this cursor has a non-trivial slice.
    pub fn is_sliced(&self) -> bool {
        self.start_offset > 0 || self.end_offset > 0
    }

    /// Move to the parent segment (bottom-only operation).
    pub fn to_parent(&mut self, top_record: &TopSegmentRecord) -> HalResult<()> {
        if !top_record.has_parent() {
            return Err(HalError::NotFound("no parent link".to_string()));
        }
        self.index = top_record.parent_index as usize;
        self.reversed = top_record.parent_reversed;
        self.start_offset = 0;
        self.end_offset = 0;
        Ok(())
    }

    /// Follow this segment's own parse link, repositioning `top_it` onto
    /// this genome's top array at the matching coordinate.
    pub fn to_parse_down(
        &self,
        genome: &mut Genome,
        top_it: &mut TopSegmentIterator,
    ) -> HalResult<()> {
        let parse_start = genome.bottom_record(self.index)?.top_parse_index;
        if parse_start < 0 {
            return Err(HalError::NotFound("no parse link".to_string()));
        }
        let pos = self.start(genome)?;
        let end = self.end(genome)?;
        let mut idx = parse_start as usize;
        loop {
            let s = genome.top_start(idx)?;
            let e = genome.top_end(idx)?;
            if pos >= s && pos < e {
                top_it.index = idx;
                top_it.reversed = self.reversed;
                top_it.start_offset = pos - s;
                top_it.end_offset = e.saturating_sub(end.max(s));
                return Ok(());
            }
            idx += 1;
        }
    }
}

impl SegmentIterator for BottomSegmentIterator {
    fn kind(&self) -> Kind {
        Kind::Bottom
    }

    fn array_index(&self) -> usize {
        self.index
    }

    fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn to_reverse(&mut self) {
        self.reversed = !self.reversed;
    }

    fn to_reverse_in_place(&mut self) {
        self.reversed = !self.reversed;
        std::mem::swap(&mut self.start_offset, &mut self.end_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::SequenceDimensions;

    fn three_segment_genome() -> Genome {
        let mut g = Genome::new(
            "g",
            0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 12,
                top_segments: 3,
                bottom_segments: 0,
            }],
            true,
        )
        .unwrap();
        g.set_top_starts(&[0, 4, 8, 12]).unwrap();
        g.set_string("ACGTACGTACGT").unwrap();
        g
    }

    #[test]
    fn to_right_advances_and_clears_offsets() {
        let mut g = three_segment_genome();
        let mut it = TopSegmentIterator::new(0);
        it.slice(0, 1, &mut g).unwrap();
        it.to_right(&mut g, None).unwrap();
        assert_eq!(it.array_index(), 0, "pending end offset consumed first");
        it.to_right(&mut g, None).unwrap();
        assert_eq!(it.array_index(), 1);
    }

    #[test]
    fn reverse_idempotence() {
        let mut g = three_segment_genome();
        let mut it = TopSegmentIterator::new(1);
        it.slice(1, 1, &mut g).unwrap();
        let before = it;
        it.to_reverse();
        it.to_reverse();
        assert_eq!(it, before);
        it.to_reverse_in_place();
        it.to_reverse_in_place();
        assert_eq!(it, before);
    }

    #[test]
    fn to_site_locates_segment() {
        let mut g = three_segment_genome();
        let mut it = TopSegmentIterator::new(0);
        it.to_site(&mut g, 9, false).unwrap();
        assert_eq!(it.array_index(), 2);
    }

    #[test]
    fn overlaps_respects_effective_interval() {
        let mut g = three_segment_genome();
        let it = TopSegmentIterator::new(1);
        assert!(it.overlaps(&mut g, 5).unwrap());
        assert!(!it.overlaps(&mut g, 8).unwrap());
    }
}
