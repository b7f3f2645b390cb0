//! Agglomerated runs of segments separated only by short indels.
//!
//! A gapped iterator holds the leftmost and rightmost plain cursors of a
//! maximal run of mutually compatible segments: all mapped into the same
//! counterpart sequence on the same strand, with only sub-threshold
//! segments between their counterparts. Atomic mode disables agglomeration,
//! turning the pair into a single-segment window.

use crate::error::{HalError, HalResult};
use crate::genome::Genome;
use crate::iter::segment_iterator::{BottomSegmentIterator, SegmentIterator, TopSegmentIterator};
use crate::mapper::MappedSegment;

/// A maximal run of mutually compatible top segments, modulo gaps no longer
/// than `gap_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct GappedTopIterator {
    left: TopSegmentIterator,
    right: TopSegmentIterator,
    gap_threshold: u64,
    atomic: bool,
}

impl GappedTopIterator {
    /// Seed a gapped iterator from a single unsliced top segment. Extends it
    /// maximally in both directions unless `atomic` is set, in which case it
    /// behaves as a single-segment iterator.
    pub fn new(
        seed: TopSegmentIterator,
        genome: &mut Genome,
        parent: &mut Genome,
        gap_threshold: u64,
        atomic: bool,
    ) -> HalResult<Self> {
        if seed.is_sliced() {
            return Err(HalError::InvalidArgument(
                "gapped iterator rejects sliced seed segments".to_string(),
            ));
        }
        let mut it = Self {
            left: seed,
            right: seed,
            gap_threshold,
            atomic,
        };
        if !atomic {
            it.extend_left(genome, parent)?;
            it.extend_right(genome, parent)?;
        }
        Ok(it)
    }

    /// Leftmost segment of the run.
    pub fn left_most(&self) -> TopSegmentIterator {
        self.left
    }

    /// Rightmost segment of the run.
    pub fn right_most(&self) -> TopSegmentIterator {
        self.right
    }

    fn extend_left(&mut self, genome: &mut Genome, parent: &mut Genome) -> HalResult<()> {
        loop {
            let mut candidate = self.left;
            if candidate.to_left(genome, None).is_err() {
                return Ok(());
            }
            if !top_compatible(genome, parent, candidate.array_index(), self.left.array_index(), self.gap_threshold)? {
                return Ok(());
            }
            self.left = candidate;
        }
    }

    fn extend_right(&mut self, genome: &mut Genome, parent: &mut Genome) -> HalResult<()> {
        loop {
            let mut candidate = self.right;
            if candidate.to_right(genome, None).is_err() {
                return Ok(());
            }
            if !top_compatible(genome, parent, self.right.array_index(), candidate.array_index(), self.gap_threshold)? {
                return Ok(());
            }
            self.right = candidate;
        }
    }

    /// Extend the run one segment further left, re-testing maximality.
    pub fn to_left(&mut self, genome: &mut Genome, parent: &mut Genome) -> HalResult<()> {
        if self.atomic {
            self.left.to_left(genome, None)?;
            self.right = self.left;
            return Ok(());
        }
        self.left.to_left(genome, None)?;
        self.right = self.left;
        self.extend_left(genome, parent)?;
        self.extend_right(genome, parent)?;
        Ok(())
    }

    /// Extend the run one segment further right, re-testing maximality.
    pub fn to_right(&mut self, genome: &mut Genome, parent: &mut Genome) -> HalResult<()> {
        if self.atomic {
            self.right.to_right(genome, None)?;
            self.left = self.right;
            return Ok(());
        }
        self.right.to_right(genome, None)?;
        self.left = self.right;
        self.extend_left(genome, parent)?;
        self.extend_right(genome, parent)?;
        Ok(())
    }

    /// The agglomerated parent-side counterpart, if every end of this run
    /// is mapped.
    pub fn to_parent(&self, genome: &mut Genome) -> HalResult<Option<BottomSegmentIterator>> {
        let left_rec = genome.top_record(self.left.array_index())?;
        if !left_rec.has_parent() {
            return Ok(None);
        }
        Ok(Some(BottomSegmentIterator::new(left_rec.parent_index as usize)))
    }

    /// Cross-genome projection is only defined for plain segment iterators;
    /// an agglomerated run has no single source interval to project.
    pub fn mapped_segments(&self) -> HalResult<Vec<MappedSegment>> {
        Err(HalError::Unsupported(
            "mapped segments are not available on a gapped iterator".to_string(),
        ))
    }
}

/// A maximal run of mutually compatible bottom segments for a given child
/// slot, modulo gaps no longer than `gap_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct GappedBottomIterator {
    left: BottomSegmentIterator,
    right: BottomSegmentIterator,
    child_slot: usize,
    gap_threshold: u64,
    atomic: bool,
}

impl GappedBottomIterator {
    /// Seed a gapped bottom iterator for child slot `child_slot`.
    pub fn new(
        seed: BottomSegmentIterator,
        child_slot: usize,
        genome: &mut Genome,
        child: &mut Genome,
        gap_threshold: u64,
        atomic: bool,
    ) -> HalResult<Self> {
        if seed.is_sliced() {
            return Err(HalError::InvalidArgument(
                "gapped iterator rejects sliced seed segments".to_string(),
            ));
        }
        let mut it = Self {
            left: seed,
            right: seed,
            child_slot,
            gap_threshold,
            atomic,
        };
        if !atomic {
            it.extend_left(genome, child)?;
            it.extend_right(genome, child)?;
        }
        Ok(it)
    }

    /// Leftmost segment of the run.
    pub fn left_most(&self) -> BottomSegmentIterator {
        self.left
    }

    /// Rightmost segment of the run.
    pub fn right_most(&self) -> BottomSegmentIterator {
        self.right
    }

    fn extend_left(&mut self, genome: &mut Genome, child: &mut Genome) -> HalResult<()> {
        loop {
            let mut candidate = self.left;
            if candidate.to_left(genome, None).is_err() {
                return Ok(());
            }
            if !bottom_compatible(
                genome,
                child,
                self.child_slot,
                candidate.array_index(),
                self.left.array_index(),
                self.gap_threshold,
            )? {
                return Ok(());
            }
            self.left = candidate;
        }
    }

    fn extend_right(&mut self, genome: &mut Genome, child: &mut Genome) -> HalResult<()> {
        loop {
            let mut candidate = self.right;
            if candidate.to_right(genome, None).is_err() {
                return Ok(());
            }
            if !bottom_compatible(
                genome,
                child,
                self.child_slot,
                self.right.array_index(),
                candidate.array_index(),
                self.gap_threshold,
            )? {
                return Ok(());
            }
            self.right = candidate;
        }
    }

    /// Move the run one segment further left, re-establishing maximality.
    pub fn to_left(&mut self, genome: &mut Genome, child: &mut Genome) -> HalResult<()> {
        self.left.to_left(genome, None)?;
        self.right = self.left;
        if !self.atomic {
            self.extend_left(genome, child)?;
            self.extend_right(genome, child)?;
        }
        Ok(())
    }

    /// Move the run one segment further right, re-establishing maximality.
    pub fn to_right(&mut self, genome: &mut Genome, child: &mut Genome) -> HalResult<()> {
        self.right.to_right(genome, None)?;
        self.left = self.right;
        if !self.atomic {
            self.extend_left(genome, child)?;
            self.extend_right(genome, child)?;
        }
        Ok(())
    }

    /// The agglomerated child-side counterpart of the run's left end, if it
    /// is mapped for this iterator's child slot.
    pub fn to_child(&self, genome: &mut Genome) -> HalResult<Option<TopSegmentIterator>> {
        let link = genome
            .bottom_record(self.left.array_index())?
            .children
            .get(self.child_slot)
            .copied();
        match link.filter(|c| c.is_linked()) {
            Some(c) => {
                let mut it = TopSegmentIterator::new(c.child_index as usize);
                if c.child_reversed {
                    it.to_reverse();
                }
                Ok(Some(it))
            }
            None => Ok(None),
        }
    }

    /// Cross-genome projection is only defined for plain segment iterators;
    /// an agglomerated run has no single source interval to project.
    pub fn mapped_segments(&self) -> HalResult<Vec<MappedSegment>> {
        Err(HalError::Unsupported(
            "mapped segments are not available on a gapped iterator".to_string(),
        ))
    }
}

/// Compatibility test between two top segments `u` (left) and `v` (right):
/// both map into the same parent genome on the same sequence, same strand
/// relationship, same paralogy state (never mixing a canonical counterpart
/// with a non-canonical one), and the parent segments between their
/// counterparts are short enough to be gaps. A candidate gap is any
/// intervening parent segment no longer than `gap_threshold`.
fn top_compatible(
    genome: &mut Genome,
    parent: &mut Genome,
    u: usize,
    v: usize,
    gap_threshold: u64,
) -> HalResult<bool> {
    let (u_parent, u_rev, u_paralogy) = match genome.top_record(u)?.has_parent() {
        true => {
            let r = genome.top_record(u)?;
            (r.parent_index as usize, r.parent_reversed, r.has_paralogy())
        }
        false => return Ok(false),
    };
    let (v_parent, v_rev, v_paralogy) = match genome.top_record(v)?.has_parent() {
        true => {
            let r = genome.top_record(v)?;
            (r.parent_index as usize, r.parent_reversed, r.has_paralogy())
        }
        false => return Ok(false),
    };
    if u_rev != v_rev || u_paralogy != v_paralogy {
        return Ok(false);
    }
    let u_seq = parent.sequences().sequence_index_for_bottom(u_parent as i64)?;
    let v_seq = parent.sequences().sequence_index_for_bottom(v_parent as i64)?;
    if u_seq != v_seq {
        return Ok(false);
    }
    let (lo, hi) = if u_parent <= v_parent {
        (u_parent, v_parent)
    } else {
        (v_parent, u_parent)
    };
    if lo == hi {
        return Ok(true);
    }
    for idx in (lo + 1)..hi {
        if parent.bottom_length(idx)? > gap_threshold {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Symmetric compatibility test for bottom segments at a fixed child slot:
/// same same-sequence membership and paralogy state on the child side, in
/// addition to the strand and gap-length checks.
fn bottom_compatible(
    genome: &mut Genome,
    child: &mut Genome,
    slot: usize,
    u: usize,
    v: usize,
    gap_threshold: u64,
) -> HalResult<bool> {
    let u_slot = genome.bottom_record(u)?.children.get(slot).copied();
    let v_slot = genome.bottom_record(v)?.children.get(slot).copied();
    let (u_child, u_rev) = match u_slot {
        Some(c) if c.is_linked() => (c.child_index as usize, c.child_reversed),
        _ => return Ok(false),
    };
    let (v_child, v_rev) = match v_slot {
        Some(c) if c.is_linked() => (c.child_index as usize, c.child_reversed),
        _ => return Ok(false),
    };
    if u_rev != v_rev {
        return Ok(false);
    }
    let u_paralogy = child.top_record(u_child)?.has_paralogy();
    let v_paralogy = child.top_record(v_child)?.has_paralogy();
    if u_paralogy != v_paralogy {
        return Ok(false);
    }
    let u_seq = child.sequences().sequence_index_for_top(u_child as i64)?;
    let v_seq = child.sequences().sequence_index_for_top(v_child as i64)?;
    if u_seq != v_seq {
        return Ok(false);
    }
    let (lo, hi) = if u_child <= v_child {
        (u_child, v_child)
    } else {
        (v_child, u_child)
    };
    if lo == hi {
        return Ok(true);
    }
    for idx in (lo + 1)..hi {
        if child.top_length(idx)? > gap_threshold {
            return Ok(false);
        }
    }
    Ok(true)
}
