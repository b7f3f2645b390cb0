//! Classifies the structural event at a breakpoint between two segments.

use tracing::instrument;

use crate::error::{HalError, HalResult};
use crate::genome::Genome;
use crate::iter::{GappedTopIterator, SegmentIterator, TopSegmentIterator};

/// The label the classifier assigns to a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearrangement {
    /// Sequence present in the child but absent from the parent.
    Insertion,
    /// Sequence present in the parent but absent from the child.
    Deletion,
    /// The child segment's counterpart participates in a paralogy cycle.
    Duplication,
    /// Mapped but with the counterpart found out of linear order.
    Transposition,
    /// Mapped but strand-flipped relative to the neighbour.
    Inversion,
    /// Mapped onto a different sequence than the neighbour.
    Translocation,
    /// None of the simple categories apply.
    Complex,
    /// A sub-threshold simple indel.
    Gap,
    /// No rearrangement: segments are contiguous on both sides.
    Nothing,
    /// The interval's N-base fraction exceeds the configured threshold.
    Missing,
    /// The breakpoint position is invalid for classification.
    Invalid,
}

/// Tunables for [`RearrangementClassifier`]. Defaults: a gap threshold of
/// 100 bases and an N-fraction threshold of 0.1.
#[derive(Debug, Clone, Copy)]
pub struct RearrangementConfig {
    gap_threshold: u64,
    n_threshold: f64,
    atomic: bool,
}

impl Default for RearrangementConfig {
    fn default() -> Self {
        Self {
            gap_threshold: 100,
            n_threshold: 0.1,
            atomic: false,
        }
    }
}

impl RearrangementConfig {
    /// Start from the defaults.
    pub fn new() -> HalResult<Self> {
        Ok(Self::default())
    }

    /// Maximum length of an unmapped segment still treated as a gap.
    pub fn with_gap_threshold(mut self, gap_threshold: u64) -> Self {
        self.gap_threshold = gap_threshold;
        self
    }

    /// Fraction of N bases in `[0, 1]` above which an interval is `Missing`.
    pub fn with_n_threshold(mut self, n_threshold: f64) -> HalResult<Self> {
        if !(0.0..=1.0).contains(&n_threshold) {
            return Err(HalError::InvalidArgument(
                "n_threshold must lie in [0, 1]".to_string(),
            ));
        }
        self.n_threshold = n_threshold;
        Ok(self)
    }

    /// Disable gap-merging, forcing one-segment-at-a-time reporting.
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }
}

/// Scans a breakpoint and labels it.
#[derive(Debug, Clone, Copy)]
pub struct RearrangementClassifier {
    config: RearrangementConfig,
}

impl RearrangementClassifier {
    /// A classifier with the given configuration.
    pub fn new(config: RearrangementConfig) -> Self {
        Self { config }
    }

    /// Classify the breakpoint to the right of `seed` (a top-segment
    /// iterator in `child`, parented in `parent`).
    #[instrument(skip(self, child, parent))]
    pub fn classify(
        &self,
        seed: TopSegmentIterator,
        child: &mut Genome,
        parent: &mut Genome,
    ) -> HalResult<Rearrangement> {
        if seed.is_sliced() {
            return Ok(Rearrangement::Invalid);
        }

        if self.fraction_n(seed, child)? > self.config.n_threshold {
            return Ok(Rearrangement::Missing);
        }

        let left = GappedTopIterator::new(seed, child, parent, self.config.gap_threshold, self.config.atomic)?;
        let mut right_seed = seed;
        if right_seed.to_right(child, None).is_err() {
            return Ok(Rearrangement::Nothing);
        }
        let right = GappedTopIterator::new(
            right_seed,
            child,
            parent,
            self.config.gap_threshold,
            self.config.atomic,
        )?;

        let left_rec = *child.top_record(left.right_most().array_index())?;
        let right_rec = *child.top_record(right.left_most().array_index())?;

        if left_rec.has_paralogy() || right_rec.has_paralogy() {
            return Ok(Rearrangement::Duplication);
        }

        match (left_rec.has_parent(), right_rec.has_parent()) {
            (true, true) => {
                let (lp, lr) = (left_rec.parent_index as usize, left_rec.parent_reversed);
                let (rp, rr) = (right_rec.parent_index as usize, right_rec.parent_reversed);
                if lr != rr {
                    return Ok(Rearrangement::Inversion);
                }

                let lp_seq = parent.sequences().sequence_index_for_bottom(lp as i64)?;
                let rp_seq = parent.sequences().sequence_index_for_bottom(rp as i64)?;
                if lp_seq != rp_seq {
                    return Ok(Rearrangement::Translocation);
                }

                let forward_adjacent = rp == lp + 1;
                let backward_adjacent = lr && lp == rp + 1;
                if forward_adjacent || backward_adjacent {
                    return Ok(Rearrangement::Nothing);
                }

                let in_linear_order = if lr { rp < lp } else { rp > lp };
                if !in_linear_order {
                    return Ok(Rearrangement::Transposition);
                }

                let gap_len = if rp > lp {
                    self.sum_parent_gap(parent, lp + 1, rp)?
                } else if lp > rp {
                    self.sum_parent_gap(parent, rp + 1, lp)?
                } else {
                    0
                };
                if gap_len <= self.config.gap_threshold {
                    Ok(Rearrangement::Gap)
                } else if rp.abs_diff(lp) > 1 {
                    Ok(Rearrangement::Deletion)
                } else {
                    Ok(Rearrangement::Complex)
                }
            }
            (true, false) => Ok(Rearrangement::Insertion),
            (false, true) => Ok(Rearrangement::Insertion),
            (false, false) => Ok(Rearrangement::Complex),
        }
    }

    /// Sum bottom-segment lengths over `[from, to)`. Callers must have
    /// already verified `from` and `to` fall on the same sequence; the
    /// `classify` match arm does this via `sequence_index_for_bottom`
    /// before reaching here.
    fn sum_parent_gap(&self, parent: &mut Genome, from: usize, to: usize) -> HalResult<u64> {
        let mut total = 0;
        for idx in from..to {
            total += parent.bottom_length(idx)?;
        }
        Ok(total)
    }

    fn fraction_n(&self, seed: TopSegmentIterator, child: &mut Genome) -> HalResult<f64> {
        let start = seed.start(child)?;
        let len = seed.length(child)?;
        if len == 0 {
            return Ok(0.0);
        }
        let s = child.get_string()?;
        let slice = &s[start as usize..(start + len) as usize];
        let n_count = slice.chars().filter(|c| matches!(c, 'N' | 'n')).count();
        Ok(n_count as f64 / len as f64)
    }
}
