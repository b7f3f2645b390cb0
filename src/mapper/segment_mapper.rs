//! Projects an interval from one genome onto another via the phylogeny.
//!
//! The walk up from source to the coalescence point follows a single
//! `parent_index` chain (a segment has exactly one parent), so it never
//! branches. Paralogy-following only matters on the way back down: when
//! [`SegmentMapper::with_follow_paralogs`] is enabled, `step_down_all`
//! expands a landed child segment into its full paralogy cycle before
//! continuing, so a duplication between the coalescence point and the
//! target genome fans a single source position out into one
//! [`MappedSegment`] per paralog. A coalescence limit overrides the
//! default MRCA as that coalescence point; set above the true MRCA, it
//! re-descends through the paralogy cycles at every intermediate ancestor.

use tracing::instrument;

use crate::alignment::Alignment;
use crate::error::HalResult;
use crate::genome::Genome;
use crate::mapper::mapped_segment::MappedSegment;
use crate::model::NULL_INDEX;

/// Projects single-base positions across the tree, producing a
/// target-disjoint set of [`MappedSegment`]s.
#[derive(Debug, Clone, Default)]
pub struct SegmentMapper {
    coalescence_limit: Option<String>,
    follow_paralogs: bool,
}

impl SegmentMapper {
    /// A mapper with no extra configuration: MRCA coalescence, no
    /// paralogy-following.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `genome` as the coalescence point instead of the natural MRCA of
    /// source and target. `genome` must be an ancestor of the source genome
    /// or every mapping call returns an empty result.
    pub fn with_coalescence_limit(mut self, genome: impl Into<String>) -> Self {
        self.coalescence_limit = Some(genome.into());
        self
    }

    /// Expand through paralogy cycles while walking back down from the
    /// coalescence point.
    pub fn with_follow_paralogs(mut self, follow: bool) -> Self {
        self.follow_paralogs = follow;
        self
    }

    /// Map a single genome-relative position in `source_genome` onto
    /// `target_genome`. Returns an empty vector if the position is
    /// unmapped anywhere along the path (an insertion or deletion breaks
    /// the chain), or if a configured coalescence limit is not actually an
    /// ancestor of `source_genome`. With [`SegmentMapper::follow_paralogs`]
    /// enabled, may return more than one segment when a duplication sits
    /// between the coalescence point and `target_genome`.
    #[instrument(skip(self, alignment))]
    pub fn map_position(
        &self,
        alignment: &mut Alignment,
        source_genome: &str,
        pos: u64,
        target_genome: &str,
    ) -> HalResult<Vec<MappedSegment>> {
        if source_genome == target_genome {
            return Ok(vec![MappedSegment {
                source_genome: source_genome.to_string(),
                source_start: pos,
                source_end: pos + 1,
                target_genome: target_genome.to_string(),
                target_start: pos,
                target_end: pos + 1,
                reversed: false,
            }]);
        }

        let top = match &self.coalescence_limit {
            Some(limit) => limit.clone(),
            None => alignment.phylogeny().mrca(source_genome, target_genome)?,
        };

        let mut cur = source_genome.to_string();
        let mut cur_pos = pos;
        let mut reversed = false;
        while cur != top {
            match step_up(alignment, &cur, cur_pos)? {
                Some((next_name, next_pos, rev)) => {
                    reversed ^= rev;
                    cur = next_name;
                    cur_pos = next_pos;
                }
                None => return Ok(Vec::new()),
            }
        }

        let path = alignment.phylogeny().path_down(&top, target_genome)?;
        let mut states = vec![(cur_pos, reversed)];
        for pair in path.windows(2) {
            let (from, to) = (pair[0].as_str(), pair[1].as_str());
            let mut next_states = Vec::new();
            for (p, r) in states {
                for (next_pos, rev) in step_down_all(alignment, from, p, to, self.follow_paralogs)? {
                    next_states.push((next_pos, r ^ rev));
                }
            }
            states = next_states;
            if states.is_empty() {
                return Ok(Vec::new());
            }
        }

        let mut result: Vec<MappedSegment> = states
            .into_iter()
            .map(|(target_pos, rev)| MappedSegment {
                source_genome: source_genome.to_string(),
                source_start: pos,
                source_end: pos + 1,
                target_genome: target_genome.to_string(),
                target_start: target_pos,
                target_end: target_pos + 1,
                reversed: rev,
            })
            .collect();
        result.sort();
        result.dedup();
        Ok(result)
    }

    /// Map every position in `[start, end)` of `source_genome` onto
    /// `target_genome`, returning a merged, target-disjoint result set.
    pub fn map_range(
        &self,
        alignment: &mut Alignment,
        source_genome: &str,
        start: u64,
        end: u64,
        target_genome: &str,
    ) -> HalResult<Vec<MappedSegment>> {
        let mut result: Vec<MappedSegment> = Vec::new();
        let mut run: Option<MappedSegment> = None;
        for pos in start..end {
            let hits = self.map_position(alignment, source_genome, pos, target_genome)?;
            let Some(hit) = hits.into_iter().next() else {
                if let Some(r) = run.take() {
                    Self::insert_disjoint(&mut result, r);
                }
                continue;
            };
            run = match run {
                Some(mut r) if r.can_merge_right_with(&hit) => {
                    r.merge_right(&hit);
                    Some(r)
                }
                Some(r) => {
                    Self::insert_disjoint(&mut result, r);
                    Some(hit)
                }
                None => Some(hit),
            };
        }
        if let Some(r) = run {
            Self::insert_disjoint(&mut result, r);
        }
        Ok(result)
    }

    /// Insert `incoming` into `result`, clipping any existing entries that
    /// overlap it in target coordinates so the set stays target-disjoint.
    /// The incoming segment always wins the overlapping region.
    pub fn insert_disjoint(result: &mut Vec<MappedSegment>, incoming: MappedSegment) {
        let mut next = Vec::with_capacity(result.len() + 1);
        for existing in result.drain(..) {
            let disjoint = existing.target_genome != incoming.target_genome
                || existing.target_end <= incoming.target_start
                || existing.target_start >= incoming.target_end;
            if disjoint {
                next.push(existing);
                continue;
            }
            if existing.target_start < incoming.target_start {
                if let Some(left) = existing.clip_target(existing.target_start, incoming.target_start) {
                    next.push(left);
                }
            }
            if existing.target_end > incoming.target_end {
                if let Some(right) = existing.clip_target(incoming.target_end, existing.target_end) {
                    next.push(right);
                }
            }
        }
        next.push(incoming);
        next.sort();
        *result = next;
    }
}

fn step_up(alignment: &mut Alignment, current: &str, pos: u64) -> HalResult<Option<(String, u64, bool)>> {
    let parent_name = match alignment.phylogeny().parent(current)? {
        Some(p) => p.to_string(),
        None => return Ok(None),
    };
    let (parent_index, parent_reversed, offset) = {
        let genome = alignment.genome_mut(current)?;
        let idx = genome.top_index_at(pos)?;
        let rec = *genome.top_record(idx)?;
        if !rec.has_parent() {
            return Ok(None);
        }
        let seg_start = genome.top_start(idx)?;
        (rec.parent_index as usize, rec.parent_reversed, pos - seg_start)
    };
    let next_pos = {
        let parent = alignment.genome_mut(&parent_name)?;
        let seg_start = parent.bottom_start(parent_index)?;
        if parent_reversed {
            let seg_end = parent.bottom_end(parent_index)?;
            seg_end - 1 - offset
        } else {
            seg_start + offset
        }
    };
    Ok(Some((parent_name, next_pos, parent_reversed)))
}

/// Every top segment in `genome`'s paralogy cycle starting at `start`,
/// including `start` itself. A segment with no duplicates is its own
/// one-member cycle.
fn paralogy_siblings(genome: &mut Genome, start: usize) -> HalResult<Vec<usize>> {
    let mut members = vec![start];
    let mut idx = genome.top_record(start)?.next_paralogy_index;
    while idx != NULL_INDEX && idx as usize != start {
        members.push(idx as usize);
        idx = genome.top_record(idx as usize)?.next_paralogy_index;
    }
    Ok(members)
}

/// Step from a bottom segment in `current` down into `next_child` via the
/// slot linking them. When `follow_paralogs` is set, fans out across every
/// top segment in `next_child`'s paralogy cycle sharing that parent link
/// instead of returning only the canonical slot target.
fn step_down_all(
    alignment: &mut Alignment,
    current: &str,
    pos: u64,
    next_child: &str,
    follow_paralogs: bool,
) -> HalResult<Vec<(u64, bool)>> {
    let child_names: Vec<String> = alignment.phylogeny().children(current)?.to_vec();
    let slot = match child_names.iter().position(|n| n == next_child) {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };
    let (child_index, offset) = {
        let genome = alignment.genome_mut(current)?;
        let idx = genome.bottom_index_at(pos)?;
        let rec = genome.bottom_record(idx)?.clone();
        let slot_data = match rec.children.get(slot) {
            Some(c) if c.is_linked() => *c,
            _ => return Ok(Vec::new()),
        };
        let seg_start = genome.bottom_start(idx)?;
        (slot_data.child_index as usize, pos - seg_start)
    };

    let candidates = if follow_paralogs {
        paralogy_siblings(alignment.genome_mut(next_child)?, child_index)?
    } else {
        vec![child_index]
    };

    let mut out = Vec::with_capacity(candidates.len());
    for idx in candidates {
        let child = alignment.genome_mut(next_child)?;
        let reversed = child.top_record(idx)?.parent_reversed;
        let seg_start = child.top_start(idx)?;
        let next_pos = if reversed {
            let seg_end = child.top_end(idx)?;
            seg_end - 1 - offset
        } else {
            seg_start + offset
        };
        out.push((next_pos, reversed));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::SequenceDimensions;

    fn star_tree() -> Alignment {
        let mut aln = Alignment::new();
        aln.add_root_genome(
            "R",
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 4,
                top_segments: 0,
                bottom_segments: 1,
            }],
            true,
        )
        .unwrap();
        aln.add_child_genome(
            "R",
            "A",
            1.0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 4,
                top_segments: 1,
                bottom_segments: 0,
            }],
            true,
        )
        .unwrap();
        aln.add_child_genome(
            "R",
            "B",
            1.0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 4,
                top_segments: 1,
                bottom_segments: 0,
            }],
            true,
        )
        .unwrap();

        {
            let r = aln.genome_mut("R").unwrap();
            r.set_bottom_starts(&[0, 4]).unwrap();
            r.set_string("ACGT").unwrap();
            r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
            r.bottom_record_mut(0).unwrap().set_child(1, 0, false);
        }
        {
            let a = aln.genome_mut("A").unwrap();
            a.set_top_starts(&[0, 4]).unwrap();
            a.set_string("ACGT").unwrap();
            a.top_record_mut(0).unwrap().parent_index = 0;
        }
        {
            let b = aln.genome_mut("B").unwrap();
            b.set_top_starts(&[0, 4]).unwrap();
            b.set_string("ACGT").unwrap();
            b.top_record_mut(0).unwrap().parent_index = 0;
        }
        aln
    }

    #[test]
    fn maps_up_and_down_across_mrca() {
        let mut aln = star_tree();
        let mapper = SegmentMapper::new();
        let hits = mapper.map_position(&mut aln, "A", 1, "B").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_start, 1);
    }

    #[test]
    fn round_trip_to_self_is_identity() {
        let mut aln = star_tree();
        let mapper = SegmentMapper::new();
        let hits = mapper.map_position(&mut aln, "A", 2, "A").unwrap();
        assert_eq!(hits[0].target_start, 2);
        assert_eq!(hits[0].source_start, 2);
    }

    #[test]
    fn map_range_merges_contiguous_hits() {
        let mut aln = star_tree();
        let mapper = SegmentMapper::new();
        let hits = mapper.map_range(&mut aln, "A", 0, 4, "B").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!((hits[0].target_start, hits[0].target_end), (0, 4));
    }

    /// `R` has one bottom segment; `B` is a plain single-copy child, but `A`
    /// carries two top segments that both parent back onto that one bottom
    /// segment, linked into a paralogy cycle — a duplication in `A` relative
    /// to `R` that `B` never sees.
    fn tree_with_duplication_in_a() -> Alignment {
        let mut aln = Alignment::new();
        aln.add_root_genome(
            "R",
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 4,
                top_segments: 0,
                bottom_segments: 1,
            }],
            true,
        )
        .unwrap();
        aln.add_child_genome(
            "R",
            "A",
            1.0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 8,
                top_segments: 2,
                bottom_segments: 0,
            }],
            true,
        )
        .unwrap();
        aln.add_child_genome(
            "R",
            "B",
            1.0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 4,
                top_segments: 1,
                bottom_segments: 0,
            }],
            true,
        )
        .unwrap();

        {
            let r = aln.genome_mut("R").unwrap();
            r.set_bottom_starts(&[0, 4]).unwrap();
            r.set_string("ACGT").unwrap();
            r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
            r.bottom_record_mut(0).unwrap().set_child(1, 0, false);
        }
        {
            let a = aln.genome_mut("A").unwrap();
            a.set_top_starts(&[0, 4, 8]).unwrap();
            a.set_string("ACGTACGT").unwrap();
            a.top_record_mut(0).unwrap().parent_index = 0;
            a.top_record_mut(0).unwrap().next_paralogy_index = 1;
            a.top_record_mut(1).unwrap().parent_index = 0;
            a.top_record_mut(1).unwrap().next_paralogy_index = 0;
        }
        {
            let b = aln.genome_mut("B").unwrap();
            b.set_top_starts(&[0, 4]).unwrap();
            b.set_string("ACGT").unwrap();
            b.top_record_mut(0).unwrap().parent_index = 0;
        }
        aln
    }

    #[test]
    fn default_mapper_only_reaches_the_canonical_paralog() {
        let mut aln = tree_with_duplication_in_a();
        let mapper = SegmentMapper::new();
        let hits = mapper.map_position(&mut aln, "B", 1, "A").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target_start, 1);
    }

    #[test]
    fn follow_paralogs_fans_out_across_the_duplication_cycle() {
        let mut aln = tree_with_duplication_in_a();
        let mapper = SegmentMapper::new().with_follow_paralogs(true);
        let mut hits = mapper.map_position(&mut aln, "B", 1, "A").unwrap();
        hits.sort_by_key(|h| h.target_start);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].target_start, 1);
        assert_eq!(hits[1].target_start, 5);
    }

    #[test]
    fn coalescence_limit_above_mrca_still_requires_a_real_ancestor() {
        let mut aln = tree_with_duplication_in_a();
        let mapper = SegmentMapper::new()
            .with_coalescence_limit("B")
            .with_follow_paralogs(true);
        // "B" is never an ancestor of "A"; the up-walk runs out of parents
        // (hits the root) before reaching it, so the mapping is empty.
        let hits = mapper.map_position(&mut aln, "A", 1, "B").unwrap();
        assert!(hits.is_empty());
    }
}
