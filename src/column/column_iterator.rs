//! Left-to-right multi-genome column walk.
//!
//! Walks a reference genome position by position and materializes, for each
//! position, the set of homologous bases across the whole tree by recursing
//! through parent, child, and paralogy edges. A persistent per-genome visit
//! cache guarantees each non-reference position lands in at most one column;
//! reference positions reached through a duplication branch are cached too,
//! so the main walk skips them instead of emitting the same column twice.
//!
//! Each column is rebuilt from the segment arrays on every step. Short
//! insertions and deletions that have no position of their own on the
//! reference are queued as extra frames on an indel stack, bounded by
//! `max_insert_length`.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::instrument;

use crate::alignment::Alignment;
use crate::error::{HalError, HalResult};
use crate::iter::DnaIterator;

/// Behavior flags for a [`ColumnIterator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnIteratorFlags {
    /// Suppress paralogy (duplication) traversal.
    pub no_dupes: bool,
    /// Filter out genomes with children (ancestral genomes) from columns.
    pub no_ancestors: bool,
    /// Walk the reference from high to low coordinate.
    pub reverse_strand: bool,
    /// Also dedup the reference genome against the visit cache.
    pub unique: bool,
    /// Restrict paralogy traversal to downward recursions only.
    pub only_orthologs: bool,
}

impl ColumnIteratorFlags {
    /// All flags off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress paralogy traversal.
    pub fn with_no_dupes(mut self, v: bool) -> Self {
        self.no_dupes = v;
        self
    }

    /// Filter ancestral genomes out of columns.
    pub fn with_no_ancestors(mut self, v: bool) -> Self {
        self.no_ancestors = v;
        self
    }

    /// Walk the reference in decreasing coordinate order.
    pub fn with_reverse_strand(mut self, v: bool) -> Self {
        self.reverse_strand = v;
        self
    }

    /// Dedup the reference genome too.
    pub fn with_unique(mut self, v: bool) -> Self {
        self.unique = v;
        self
    }

    /// Only follow paralogy cycles on downward recursions.
    pub fn with_only_orthologs(mut self, v: bool) -> Self {
        self.only_orthologs = v;
        self
    }
}

/// One alignment column: for each visited `"genome:sequence"` key, the DNA
/// cursors homologous to the reference position.
pub type Column = BTreeMap<String, Vec<DnaIterator>>;

/// One node of the per-column gene tree: a single base, labelled
/// `<genome>.<sequence>|<sequence-relative position>`, with the bases that
/// descend from it as children.
#[derive(Debug, Clone)]
pub struct ColumnTree {
    /// `<genome>.<sequence>|<position>` label for this base.
    pub label: String,
    /// Strand-aware cursor over the base itself.
    pub dna: DnaIterator,
    /// Genome name this node's base belongs to.
    pub genome: String,
    /// Child nodes (one per child-genome copy, plus one per non-canonical
    /// paralog hanging off the same parent segment).
    pub children: Vec<ColumnTree>,
}

impl ColumnTree {
    /// Number of nodes in the tree, including this one.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(ColumnTree::size).sum::<usize>()
    }

    /// Depth-first iteration over all node labels.
    pub fn labels(&self) -> Vec<&str> {
        let mut out = vec![self.label.as_str()];
        for child in &self.children {
            out.extend(child.labels());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Root,
    Up,
    Down,
}

/// Walks a reference genome left-to-right, emitting one [`Column`] per
/// position.
#[derive(Debug)]
pub struct ColumnIterator {
    reference: String,
    flags: ColumnIteratorFlags,
    pos: i64,
    start: u64,
    end: u64,
    reversed: bool,
    last_column: bool,
    max_insert_length: u64,
    targets: Option<HashSet<String>>,
    indel_stack: Vec<Column>,
    visited: HashMap<String, HashSet<u64>>,
    leftmost_ref_pos: Option<u64>,
    current_ref_pos: Option<u64>,
    tree_cache: Option<ColumnTree>,
}

impl ColumnIterator {
    /// A column iterator over `[start, end)` of `reference`.
    ///
    /// `max_insert_length` bounds the indel-stack mechanism: an unmapped run
    /// on the far side of a breakpoint no longer than this is queued as one
    /// extra frame rather than being silently absent from every column it
    /// would otherwise touch. Pass `0` to disable indel-stack frames
    /// entirely. `targets`, if `Some`, restricts which non-reference genomes
    /// contribute bases to a column (the reference always does); genomes
    /// outside the set are still traversed to reach genomes that are in it.
    pub fn new(
        reference: impl Into<String>,
        start: u64,
        end: u64,
        max_insert_length: u64,
        targets: Option<HashSet<String>>,
        flags: ColumnIteratorFlags,
    ) -> Self {
        let reversed = flags.reverse_strand;
        let pos = if reversed { end as i64 - 1 } else { start as i64 };
        Self {
            reference: reference.into(),
            flags,
            pos,
            start,
            end,
            reversed,
            last_column: false,
            max_insert_length,
            targets,
            indel_stack: Vec::new(),
            visited: HashMap::new(),
            leftmost_ref_pos: None,
            current_ref_pos: None,
            tree_cache: None,
        }
    }

    /// Whether the last `to_right` call consumed the final column. A single
    /// out-of-range advance is permitted for loop termination and sets this
    /// without error.
    pub fn last_column(&self) -> bool {
        self.last_column
    }

    /// Smallest reference position contributing to the current column, or
    /// `None` before the first column.
    pub fn leftmost_ref_pos(&self) -> Option<u64> {
        self.leftmost_ref_pos
    }

    /// True iff the smallest reference position written during the current
    /// column falls inside the iterator's configured `[start, end)` range.
    /// A column first encountered through a duplication branch reports its
    /// leftmost copy, so clients iterating disjoint ranges emit each column
    /// from exactly one canonical reference coordinate.
    pub fn is_canonical_on_ref(&self) -> bool {
        self.leftmost_ref_pos
            .is_some_and(|p| p >= self.start && p < self.end)
    }

    /// Materialize the column at the current position and advance. Queued
    /// indel-stack frames drain before the reference walk resumes or ends.
    #[instrument(skip(self, alignment))]
    pub fn to_right(&mut self, alignment: &mut Alignment) -> HalResult<Option<Column>> {
        self.tree_cache = None;
        if let Some(frame) = self.indel_stack.pop() {
            self.current_ref_pos = None;
            return Ok(Some(frame));
        }
        if self.last_column {
            return Ok(None);
        }

        // Skip positions already emitted through a duplication branch of an
        // earlier column.
        loop {
            if self.pos < 0 || self.pos as u64 >= self.end || (self.pos as u64) < self.start {
                self.last_column = true;
                return Ok(None);
            }
            let cached = self
                .visited
                .get(&self.reference)
                .is_some_and(|set| set.contains(&(self.pos as u64)));
            if !cached {
                break;
            }
            self.advance();
        }
        let pos = self.pos as u64;
        let ref_name = self.reference.clone();

        let mut column = Column::new();
        let mut builder = ColumnBuilder {
            alignment,
            reference: &ref_name,
            flags: &self.flags,
            targets: &self.targets,
            visited: &mut self.visited,
            cache_reference: self.flags.unique || self.max_insert_length > 0,
            leftmost_ref_pos: None,
        };
        builder.visit(&ref_name, pos, None, Direction::Root, &mut column, true)?;
        self.leftmost_ref_pos = builder.leftmost_ref_pos;
        self.current_ref_pos = Some(pos);

        if self.max_insert_length > 0 {
            self.collect_insertion_frames(alignment, pos)?;
            self.collect_deletion_frames(alignment, pos)?;
        }

        self.advance();
        if self.pos < 0 || self.pos as u64 >= self.end {
            self.last_column = true;
        }
        Ok(Some(column))
    }

    fn advance(&mut self) {
        if self.reversed {
            self.pos -= 1;
        } else {
            self.pos += 1;
        }
    }

    /// Gene tree of the current column: one leaf or internal node per base,
    /// rooted at the root-most segment containing the column. Cached until
    /// the next `to_right` call.
    ///
    /// Unavailable when `no_dupes` or `only_orthologs` is set (the tree walk
    /// always follows the full duplication structure), or when the current
    /// frame is an indel-stack frame with no reference position.
    pub fn get_tree(&mut self, alignment: &mut Alignment) -> HalResult<&ColumnTree> {
        if self.flags.no_dupes || self.flags.only_orthologs {
            return Err(HalError::Unsupported(
                "column tree requires full duplication traversal".to_string(),
            ));
        }
        let pos = self.current_ref_pos.ok_or_else(|| {
            HalError::Unsupported("no reference column is current".to_string())
        })?;
        if self.tree_cache.is_none() {
            self.tree_cache = Some(build_tree(alignment, &self.reference, pos)?);
        }
        Ok(self.tree_cache.as_ref().expect("built above"))
    }

    fn target_allows(&self, name: &str) -> bool {
        self.targets.as_ref().map_or(true, |t| t.contains(name))
    }

    /// When `pos` is the last base of its bottom segment, any child whose
    /// very next top segment is unmapped and no longer than
    /// `max_insert_length` gets that run queued as one child-side frame,
    /// since the reference (here the parent) has no position of its own to
    /// surface it at.
    fn collect_insertion_frames(&mut self, alignment: &mut Alignment, pos: u64) -> HalResult<()> {
        let ref_name = self.reference.clone();
        if !alignment.genome(&ref_name)?.has_bottom_array() {
            return Ok(());
        }
        let (bottom_idx, seg_end) = {
            let g = alignment.genome_mut(&ref_name)?;
            let idx = g.bottom_index_at(pos)?;
            let end = g.bottom_end(idx)?;
            (idx, end)
        };
        if pos + 1 != seg_end {
            return Ok(());
        }
        let child_names: Vec<String> = alignment.phylogeny().children(&ref_name)?.to_vec();
        let rec = alignment.genome_mut(&ref_name)?.bottom_record(bottom_idx)?.clone();
        for (slot, child_name) in child_names.iter().enumerate() {
            if !self.target_allows(child_name) {
                continue;
            }
            let Some(link) = rec.children.get(slot).copied().filter(|c| c.is_linked()) else {
                continue;
            };
            let child = alignment.genome_mut(child_name)?;
            if !child.has_top_array() {
                continue;
            }
            let next_idx = if link.child_reversed {
                link.child_index - 1
            } else {
                link.child_index + 1
            };
            if next_idx < 0 || next_idx as usize >= child.num_top_segments() {
                continue;
            }
            let next_idx = next_idx as usize;
            let next_rec = *child.top_record(next_idx)?;
            if next_rec.has_parent() {
                continue;
            }
            let len = child.top_length(next_idx)?;
            if len == 0 || len > self.max_insert_length {
                continue;
            }
            let seg_start = child.top_start(next_idx)?;
            let seq_name = child.sequences().locate(seg_start)?.name.clone();
            let key = format!("{child_name}:{seq_name}");
            let positions: Vec<u64> = (seg_start..seg_start + len).collect();
            let cache = self.visited.entry(child_name.clone()).or_default();
            if positions.iter().any(|p| cache.contains(p)) {
                continue;
            }
            cache.extend(positions.iter().copied());
            let cursors = positions.iter().map(|&p| DnaIterator::new(p, false)).collect();
            let mut frame = Column::new();
            frame.insert(key, cursors);
            self.indel_stack.push(frame);
        }
        Ok(())
    }

    /// Symmetric case when the reference is the child side: when `pos` is
    /// the last base of its top segment and the next top segment's parent
    /// counterpart leaves a gap on the same parent sequence no longer than
    /// `max_insert_length`, the skipped parent bases are queued as one
    /// parent-side frame.
    fn collect_deletion_frames(&mut self, alignment: &mut Alignment, pos: u64) -> HalResult<()> {
        let ref_name = self.reference.clone();
        if !alignment.genome(&ref_name)?.has_top_array() {
            return Ok(());
        }
        let parent_name = match alignment.phylogeny().parent(&ref_name)?.map(|s| s.to_string()) {
            Some(p) => p,
            None => return Ok(()),
        };
        if !self.target_allows(&parent_name) {
            return Ok(());
        }
        let (idx, seg_end, num_segs) = {
            let g = alignment.genome_mut(&ref_name)?;
            let idx = g.top_index_at(pos)?;
            let end = g.top_end(idx)?;
            (idx, end, g.num_top_segments())
        };
        if pos + 1 != seg_end {
            return Ok(());
        }
        let next_idx = idx + 1;
        if next_idx >= num_segs {
            return Ok(());
        }
        let rec = *alignment.genome_mut(&ref_name)?.top_record(idx)?;
        let next_rec = *alignment.genome_mut(&ref_name)?.top_record(next_idx)?;
        if !rec.has_parent() || !next_rec.has_parent() || rec.parent_reversed || next_rec.parent_reversed {
            return Ok(());
        }
        let (lo, hi) = (rec.parent_index, next_rec.parent_index);
        if hi <= lo + 1 {
            return Ok(());
        }
        let lo_seq = {
            let parent = alignment.genome_mut(&parent_name)?;
            parent.sequences().sequence_index_for_bottom(lo)?
        };
        let hi_seq = {
            let parent = alignment.genome_mut(&parent_name)?;
            parent.sequences().sequence_index_for_bottom(hi)?
        };
        if lo_seq != hi_seq {
            return Ok(());
        }
        let parent = alignment.genome_mut(&parent_name)?;
        let mut total_len = 0u64;
        for gap_idx in (lo + 1)..hi {
            total_len += parent.bottom_length(gap_idx as usize)?;
        }
        if total_len == 0 || total_len > self.max_insert_length {
            return Ok(());
        }
        let del_start = parent.bottom_start((lo + 1) as usize)?;
        let seq_name = parent.sequences().locate(del_start)?.name.clone();
        let key = format!("{parent_name}:{seq_name}");
        let positions: Vec<u64> = (del_start..del_start + total_len).collect();
        let cache = self.visited.entry(parent_name.clone()).or_default();
        if positions.iter().any(|p| cache.contains(p)) {
            return Ok(());
        }
        cache.extend(positions.iter().copied());
        let cursors = positions.iter().map(|&p| DnaIterator::new(p, false)).collect();
        let mut frame = Column::new();
        frame.insert(key, cursors);
        self.indel_stack.push(frame);
        Ok(())
    }
}

/// Per-column recursion state: the visit cache, dedup policy, and the
/// running leftmost reference position.
struct ColumnBuilder<'a> {
    alignment: &'a mut Alignment,
    reference: &'a str,
    flags: &'a ColumnIteratorFlags,
    targets: &'a Option<HashSet<String>>,
    visited: &'a mut HashMap<String, HashSet<u64>>,
    cache_reference: bool,
    leftmost_ref_pos: Option<u64>,
}

impl ColumnBuilder<'_> {
    fn visit(
        &mut self,
        genome: &str,
        pos: u64,
        came_from: Option<&str>,
        direction: Direction,
        out: &mut Column,
        is_reference: bool,
    ) -> HalResult<()> {
        let should_cache = !is_reference || self.cache_reference;
        if should_cache {
            let set = self.visited.entry(genome.to_string()).or_default();
            if !set.insert(pos) && !is_reference {
                return Ok(());
            }
        }

        if genome == self.reference {
            self.leftmost_ref_pos = Some(match self.leftmost_ref_pos {
                Some(cur) => cur.min(pos),
                None => pos,
            });
        }

        let num_children = self.alignment.genome(genome)?.num_children();
        let is_target =
            is_reference || self.targets.as_ref().map_or(true, |t| t.contains(genome));
        let include_dna = !(self.flags.no_ancestors && num_children > 0) && is_target;
        if include_dna {
            let seq_name = self
                .alignment
                .genome_mut(genome)?
                .sequences()
                .locate(pos)?
                .name
                .clone();
            let key = format!("{genome}:{seq_name}");
            let reversed_read = is_reference && self.flags.reverse_strand;
            out.entry(key)
                .or_default()
                .push(DnaIterator::new(pos, reversed_read));
        }

        // Up: to the parent genome, honoring no_dupes/canonical-paralog
        // gating.
        if let Some(parent_name) = self
            .alignment
            .phylogeny()
            .parent(genome)?
            .map(|s| s.to_string())
        {
            if came_from != Some(parent_name.as_str())
                && self.alignment.genome(genome)?.has_top_array()
            {
                let (idx, rec, seg_start) = {
                    let g = self.alignment.genome_mut(genome)?;
                    let idx = g.top_index_at(pos)?;
                    let rec = *g.top_record(idx)?;
                    let seg_start = g.top_start(idx)?;
                    (idx, rec, seg_start)
                };
                let canonical = self.is_canonical_paralog(genome, idx)?;
                if rec.has_parent() && (!self.flags.no_dupes || canonical) {
                    let offset = pos - seg_start;
                    let parent_pos = {
                        let parent = self.alignment.genome_mut(&parent_name)?;
                        let pstart = parent.bottom_start(rec.parent_index as usize)?;
                        if rec.parent_reversed {
                            let pend = parent.bottom_end(rec.parent_index as usize)?;
                            pend - 1 - offset
                        } else {
                            pstart + offset
                        }
                    };
                    self.visit(&parent_name, parent_pos, Some(genome), Direction::Up, out, false)?;
                }
            }
        }

        // Down: to each child genome via the bottom segment's child slots.
        if self.alignment.genome(genome)?.has_bottom_array() {
            let child_names: Vec<String> =
                self.alignment.phylogeny().children(genome)?.to_vec();
            for (slot, child_name) in child_names.iter().enumerate() {
                if came_from == Some(child_name.as_str()) {
                    continue;
                }
                let hit = {
                    let g = self.alignment.genome_mut(genome)?;
                    let idx = g.bottom_index_at(pos)?;
                    let rec = g.bottom_record(idx)?.clone();
                    let seg_start = g.bottom_start(idx)?;
                    rec.children
                        .get(slot)
                        .copied()
                        .filter(|c| c.is_linked())
                        .map(|c| (c.child_index as usize, c.child_reversed, pos - seg_start))
                };
                if let Some((child_index, child_reversed, offset)) = hit {
                    let child_pos = {
                        let child = self.alignment.genome_mut(child_name)?;
                        let cstart = child.top_start(child_index)?;
                        if child_reversed {
                            let cend = child.top_end(child_index)?;
                            cend - 1 - offset
                        } else {
                            cstart + offset
                        }
                    };
                    self.visit(child_name, child_pos, Some(genome), Direction::Down, out, false)?;
                }
            }
        }

        // Paralogy: walk the cycle of top segments sharing this genome's
        // parent bottom segment. Terminates on the seen-index check against
        // the starting array index; no cycle-breaking state is written.
        if !self.flags.no_dupes
            && (!self.flags.only_orthologs || direction != Direction::Up)
            && self.alignment.genome(genome)?.has_top_array()
        {
            let start_idx = self.alignment.genome_mut(genome)?.top_index_at(pos)?;
            let start_rec = *self.alignment.genome_mut(genome)?.top_record(start_idx)?;
            if start_rec.has_paralogy() {
                let start_seg_start = self.alignment.genome_mut(genome)?.top_start(start_idx)?;
                let offset_in_seg = pos - start_seg_start;
                let mut idx = start_rec.next_paralogy_index as usize;
                while idx != start_idx {
                    let (seg_start, seg_end, next) = {
                        let g = self.alignment.genome_mut(genome)?;
                        let s = g.top_start(idx)?;
                        let e = g.top_end(idx)?;
                        let n = g.top_record(idx)?.next_paralogy_index;
                        (s, e, n)
                    };
                    if seg_start + offset_in_seg < seg_end {
                        self.visit(
                            genome,
                            seg_start + offset_in_seg,
                            None,
                            Direction::Down,
                            out,
                            false,
                        )?;
                    }
                    if next < 0 {
                        break;
                    }
                    idx = next as usize;
                }
            }
        }

        Ok(())
    }

    fn is_canonical_paralog(&mut self, genome: &str, idx: usize) -> HalResult<bool> {
        let rec = *self.alignment.genome_mut(genome)?.top_record(idx)?;
        if !rec.has_parent() {
            return Ok(true);
        }
        let parent_name = match self.alignment.phylogeny().parent(genome)?.map(|s| s.to_string()) {
            Some(p) => p,
            None => return Ok(true),
        };
        let child_names: Vec<String> = self.alignment.phylogeny().children(&parent_name)?.to_vec();
        let slot = match child_names.iter().position(|n| n == genome) {
            Some(s) => s,
            None => return Ok(true),
        };
        let parent_rec = self
            .alignment
            .genome_mut(&parent_name)?
            .bottom_record(rec.parent_index as usize)?
            .clone();
        Ok(parent_rec
            .children
            .get(slot)
            .map(|c| c.child_index as usize == idx)
            .unwrap_or(true))
    }
}

/// One labelled single-base node.
fn tree_node(
    alignment: &mut Alignment,
    genome: &str,
    pos: u64,
    reversed: bool,
) -> HalResult<ColumnTree> {
    let seq = alignment.genome_mut(genome)?.sequences().locate(pos)?.clone();
    let rel = seq.to_relative(pos)?;
    Ok(ColumnTree {
        label: format!("{genome}.{}|{rel}", seq.name),
        dna: DnaIterator::new(pos, reversed),
        genome: genome.to_string(),
        children: Vec::new(),
    })
}

/// Attach one child node per child-genome copy of the bottom segment
/// containing `pos`, plus one node per non-canonical paralog, recursing
/// into each child's own bottom array.
fn build_tree_down(
    alignment: &mut Alignment,
    genome: &str,
    pos: u64,
    reversed: bool,
    node: &mut ColumnTree,
) -> HalResult<()> {
    if !alignment.genome(genome)?.has_bottom_array() {
        return Ok(());
    }
    let child_names: Vec<String> = alignment.phylogeny().children(genome)?.to_vec();
    let (rec, seg_start) = {
        let g = alignment.genome_mut(genome)?;
        let idx = g.bottom_index_at(pos)?;
        (g.bottom_record(idx)?.clone(), g.bottom_start(idx)?)
    };
    let offset = pos - seg_start;

    for (slot, child_name) in child_names.iter().enumerate() {
        let Some(link) = rec.children.get(slot).copied().filter(|c| c.is_linked()) else {
            continue;
        };
        let canonical_idx = link.child_index as usize;
        let mut idx = canonical_idx;
        loop {
            let (child_pos, child_rev) = {
                let child = alignment.genome_mut(child_name)?;
                let crec = *child.top_record(idx)?;
                let cstart = child.top_start(idx)?;
                let cend = child.top_end(idx)?;
                let rev = reversed ^ crec.parent_reversed;
                let p = if crec.parent_reversed {
                    cend - 1 - offset
                } else {
                    cstart + offset
                };
                (p, rev)
            };
            let mut child_node = tree_node(alignment, child_name, child_pos, child_rev)?;
            build_tree_down(alignment, child_name, child_pos, child_rev, &mut child_node)?;
            node.children.push(child_node);

            let next = alignment
                .genome_mut(child_name)?
                .top_record(idx)?
                .next_paralogy_index;
            if next < 0 || next as usize == canonical_idx {
                break;
            }
            idx = next as usize;
        }
    }
    Ok(())
}

/// Gene tree of the column containing reference position `pos`: walk up
/// the parent chain to the root-most segment, then recurse down through
/// every child copy and paralogy cycle.
fn build_tree(alignment: &mut Alignment, reference: &str, pos: u64) -> HalResult<ColumnTree> {
    let mut genome = reference.to_string();
    let mut cur = pos;
    let mut reversed = false;
    loop {
        if !alignment.genome(&genome)?.has_top_array() {
            break;
        }
        let (rec, seg_start) = {
            let g = alignment.genome_mut(&genome)?;
            let idx = g.top_index_at(cur)?;
            (*g.top_record(idx)?, g.top_start(idx)?)
        };
        if !rec.has_parent() {
            break;
        }
        let parent_name = match alignment.phylogeny().parent(&genome)? {
            Some(p) => p.to_string(),
            None => break,
        };
        let offset = cur - seg_start;
        cur = {
            let parent = alignment.genome_mut(&parent_name)?;
            let pstart = parent.bottom_start(rec.parent_index as usize)?;
            if rec.parent_reversed {
                let pend = parent.bottom_end(rec.parent_index as usize)?;
                pend - 1 - offset
            } else {
                pstart + offset
            }
        };
        reversed ^= rec.parent_reversed;
        genome = parent_name;
    }

    let mut root = tree_node(alignment, &genome, cur, reversed)?;
    build_tree_down(alignment, &genome, cur, reversed, &mut root)?;
    Ok(root)
}
