//! Fixed-schema segment array elements.
//!
//! A genome's top and bottom arrays are each stored as two parallel pieces:
//! a coordinate array of `|segments| + 1` start offsets (element `k` is
//! segment `k`'s left endpoint; the last element is the sentinel `L`), and a
//! record array of `|segments|` link records carrying the parent/child/
//! parse/paralogy pointers. Coordinates stay out of the record struct,
//! since they are wholly derived from the coordinate array.

/// Signed sentinel meaning "no link".
pub const NULL_INDEX: i64 = -1;

/// One slot in a bottom segment's per-child pointer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChildSlot {
    /// Index into the child genome's top array, or [`NULL_INDEX`].
    pub child_index: i64,
    /// Whether the link is reversed relative to the parent's orientation.
    pub child_reversed: bool,
}

impl ChildSlot {
    /// An empty (unlinked) child slot.
    pub const fn empty() -> Self {
        Self {
            child_index: NULL_INDEX,
            child_reversed: false,
        }
    }

    /// Whether this slot currently links to a child segment.
    pub fn is_linked(&self) -> bool {
        self.child_index != NULL_INDEX
    }
}

/// Child-side record: back-pointer to the parent bottom segment plus the
/// same-genome parse bridge and paralogy cycle link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopSegmentRecord {
    /// Index into the parent genome's bottom array, or [`NULL_INDEX`] for an
    /// unmapped (inserted) segment.
    pub parent_index: i64,
    /// Whether the parent link is strand-reversed.
    pub parent_reversed: bool,
    /// Index into this genome's bottom array sharing this segment's start
    /// position (the "parse" bridge).
    pub bottom_parse_index: i64,
    /// Next member of the paralogy cycle sharing this segment's parent, or
    /// [`NULL_INDEX`] if this segment has no parent / paralogs.
    pub next_paralogy_index: i64,
}

impl Default for TopSegmentRecord {
    fn default() -> Self {
        Self {
            parent_index: NULL_INDEX,
            parent_reversed: false,
            bottom_parse_index: NULL_INDEX,
            next_paralogy_index: NULL_INDEX,
        }
    }
}

impl TopSegmentRecord {
    /// Whether this segment has a parent bottom segment.
    pub fn has_parent(&self) -> bool {
        self.parent_index != NULL_INDEX
    }

    /// Whether this segment participates in a (possibly trivial) paralogy
    /// cycle.
    pub fn has_paralogy(&self) -> bool {
        self.next_paralogy_index != NULL_INDEX
    }
}

/// Parent-side record: one forward pointer per child slot plus the
/// same-genome parse bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottomSegmentRecord {
    /// Per-child-genome link slots, indexed in the genome's fixed child
    /// order.
    pub children: Vec<ChildSlot>,
    /// Index into this genome's top array sharing this segment's start
    /// position.
    pub top_parse_index: i64,
}

impl BottomSegmentRecord {
    /// Construct a record with `num_children` unlinked slots.
    pub fn new(num_children: usize) -> Self {
        Self {
            children: vec![ChildSlot::empty(); num_children],
            top_parse_index: NULL_INDEX,
        }
    }

    /// Link to child segment `top_index` in slot `slot`.
    pub fn set_child(&mut self, slot: usize, top_index: i64, reversed: bool) {
        self.children[slot] = ChildSlot {
            child_index: top_index,
            child_reversed: reversed,
        };
    }
}

impl Default for BottomSegmentRecord {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_top_segment_has_no_links() {
        let t = TopSegmentRecord::default();
        assert!(!t.has_parent());
        assert!(!t.has_paralogy());
    }

    #[test]
    fn bottom_segment_child_slot_round_trips() {
        let mut b = BottomSegmentRecord::new(2);
        b.set_child(1, 7, true);
        assert!(b.children[1].is_linked());
        assert_eq!(b.children[1].child_index, 7);
        assert!(b.children[1].child_reversed);
        assert!(!b.children[0].is_linked());
    }
}
