//! End-to-end scenarios against the public API, covering the concrete
//! examples and testable invariants.

use hal_core::genome::SequenceDimensions;
use hal_core::iter::SegmentIterator;
use hal_core::{validate_alignment, Alignment, ColumnIteratorFlags, SegmentMapper};

fn seq(name: &str, len: u64, top: usize, bottom: usize) -> SequenceDimensions {
    SequenceDimensions {
        name: name.to_string(),
        length: len,
        top_segments: top,
        bottom_segments: bottom,
    }
}

/// Root R ("ACGT") with one bottom segment [0,4) mapped straight onto
/// leaf L's one top segment [0,4).
fn minimal_round_trip() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
    aln.add_child_genome("R", "L", 1.0, &[seq("s", 4, 1, 0)], true)
        .unwrap();

    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4]).unwrap();
        r.set_string("ACGT").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
    }
    {
        let l = aln.genome_mut("L").unwrap();
        l.set_top_starts(&[0, 4]).unwrap();
        l.set_string("ACGT").unwrap();
        l.top_record_mut(0).unwrap().parent_index = 0;
    }
    aln
}

// S1: minimal round trip emits 4 columns, each with exactly two identical
// bases.
#[test]
fn s1_minimal_round_trip() {
    let mut aln = minimal_round_trip();
    let mut it = hal_core::ColumnIterator::new("L", 0, 4, 0, None, ColumnIteratorFlags::new());

    let mut columns = Vec::new();
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        columns.push(col);
    }
    assert_eq!(columns.len(), 4);

    let expected = ['A', 'C', 'G', 'T'];
    for (i, col) in columns.iter().enumerate() {
        // Two genomes contribute to this position: R and L.
        assert_eq!(col.len(), 2, "column {i} should have R and L entries");
        let mut seen = Vec::new();
        for (key, iters) in col {
            let genome_name = key.split(':').next().unwrap();
            for dna in iters {
                let base = dna.get_base(aln.genome_mut(genome_name).unwrap()).unwrap();
                seen.push(base);
            }
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0] as char, expected[i]);
    }
}

// S2: reverse-complement link; L[0] pairs with R's complement at position 3
// and vice versa.
#[test]
fn s2_reverse_complement_link() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
    aln.add_child_genome("R", "L", 1.0, &[seq("s", 4, 1, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4]).unwrap();
        r.set_string("ACGT").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, true);
    }
    {
        let l = aln.genome_mut("L").unwrap();
        l.set_top_starts(&[0, 4]).unwrap();
        l.set_string("ACGT").unwrap();
        let rec = l.top_record_mut(0).unwrap();
        rec.parent_index = 0;
        rec.parent_reversed = true;
    }

    let mut it = hal_core::ColumnIterator::new("L", 0, 4, 0, None, ColumnIteratorFlags::new());
    let col0 = it.to_right(&mut aln).unwrap().unwrap();
    let r_key = col0.keys().find(|k| k.starts_with("R:")).unwrap().clone();
    let l_key = col0.keys().find(|k| k.starts_with("L:")).unwrap().clone();
    let r_base = col0[&r_key][0].get_base(aln.genome_mut("R").unwrap()).unwrap();
    let l_base = col0[&l_key][0].get_base(aln.genome_mut("L").unwrap()).unwrap();
    assert_eq!(l_base as char, 'A');
    assert_eq!(r_base as char, 'T');
}

// S3: tandem duplication; two child top segments share one parent bottom
// segment and form a paralogy cycle.
fn tandem_duplication() -> Alignment {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
    aln.add_child_genome("R", "C", 1.0, &[seq("s", 8, 2, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4]).unwrap();
        r.set_string("ACGT").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
    }
    {
        let c = aln.genome_mut("C").unwrap();
        c.set_top_starts(&[0, 4, 8]).unwrap();
        c.set_string("ACGTACGT").unwrap();
        c.top_record_mut(0).unwrap().parent_index = 0;
        c.top_record_mut(0).unwrap().next_paralogy_index = 1;
        c.top_record_mut(1).unwrap().parent_index = 0;
        c.top_record_mut(1).unwrap().next_paralogy_index = 0;
    }
    aln
}

#[test]
fn s3_tandem_duplication_with_dupes() {
    let mut aln = tandem_duplication();
    let mut it = hal_core::ColumnIterator::new("C", 0, 4, 0, None, ColumnIteratorFlags::new());
    let mut count = 0;
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        let total: usize = col.values().map(|v| v.len()).sum();
        assert_eq!(total, 3, "two child bases plus one parent base");
        count += 1;
    }
    assert_eq!(count, 4);
}

#[test]
fn s3_tandem_duplication_no_dupes() {
    let mut aln = tandem_duplication();
    let flags = ColumnIteratorFlags::new().with_no_dupes(true);
    let mut it = hal_core::ColumnIterator::new("C", 0, 4, 0, None, flags);
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        let total: usize = col.values().map(|v| v.len()).sum();
        assert_eq!(total, 2, "only the canonical paralog plus parent");
    }
}

// S3 over the whole duplicated child: the second copy's positions were all
// reached through the paralogy cycle of the first copy's columns, so only 4
// columns come out and no (sequence, position) pair repeats.
#[test]
fn s3_full_child_range_emits_each_column_once() {
    let mut aln = tandem_duplication();
    let mut it = hal_core::ColumnIterator::new("C", 0, 8, 0, None, ColumnIteratorFlags::new());
    let mut seen = std::collections::HashSet::new();
    let mut count = 0;
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        for (key, iters) in &col {
            for dna in iters {
                assert!(
                    seen.insert((key.clone(), dna.position())),
                    "position {} of {key} emitted twice",
                    dna.position()
                );
            }
        }
        count += 1;
    }
    assert_eq!(count, 4);
}

// The per-column gene tree of the duplication: rooted at the parent base,
// with one child node per paralog.
#[test]
fn s3_column_tree_roots_at_parent_with_one_leaf_per_paralog() {
    let mut aln = tandem_duplication();
    let mut it = hal_core::ColumnIterator::new("C", 0, 4, 0, None, ColumnIteratorFlags::new());
    it.to_right(&mut aln).unwrap().unwrap();
    let tree = it.get_tree(&mut aln).unwrap().clone();
    assert_eq!(tree.label, "R.s|0");
    assert_eq!(tree.size(), 3);
    let labels = tree.labels();
    assert!(labels.contains(&"C.s|0"));
    assert!(labels.contains(&"C.s|4"));
}

// S4: an inserted interval has no parent link; columns over it still
// surface the child-only bases.
#[test]
fn s4_insertion_has_no_parent_side() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 8, 0, 2)], true).unwrap();
    aln.add_child_genome("R", "C", 1.0, &[seq("s", 11, 3, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4, 8]).unwrap();
        r.set_string("ACGTCGTA").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
        r.bottom_record_mut(1).unwrap().set_child(0, 2, false);
    }
    {
        let c = aln.genome_mut("C").unwrap();
        c.set_top_starts(&[0, 4, 7, 11]).unwrap();
        c.set_string("ACGTAAACGTA").unwrap();
        c.top_record_mut(0).unwrap().parent_index = 0;
        // segment 1 (positions 4..7) is the inserted run: no parent link.
        c.top_record_mut(2).unwrap().parent_index = 1;
    }

    let mut it = hal_core::ColumnIterator::new("C", 0, 11, 0, None, ColumnIteratorFlags::new());
    let mut parent_counts = Vec::new();
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        let has_parent = col.keys().any(|k| k.starts_with("R:"));
        parent_counts.push(has_parent);
    }
    assert_eq!(parent_counts.len(), 11);
    for i in 0..4 {
        assert!(parent_counts[i], "position {i} should map to R");
    }
    for i in 4..7 {
        assert!(!parent_counts[i], "inserted position {i} has no parent base");
    }
    for i in 7..11 {
        assert!(parent_counts[i], "position {i} should map to R");
    }
}

// S4 with the parent as reference: the 3-base inserted run has no position
// of its own in R, so with maxInsertLength=3 it surfaces as one extra frame
// emitted between parent positions 3 and 4.
#[test]
fn s4_insertion_frame_appears_between_flanking_parent_columns() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 8, 0, 2)], true).unwrap();
    aln.add_child_genome("R", "C", 1.0, &[seq("s", 11, 3, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4, 8]).unwrap();
        r.set_string("ACGTCGTA").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
        r.bottom_record_mut(1).unwrap().set_child(0, 2, false);
    }
    {
        let c = aln.genome_mut("C").unwrap();
        c.set_top_starts(&[0, 4, 7, 11]).unwrap();
        c.set_string("ACGTAAACGTA").unwrap();
        c.top_record_mut(0).unwrap().parent_index = 0;
        // segment 1 (positions 4..7) is the inserted run: no parent link.
        c.top_record_mut(2).unwrap().parent_index = 1;
    }

    let mut it = hal_core::ColumnIterator::new("R", 0, 8, 3, None, ColumnIteratorFlags::new());
    let mut columns = Vec::new();
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        columns.push(col);
    }
    assert_eq!(columns.len(), 9, "8 reference columns plus one indel frame");
    let frame = &columns[4];
    assert_eq!(frame.len(), 1, "the frame holds only the inserted child run");
    let cursors = &frame["C:s"];
    assert_eq!(cursors.len(), 3);
    assert_eq!(cursors[0].position(), 4);
    assert_eq!(cursors[2].position(), 6);
}

// S5: the child skips the parent's middle bottom segment entirely,
// producing a deletion; iterating the parent over that range shows no
// child contribution for any position in the deleted segment.
#[test]
fn s5_deletion_leaves_parent_only_columns() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 11, 0, 3)], true)
        .unwrap();
    aln.add_child_genome("R", "C", 1.0, &[seq("s", 8, 2, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4, 7, 11]).unwrap();
        r.set_string("ACGTAAACGTA").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
        // bottom segment 1 (positions 4..7) is never linked: deleted in C.
        r.bottom_record_mut(2).unwrap().set_child(0, 1, false);
    }
    {
        let c = aln.genome_mut("C").unwrap();
        c.set_top_starts(&[0, 4, 8]).unwrap();
        c.set_string("ACGTCGTA").unwrap();
        c.top_record_mut(0).unwrap().parent_index = 0;
        c.top_record_mut(1).unwrap().parent_index = 2;
    }

    let mut it = hal_core::ColumnIterator::new("R", 0, 11, 0, None, ColumnIteratorFlags::new());
    let mut child_present = Vec::new();
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        child_present.push(col.keys().any(|k| k.starts_with("C:")));
    }
    assert_eq!(child_present.len(), 11);
    for i in 4..7 {
        assert!(!child_present[i], "deleted range position {i} has no child base");
    }
    for i in 0..4 {
        assert!(child_present[i]);
    }
    for i in 7..11 {
        assert!(child_present[i]);
    }
}

// S5 with the child as reference: the deleted parent range [4,7) has no
// child position to appear at, so with maxInsertLength>=3 it surfaces as a
// parent-only frame on the indel stack.
#[test]
fn s5_deletion_frame_carries_parent_bases_only() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 11, 0, 3)], true).unwrap();
    aln.add_child_genome("R", "C", 1.0, &[seq("s", 8, 2, 0)], true)
        .unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_bottom_starts(&[0, 4, 7, 11]).unwrap();
        r.set_string("ACGTAAACGTA").unwrap();
        r.bottom_record_mut(0).unwrap().set_child(0, 0, false);
        // bottom segment 1 (positions 4..7) is never linked: deleted in C.
        r.bottom_record_mut(2).unwrap().set_child(0, 1, false);
    }
    {
        let c = aln.genome_mut("C").unwrap();
        c.set_top_starts(&[0, 4, 8]).unwrap();
        c.set_string("ACGTCGTA").unwrap();
        c.top_record_mut(0).unwrap().parent_index = 0;
        c.top_record_mut(1).unwrap().parent_index = 2;
    }

    let mut it = hal_core::ColumnIterator::new("C", 0, 8, 3, None, ColumnIteratorFlags::new());
    let mut columns = Vec::new();
    while let Some(col) = it.to_right(&mut aln).unwrap() {
        columns.push(col);
    }
    assert_eq!(columns.len(), 9, "8 reference columns plus one deletion frame");
    let frame = &columns[4];
    assert_eq!(frame.len(), 1);
    let cursors = &frame["R:s"];
    assert_eq!(cursors.len(), 3);
    assert_eq!(cursors[0].position(), 4);
    assert_eq!(cursors[2].position(), 6);
}

// S6: mapping a base from A to B across their MRCA R, and back to A.
#[test]
fn s6_mapping_up_across_down_and_back() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
    aln.add_child_genome("R", "A", 1.0, &[seq("s", 4, 1, 0)], true)
        .unwrap();
    aln.add_child_genome("R", "B", 1.0, &[seq("s", 4, 1, 0)], true)
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

    let mapper = SegmentMapper::new();
    let to_b = mapper.map_position(&mut aln, "A", 2, "B").unwrap();
    assert_eq!(to_b.len(), 1);
    assert_eq!(to_b[0].target_start, 2);

    let back = mapper
        .map_position(&mut aln, "B", to_b[0].target_start, "A")
        .unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].target_start, 2);
}

// Every fixture in this file satisfies the structural checks: segment
// coverage, edge symmetry, and paralogy cycle closure.
#[test]
fn scenario_fixtures_validate() {
    let mut aln = minimal_round_trip();
    assert!(validate_alignment(&mut aln).is_ok());
    let mut dup = tandem_duplication();
    assert!(validate_alignment(&mut dup).is_ok());
}

// Invariant 5 (DNA round-trip) and invariant 6 (reverse idempotence),
// exercised through the public API.
#[test]
fn dna_round_trip_and_reverse_idempotence() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 6, 0, 1)], true).unwrap();
    {
        let r = aln.genome_mut("R").unwrap();
        r.set_string("ACGTNA").unwrap();
        assert_eq!(r.get_string().unwrap(), "ACGTNA");
        r.set_bottom_starts(&[0, 6]).unwrap();
    }

    let mut iter = hal_core::BottomSegmentIterator::new(0);
    let genome = aln.genome_mut("R").unwrap();
    let before = (iter.start(genome).unwrap(), iter.end(genome).unwrap(), iter.is_reversed());
    iter.to_reverse_in_place();
    iter.to_reverse_in_place();
    let genome = aln.genome_mut("R").unwrap();
    let after = (iter.start(genome).unwrap(), iter.end(genome).unwrap(), iter.is_reversed());
    assert_eq!(before, after);
}

// Invariant 8 (mapped-segment disjointness): map_range over a contiguous
// region yields a target-disjoint, fully-covering result.
#[test]
fn mapped_segments_are_target_disjoint() {
    let mut aln = Alignment::new();
    aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
    aln.add_child_genome("R", "A", 1.0, &[seq("s", 4, 1, 0)], true)
        .unwrap();
    aln.add_child_genome("R", "B", 1.0, &[seq("s", 4, 1, 0)], true)
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

    let mapper = SegmentMapper::new();
    let hits = mapper.map_range(&mut aln, "A", 0, 4, "B").unwrap();
    for w in hits.windows(2) {
        assert!(w[0].target_end <= w[1].target_start);
    }
    let covered: u64 = hits.iter().map(|h| h.target_end - h.target_start).sum();
    assert_eq!(covered, 4);
}
