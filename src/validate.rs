//! Structural validation of genomes and whole alignments.
//!
//! Checks the storage invariants the traversal layers rely on: segment
//! arrays must tile their genome exactly, parse bridges must land on the
//! segment containing the same coordinate, parent/child links must agree
//! from both sides, and paralogy cycles must close with exactly one
//! canonical member. Every violation is reported as
//! [`HalError::Inconsistent`] naming the genome and segment involved.

use crate::alignment::Alignment;
use crate::error::{HalError, HalResult};
use crate::genome::Genome;
use crate::model::NULL_INDEX;

/// Validate one genome's segment arrays and sequence directory.
pub fn validate_genome(genome: &mut Genome) -> HalResult<()> {
    validate_sequence_directory(genome)?;
    validate_coverage(genome, true)?;
    validate_coverage(genome, false)?;
    validate_parse_links(genome)?;
    Ok(())
}

/// Validate the whole alignment: the tree itself, every genome's local
/// invariants, and the cross-genome link symmetry along every edge.
pub fn validate_alignment(alignment: &mut Alignment) -> HalResult<()> {
    alignment.validate()?;
    let names: Vec<String> = alignment.genome_names().map(|s| s.to_string()).collect();
    for name in &names {
        validate_genome(alignment.genome_mut(name)?)?;
    }
    for name in &names {
        validate_edge_symmetry(alignment, name)?;
        validate_paralogy_cycles(alignment, name)?;
    }
    Ok(())
}

fn validate_sequence_directory(genome: &mut Genome) -> HalResult<()> {
    let name = genome.name().to_string();
    let total = genome.len();
    let mut expected_start = 0u64;
    for seq in genome.sequences().sequences() {
        if seq.start != expected_start {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: sequence {} starts at {} but previous sequences end at {expected_start}",
                seq.name, seq.start
            )));
        }
        expected_start = seq.end();
    }
    if expected_start != total {
        return Err(HalError::Inconsistent(format!(
            "genome {name}: sequences tile [0, {expected_start}) but DNA length is {total}"
        )));
    }
    Ok(())
}

/// The segment array on one side must partition `[0, L)`: starts strictly
/// increasing from 0, sentinel equal to L, and no segment crossing a
/// sequence boundary.
fn validate_coverage(genome: &mut Genome, top_side: bool) -> HalResult<()> {
    let name = genome.name().to_string();
    let side = if top_side { "top" } else { "bottom" };
    let n = if top_side {
        genome.num_top_segments()
    } else {
        genome.num_bottom_segments()
    };
    if n == 0 {
        return Ok(());
    }
    let total = genome.len();

    let start_of = |g: &mut Genome, i: usize| -> HalResult<u64> {
        if top_side {
            g.top_start(i)
        } else {
            g.bottom_start(i)
        }
    };

    if start_of(genome, 0)? != 0 {
        return Err(HalError::Inconsistent(format!(
            "genome {name}: first {side} segment does not start at 0"
        )));
    }
    for i in 0..n {
        let s = start_of(genome, i)?;
        let e = start_of(genome, i + 1)?;
        if e <= s {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: {side} segment {i} has non-positive length"
            )));
        }
        let seq = genome.sequences().locate(s)?;
        if e > seq.end() {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: {side} segment {i} crosses the boundary of sequence {}",
                seq.name
            )));
        }
    }
    if start_of(genome, n)? != total {
        return Err(HalError::Inconsistent(format!(
            "genome {name}: {side} sentinel does not equal the DNA length {total}"
        )));
    }
    Ok(())
}

/// A parse bridge walked rightward must land on the segment of the other
/// array containing the same start coordinate. Genomes with both arrays
/// must carry the bridges on every segment.
fn validate_parse_links(genome: &mut Genome) -> HalResult<()> {
    if !genome.has_top_array() || !genome.has_bottom_array() {
        return Ok(());
    }
    let name = genome.name().to_string();
    for i in 0..genome.num_top_segments() {
        let parse = genome.top_record(i)?.bottom_parse_index;
        if parse == NULL_INDEX {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: top segment {i} is missing its parse link"
            )));
        }
        let start = genome.top_start(i)?;
        let mut idx = parse as usize;
        loop {
            if idx >= genome.num_bottom_segments() {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: top segment {i}'s parse link walks off the bottom array"
                )));
            }
            if start < genome.bottom_end(idx)? {
                break;
            }
            idx += 1;
        }
        if start < genome.bottom_start(idx)? {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: top segment {i}'s parse link points past its coordinate"
            )));
        }
    }
    for i in 0..genome.num_bottom_segments() {
        let parse = genome.bottom_record(i)?.top_parse_index;
        if parse == NULL_INDEX {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: bottom segment {i} is missing its parse link"
            )));
        }
        let start = genome.bottom_start(i)?;
        let mut idx = parse as usize;
        loop {
            if idx >= genome.num_top_segments() {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: bottom segment {i}'s parse link walks off the top array"
                )));
            }
            if start < genome.top_end(idx)? {
                break;
            }
            idx += 1;
        }
        if start < genome.top_start(idx)? {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: bottom segment {i}'s parse link points past its coordinate"
            )));
        }
    }
    Ok(())
}

/// Each linked child slot must be mirrored by the child's back-pointer with
/// a matching reversed flag, and each top segment's parent link must be
/// reachable back from the parent through the slot for this genome
/// (directly, or through the paralogy cycle).
fn validate_edge_symmetry(alignment: &mut Alignment, name: &str) -> HalResult<()> {
    let child_names: Vec<String> = alignment.phylogeny().children(name)?.to_vec();

    for (slot, child_name) in child_names.iter().enumerate() {
        let num_bottom = alignment.genome(name)?.num_bottom_segments();
        for b in 0..num_bottom {
            let link = {
                let g = alignment.genome_mut(name)?;
                g.bottom_record(b)?.children.get(slot).copied()
            };
            let Some(link) = link.filter(|c| c.is_linked()) else {
                continue;
            };
            let t = link.child_index as usize;
            let child = alignment.genome_mut(child_name)?;
            if t >= child.num_top_segments() {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: bottom segment {b} links to nonexistent top segment {t} of {child_name}"
                )));
            }
            let trec = *child.top_record(t)?;
            if trec.parent_index != b as i64 {
                return Err(HalError::Inconsistent(format!(
                    "genome {child_name}: top segment {t} does not point back at bottom segment {b} of {name}"
                )));
            }
            if trec.parent_reversed != link.child_reversed {
                return Err(HalError::Inconsistent(format!(
                    "genome {child_name}: top segment {t} disagrees with its parent on strand orientation"
                )));
            }
        }
    }

    // Every parented top segment must be reachable from the parent's slot,
    // either directly or as a member of the canonical target's paralogy
    // cycle.
    if let Some(parent_name) = alignment.phylogeny().parent(name)?.map(|s| s.to_string()) {
        let slot = alignment
            .phylogeny()
            .children(&parent_name)?
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                HalError::Inconsistent(format!("{name} is not a child of {parent_name}"))
            })?;
        let num_top = alignment.genome(name)?.num_top_segments();
        for t in 0..num_top {
            let trec = *alignment.genome_mut(name)?.top_record(t)?;
            if !trec.has_parent() {
                continue;
            }
            let b = trec.parent_index as usize;
            let parent = alignment.genome_mut(&parent_name)?;
            if b >= parent.num_bottom_segments() {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: top segment {t} links to nonexistent bottom segment {b} of {parent_name}"
                )));
            }
            let link = parent.bottom_record(b)?.children.get(slot).copied();
            let Some(link) = link.filter(|c| c.is_linked()) else {
                return Err(HalError::Inconsistent(format!(
                    "genome {parent_name}: bottom segment {b} has no link for child {name} but top segment {t} points at it"
                )));
            };
            let canonical = link.child_index as usize;
            if canonical != t && !cycle_contains(alignment.genome_mut(name)?, canonical, t)? {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: top segment {t} is not reachable from {parent_name}'s bottom segment {b}"
                )));
            }
        }
    }
    Ok(())
}

/// Walk the paralogy cycle from `start`, looking for `needle`. Bounded by
/// the array length so a corrupt chain cannot loop forever.
fn cycle_contains(genome: &mut Genome, start: usize, needle: usize) -> HalResult<bool> {
    let mut idx = genome.top_record(start)?.next_paralogy_index;
    let mut steps = 0;
    while idx != NULL_INDEX && idx as usize != start {
        if idx as usize == needle {
            return Ok(true);
        }
        steps += 1;
        if steps > genome.num_top_segments() {
            return Err(HalError::Inconsistent(format!(
                "genome {}: paralogy chain from segment {start} does not close",
                genome.name()
            )));
        }
        idx = genome.top_record(idx as usize)?.next_paralogy_index;
    }
    Ok(false)
}

/// Every paralogy chain must return to its starting segment, all members
/// must share one parent bottom segment, and exactly one member must be the
/// canonical target of the parent's child slot.
fn validate_paralogy_cycles(alignment: &mut Alignment, name: &str) -> HalResult<()> {
    let parent_name = match alignment.phylogeny().parent(name)? {
        Some(p) => p.to_string(),
        None => return Ok(()),
    };
    let slot = alignment
        .phylogeny()
        .children(&parent_name)?
        .iter()
        .position(|c| c == name);
    let Some(slot) = slot else {
        return Ok(());
    };

    let num_top = alignment.genome(name)?.num_top_segments();
    for t in 0..num_top {
        let rec = *alignment.genome_mut(name)?.top_record(t)?;
        if !rec.has_paralogy() {
            continue;
        }
        let mut members = vec![t];
        let mut idx = rec.next_paralogy_index;
        while idx != NULL_INDEX && idx as usize != t {
            members.push(idx as usize);
            if members.len() > num_top {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: paralogy chain from segment {t} does not close"
                )));
            }
            idx = alignment.genome_mut(name)?.top_record(idx as usize)?.next_paralogy_index;
        }
        if idx == NULL_INDEX {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: paralogy chain from segment {t} ends without closing the cycle"
            )));
        }

        let parent_idx = rec.parent_index;
        let mut canonical_count = 0usize;
        for &m in &members {
            let mrec = *alignment.genome_mut(name)?.top_record(m)?;
            if mrec.parent_index != parent_idx {
                return Err(HalError::Inconsistent(format!(
                    "genome {name}: paralogy cycle of segment {t} spans more than one parent segment"
                )));
            }
            if parent_idx != NULL_INDEX {
                let parent = alignment.genome_mut(&parent_name)?;
                let link = parent
                    .bottom_record(parent_idx as usize)?
                    .children
                    .get(slot)
                    .copied();
                if link.is_some_and(|c| c.is_linked() && c.child_index as usize == m) {
                    canonical_count += 1;
                }
            }
        }
        if parent_idx != NULL_INDEX && canonical_count != 1 {
            return Err(HalError::Inconsistent(format!(
                "genome {name}: paralogy cycle of segment {t} has {canonical_count} canonical members instead of exactly one"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::SequenceDimensions;

    fn seq(name: &str, len: u64, top: usize, bottom: usize) -> SequenceDimensions {
        SequenceDimensions {
            name: name.to_string(),
            length: len,
            top_segments: top,
            bottom_segments: bottom,
        }
    }

    fn well_formed() -> Alignment {
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

    #[test]
    fn well_formed_alignment_validates() {
        let mut aln = well_formed();
        assert!(validate_alignment(&mut aln).is_ok());
    }

    #[test]
    fn asymmetric_strand_flags_are_rejected() {
        let mut aln = well_formed();
        aln.genome_mut("L").unwrap().top_record_mut(0).unwrap().parent_reversed = true;
        assert!(matches!(
            validate_alignment(&mut aln),
            Err(HalError::Inconsistent(_))
        ));
    }

    #[test]
    fn dangling_child_link_is_rejected() {
        let mut aln = well_formed();
        aln.genome_mut("R").unwrap().bottom_record_mut(0).unwrap().set_child(0, 9, false);
        assert!(matches!(
            validate_alignment(&mut aln),
            Err(HalError::Inconsistent(_))
        ));
    }

    #[test]
    fn sentinel_mismatch_is_rejected() {
        let mut aln = well_formed();
        aln.genome_mut("L").unwrap().set_top_starts(&[0, 3]).unwrap();
        assert!(matches!(
            validate_alignment(&mut aln),
            Err(HalError::Inconsistent(_))
        ));
    }

    #[test]
    fn open_paralogy_chain_is_rejected() {
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
            // Chain never points back at segment 0.
        }
        assert!(matches!(
            validate_alignment(&mut aln),
            Err(HalError::Inconsistent(_))
        ));
    }

    #[test]
    fn parse_links_validate_after_rebuilding() {
        let mut genome = crate::genome::Genome::new(
            "M",
            1,
            &[seq("s", 8, 2, 2)],
            false,
        )
        .unwrap();
        genome.set_top_starts(&[0, 4, 8]).unwrap();
        genome.set_bottom_starts(&[0, 6, 8]).unwrap();
        genome.build_parse_links().unwrap();
        assert!(validate_genome(&mut genome).is_ok());
        assert_eq!(genome.top_record(1).unwrap().bottom_parse_index, 0);
        assert_eq!(genome.bottom_record(1).unwrap().top_parse_index, 1);
    }
}
