//! Sequence directory: named sub-ranges of a genome's DNA.

use crate::error::{HalError, HalResult};
use crate::model::segment_record::NULL_INDEX;

/// A named contiguous sub-range of a genome's DNA, e.g. a chromosome or
/// scaffold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Sequence name, unique within its genome.
    pub name: String,
    /// Genome-relative start offset.
    pub start: u64,
    /// Length in bases.
    pub length: u64,
    /// Index of this sequence's first top segment, or [`NULL_INDEX`] if the
    /// genome has no top array (root) or the sequence has zero length.
    pub first_top_index: i64,
    /// Index of this sequence's first bottom segment, or [`NULL_INDEX`] if
    /// the genome has no bottom array (leaf) or the sequence has zero
    /// length.
    pub first_bottom_index: i64,
}

impl Sequence {
    /// End offset (exclusive), genome-relative.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Translate a genome-relative position into a sequence-relative one.
    pub fn to_relative(&self, genome_pos: u64) -> HalResult<u64> {
        if genome_pos < self.start || genome_pos >= self.end() {
            return Err(HalError::OutOfRange(format!(
                "position {genome_pos} outside sequence {} [{}, {})",
                self.name,
                self.start,
                self.end()
            )));
        }
        Ok(genome_pos - self.start)
    }

    /// True when this sequence carries no bases.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Per-genome table of sequences, kept sorted by start offset.
///
/// Sorted storage is enforced at construction, so site lookup is always a
/// binary search with no linear-scan fallback.
#[derive(Debug, Clone, Default)]
pub struct SequenceDirectory {
    sequences: Vec<Sequence>,
}

impl SequenceDirectory {
    /// Build a directory from sequences in genome-start order, assigning
    /// segment-start indices by the supplied per-sequence segment counts.
    ///
    /// `top_counts`/`bottom_counts` give, per sequence (in order), how many
    /// top/bottom segments that sequence owns. Pass `None` for a side with
    /// no array at all (root genome: no top array; leaf genome: no bottom
    /// array).
    pub fn build(
        names_and_lengths: &[(String, u64)],
        top_counts: Option<&[usize]>,
        bottom_counts: Option<&[usize]>,
    ) -> HalResult<Self> {
        let mut sequences = Vec::with_capacity(names_and_lengths.len());
        let mut start = 0u64;
        let mut top_running = 0i64;
        let mut bottom_running = 0i64;

        for (idx, (name, length)) in names_and_lengths.iter().enumerate() {
            let first_top = match top_counts {
                Some(counts) if *length > 0 => {
                    let v = top_running;
                    top_running += counts[idx] as i64;
                    v
                }
                Some(_) => NULL_INDEX,
                None => NULL_INDEX,
            };
            let first_bottom = match bottom_counts {
                Some(counts) if *length > 0 => {
                    let v = bottom_running;
                    bottom_running += counts[idx] as i64;
                    v
                }
                Some(_) => NULL_INDEX,
                None => NULL_INDEX,
            };

            sequences.push(Sequence {
                name: name.clone(),
                start,
                length: *length,
                first_top_index: first_top,
                first_bottom_index: first_bottom,
            });
            start += length;
        }

        let mut names_seen = std::collections::HashSet::new();
        for seq in &sequences {
            if !names_seen.insert(seq.name.clone()) {
                return Err(HalError::Inconsistent(format!(
                    "duplicate sequence name {}",
                    seq.name
                )));
            }
        }

        Ok(Self { sequences })
    }

    /// Total genome length implied by the directory (sum of sequence
    /// lengths).
    pub fn total_length(&self) -> u64 {
        self.sequences.last().map(|s| s.end()).unwrap_or(0)
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Whether the directory has no sequences.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// All sequences, in genome-start order.
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Look up a sequence by name.
    pub fn by_name(&self, name: &str) -> HalResult<&Sequence> {
        self.sequences
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HalError::NotFound(format!("sequence {name}")))
    }

    /// Locate the sequence containing genome-relative position `pos` via
    /// binary search on start offsets.
    pub fn locate(&self, pos: u64) -> HalResult<&Sequence> {
        if self.sequences.is_empty() || pos >= self.total_length() {
            return Err(HalError::OutOfRange(format!(
                "position {pos} outside genome of length {}",
                self.total_length()
            )));
        }
        match self.sequences.binary_search_by(|s| {
            if pos < s.start {
                std::cmp::Ordering::Greater
            } else if pos >= s.end() {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        }) {
            Ok(idx) => Ok(&self.sequences[idx]),
            Err(_) => Err(HalError::Inconsistent(format!(
                "binary search found no sequence covering position {pos}"
            ))),
        }
    }

    /// Index of the sequence that owns segment `segment_idx` in the top
    /// array, given the total top segment count.
    pub fn sequence_index_for_top(&self, segment_idx: i64) -> HalResult<usize> {
        self.sequence_index_for(segment_idx, |s| s.first_top_index)
    }

    /// Index of the sequence that owns segment `segment_idx` in the bottom
    /// array.
    pub fn sequence_index_for_bottom(&self, segment_idx: i64) -> HalResult<usize> {
        self.sequence_index_for(segment_idx, |s| s.first_bottom_index)
    }

    fn sequence_index_for(
        &self,
        segment_idx: i64,
        first: impl Fn(&Sequence) -> i64,
    ) -> HalResult<usize> {
        let mut owner = None;
        for (idx, seq) in self.sequences.iter().enumerate() {
            let f = first(seq);
            if f != NULL_INDEX && f <= segment_idx {
                owner = Some(idx);
            } else if f != NULL_INDEX && f > segment_idx {
                break;
            }
        }
        owner.ok_or_else(|| {
            HalError::Inconsistent(format!("no sequence owns segment index {segment_idx}"))
        })
    }
}
