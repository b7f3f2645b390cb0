//! A single genome: DNA, its sequence directory, and its top/bottom
//! segment arrays.

use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::error::{HalError, HalResult};
use crate::model::{
    BottomSegmentRecord, MetaData, Sequence, SequenceDirectory, TopSegmentRecord,
};
use crate::storage::{ChunkedArray, DnaAccess, InMemoryBackend};

/// Default number of segments per resident chunk.
pub const DEFAULT_SEGMENT_CHUNK: usize = 1024;
/// Default number of chunks kept buffered at once.
pub const DEFAULT_BUFFER_CHUNKS: usize = 4;
/// DNA chunks are scaled up relative to segment chunks: a packed DNA
/// record is far smaller than a segment record, so a DNA chunk can cover
/// proportionally more positions for the same I/O cost.
pub const DNA_CHUNK_SCALE: usize = 10;

/// Per-sequence dimensions used to (re)shape a genome.
#[derive(Debug, Clone)]
pub struct SequenceDimensions {
    /// Sequence name.
    pub name: String,
    /// Length in bases.
    pub length: u64,
    /// Number of top segments owned by this sequence (0 if the genome has
    /// no top array).
    pub top_segments: usize,
    /// Number of bottom segments owned by this sequence (0 if the genome
    /// has no bottom array).
    pub bottom_segments: usize,
}

/// A genome node in the alignment tree: DNA plus its two segment arrays.
#[derive(Debug)]
pub struct Genome {
    name: String,
    num_children: usize,
    seq_dir: SequenceDirectory,
    dna: Option<DnaAccess<InMemoryBackend<u8>>>,
    top_starts: ChunkedArray<u64>,
    top_records: ChunkedArray<TopSegmentRecord>,
    bottom_starts: ChunkedArray<u64>,
    bottom_records: ChunkedArray<BottomSegmentRecord>,
    metadata: MetaData,
}

impl Genome {
    /// Allocate a genome with the given per-sequence dimensions. `store_dna`
    /// controls whether a DNA buffer is allocated at all.
    #[instrument(skip(dims, name), fields(genome = %name))]
    pub fn new(
        name: impl Into<String> + std::fmt::Display,
        num_children: usize,
        dims: &[SequenceDimensions],
        store_dna: bool,
    ) -> HalResult<Self> {
        let name = name.into();
        let total_len: u64 = dims.iter().map(|d| d.length).sum();
        let top_counts: Vec<usize> = dims.iter().map(|d| d.top_segments).collect();
        let bottom_counts: Vec<usize> = dims.iter().map(|d| d.bottom_segments).collect();
        let names_and_lengths: Vec<(String, u64)> =
            dims.iter().map(|d| (d.name.clone(), d.length)).collect();

        let has_top = top_counts.iter().any(|&c| c > 0);
        let has_bottom = bottom_counts.iter().any(|&c| c > 0);

        let seq_dir = SequenceDirectory::build(
            &names_and_lengths,
            has_top.then_some(top_counts.as_slice()),
            has_bottom.then_some(bottom_counts.as_slice()),
        )?;

        if seq_dir.total_length() != total_len {
            return Err(HalError::Inconsistent(
                "sequence lengths do not sum to declared DNA length".to_string(),
            ));
        }

        let num_top: usize = top_counts.iter().sum();
        let num_bottom: usize = bottom_counts.iter().sum();

        let dna = if store_dna {
            Some(DnaAccess::create(
                total_len as usize,
                DEFAULT_SEGMENT_CHUNK * DNA_CHUNK_SCALE,
                DEFAULT_BUFFER_CHUNKS,
            )?)
        } else {
            None
        };

        let top_starts = ChunkedArray::create(
            InMemoryBackend::with_len(num_top + 1),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;
        let top_records = ChunkedArray::create(
            InMemoryBackend::with_len(num_top),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;
        let bottom_starts = ChunkedArray::create(
            InMemoryBackend::with_len(num_bottom + 1),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;
        let bottom_records = ChunkedArray::create(
            InMemoryBackend::with_len(num_bottom),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;

        let mut genome = Self {
            name,
            num_children,
            seq_dir,
            dna,
            top_starts,
            top_records,
            bottom_starts,
            bottom_records,
            metadata: MetaData::new(),
        };
        genome.reset_bottom_child_arity(num_children)?;
        debug!(total_len, num_top, num_bottom, "allocated genome");
        Ok(genome)
    }

    fn reset_bottom_child_arity(&mut self, num_children: usize) -> HalResult<()> {
        for i in 0..self.bottom_records.len() {
            *self.bottom_records.update(i)? = BottomSegmentRecord::new(num_children);
        }
        Ok(())
    }

    /// Genome name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of child genomes this genome has (fixes the bottom array's
    /// per-segment child-slot arity).
    pub fn num_children(&self) -> usize {
        self.num_children
    }

    /// Change the child arity, resetting every bottom segment's child slots
    /// to empty. Used for destructive reshapes; adding or removing a single
    /// child goes through [`Genome::add_child_slot`] /
    /// [`Genome::remove_child_slot`], which preserve the surviving links.
    pub fn set_num_children(&mut self, num_children: usize) -> HalResult<()> {
        self.num_children = num_children;
        self.reset_bottom_child_arity(num_children)
    }

    /// Append one empty child slot to every bottom segment, leaving the
    /// existing slots' links and reversed flags untouched.
    pub fn add_child_slot(&mut self) -> HalResult<()> {
        self.num_children += 1;
        for i in 0..self.bottom_records.len() {
            self.bottom_records
                .update(i)?
                .children
                .push(crate::model::ChildSlot::empty());
        }
        Ok(())
    }

    /// Remove child slot `slot` from every bottom segment. Slots above it
    /// shift down one position; their links and reversed flags are
    /// preserved.
    pub fn remove_child_slot(&mut self, slot: usize) -> HalResult<()> {
        if slot >= self.num_children {
            return Err(HalError::OutOfRange(format!(
                "child slot {slot} out of range for arity {}",
                self.num_children
            )));
        }
        self.num_children -= 1;
        for i in 0..self.bottom_records.len() {
            self.bottom_records.update(i)?.children.remove(slot);
        }
        Ok(())
    }

    /// Total DNA length `L`.
    pub fn len(&self) -> u64 {
        self.seq_dir.total_length()
    }

    /// Whether this genome has any DNA.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence directory.
    pub fn sequences(&self) -> &SequenceDirectory {
        &self.seq_dir
    }

    /// Mutable metadata map.
    pub fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.metadata
    }

    /// Read-only metadata map.
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Whether this genome stores a top array at all (false for a root).
    pub fn has_top_array(&self) -> bool {
        self.top_starts.len() > 1
    }

    /// Whether this genome stores a bottom array at all (false for a leaf).
    pub fn has_bottom_array(&self) -> bool {
        self.bottom_starts.len() > 1
    }

    /// Number of top segments.
    pub fn num_top_segments(&self) -> usize {
        self.top_records.len()
    }

    /// Number of bottom segments.
    pub fn num_bottom_segments(&self) -> usize {
        self.bottom_records.len()
    }

    /// Start coordinate of top segment `i`.
    pub fn top_start(&mut self, i: usize) -> HalResult<u64> {
        Ok(*self.top_starts.get(i)?)
    }

    /// End coordinate (exclusive) of top segment `i`.
    pub fn top_end(&mut self, i: usize) -> HalResult<u64> {
        Ok(*self.top_starts.get(i + 1)?)
    }

    /// Length of top segment `i`.
    pub fn top_length(&mut self, i: usize) -> HalResult<u64> {
        Ok(self.top_end(i)? - self.top_start(i)?)
    }

    /// Start coordinate of bottom segment `i`.
    pub fn bottom_start(&mut self, i: usize) -> HalResult<u64> {
        Ok(*self.bottom_starts.get(i)?)
    }

    /// End coordinate (exclusive) of bottom segment `i`.
    pub fn bottom_end(&mut self, i: usize) -> HalResult<u64> {
        Ok(*self.bottom_starts.get(i + 1)?)
    }

    /// Length of bottom segment `i`.
    pub fn bottom_length(&mut self, i: usize) -> HalResult<u64> {
        Ok(self.bottom_end(i)? - self.bottom_start(i)?)
    }

    /// Set the start coordinates of the top array in one shot (index `k`
    /// maps to segment `k`'s left endpoint; the final element is the
    /// sentinel `L`). Used when constructing a genome's segments directly.
    pub fn set_top_starts(&mut self, starts: &[u64]) -> HalResult<()> {
        if starts.len() != self.top_starts.len() {
            return Err(HalError::Inconsistent(
                "top start array length mismatch".to_string(),
            ));
        }
        for (i, &s) in starts.iter().enumerate() {
            *self.top_starts.update(i)? = s;
        }
        Ok(())
    }

    /// Set the start coordinates of the bottom array.
    pub fn set_bottom_starts(&mut self, starts: &[u64]) -> HalResult<()> {
        if starts.len() != self.bottom_starts.len() {
            return Err(HalError::Inconsistent(
                "bottom start array length mismatch".to_string(),
            ));
        }
        for (i, &s) in starts.iter().enumerate() {
            *self.bottom_starts.update(i)? = s;
        }
        Ok(())
    }

    /// Read-only access to a top segment record.
    pub fn top_record(&mut self, i: usize) -> HalResult<&TopSegmentRecord> {
        Ok(self.top_records.get(i)?)
    }

    /// Mutable access to a top segment record.
    pub fn top_record_mut(&mut self, i: usize) -> HalResult<&mut TopSegmentRecord> {
        Ok(self.top_records.update(i)?)
    }

    /// Read-only access to a bottom segment record.
    pub fn bottom_record(&mut self, i: usize) -> HalResult<&BottomSegmentRecord> {
        Ok(self.bottom_records.get(i)?)
    }

    /// Mutable access to a bottom segment record.
    pub fn bottom_record_mut(&mut self, i: usize) -> HalResult<&mut BottomSegmentRecord> {
        Ok(self.bottom_records.update(i)?)
    }

    /// Find the top segment index containing genome position `pos`: jump to
    /// the expected index assuming uniform segment length, then refine
    /// linearly.
    pub fn top_index_at(&mut self, pos: u64) -> HalResult<usize> {
        Self::index_at(&mut self.top_starts, pos)
    }

    /// Find the bottom segment index containing genome position `pos`.
    pub fn bottom_index_at(&mut self, pos: u64) -> HalResult<usize> {
        Self::index_at(&mut self.bottom_starts, pos)
    }

    fn index_at(starts: &mut ChunkedArray<u64>, pos: u64) -> HalResult<usize> {
        let n = starts.len();
        if n <= 1 {
            return Err(HalError::OutOfRange("empty segment array".to_string()));
        }
        let num_segments = n - 1;
        let total = *starts.get(num_segments)?;
        if pos >= total {
            return Err(HalError::OutOfRange(format!(
                "position {pos} outside [0, {total})"
            )));
        }
        let stride = (total as usize / num_segments.max(1)).max(1);
        let mut guess = (pos as usize / stride).min(num_segments - 1);

        loop {
            let start = *starts.get(guess)?;
            let end = *starts.get(guess + 1)?;
            if pos < start {
                guess -= 1;
            } else if pos >= end {
                guess += 1;
            } else {
                return Ok(guess);
            }
        }
    }

    /// Read a base at a genome-relative position.
    pub fn get_base(&mut self, pos: u64) -> HalResult<u8> {
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.get_base(pos as usize)?)
    }

    /// Write a base at a genome-relative position.
    pub fn set_base(&mut self, pos: u64, base: u8) -> HalResult<()> {
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.set_base(pos as usize, base)?)
    }

    /// Read a strand-aware base (complemented when `reverse` is set).
    pub fn get_base_strand(&mut self, pos: u64, reverse: bool) -> HalResult<u8> {
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.get_base_strand(pos as usize, reverse)?)
    }

    /// Overwrite the whole genome's DNA from a string matching
    /// `[ACGTNacgtn]*` of length `L`.
    pub fn set_string(&mut self, s: &str) -> HalResult<()> {
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.set_string(s)?)
    }

    /// Read the whole genome's DNA back out.
    pub fn get_string(&mut self) -> HalResult<String> {
        let len = self.len() as usize;
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.get_string(0, len)?)
    }

    /// Read one named sequence's bases.
    pub fn get_sequence_string(&mut self, name: &str) -> HalResult<String> {
        let (start, end) = {
            let seq = self.seq_dir.by_name(name)?;
            (seq.start as usize, seq.end() as usize)
        };
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        Ok(dna.get_string(start, end)?)
    }

    /// Overwrite one named sequence's bases. `s` must have exactly the
    /// sequence's length.
    pub fn set_sequence_string(&mut self, name: &str, s: &str) -> HalResult<()> {
        let (start, length) = {
            let seq = self.seq_dir.by_name(name)?;
            (seq.start as usize, seq.length as usize)
        };
        if s.len() != length {
            return Err(HalError::InvalidArgument(format!(
                "string length {} does not match sequence {name} length {length}",
                s.len()
            )));
        }
        let dna = self
            .dna
            .as_mut()
            .ok_or_else(|| HalError::Unsupported("genome has no DNA buffer".to_string()))?;
        for (i, b) in s.bytes().enumerate() {
            dna.set_base(start + i, b)?;
        }
        Ok(())
    }

    /// Populate the parse bridges between the two segment arrays from their
    /// coordinates: each top segment points at the bottom segment containing
    /// its start position and vice versa. No-op unless the genome has both
    /// arrays.
    pub fn build_parse_links(&mut self) -> HalResult<()> {
        if !self.has_top_array() || !self.has_bottom_array() {
            return Ok(());
        }
        for i in 0..self.num_top_segments() {
            let start = self.top_start(i)?;
            let parse = self.bottom_index_at(start)? as i64;
            self.top_record_mut(i)?.bottom_parse_index = parse;
        }
        for i in 0..self.num_bottom_segments() {
            let start = self.bottom_start(i)?;
            let parse = self.top_index_at(start)? as i64;
            self.bottom_record_mut(i)?.top_parse_index = parse;
        }
        Ok(())
    }

    /// Flush any dirty buffered state (DNA and segment arrays).
    pub fn flush(&mut self) {
        if let Some(dna) = self.dna.as_mut() {
            dna.flush();
        }
        self.top_starts.flush();
        self.top_records.flush();
        self.bottom_starts.flush();
        self.bottom_records.flush();
    }

    /// Destructive reshape: drop all existing DNA/segment arrays and
    /// reallocate from scratch. Outstanding iterators over this genome are
    /// invalidated. Refuses to drop an unflushed DNA buffer; callers flush
    /// explicitly.
    #[instrument(skip(self, dims))]
    pub fn set_dimensions(&mut self, dims: &[SequenceDimensions], store_dna: bool) -> HalResult<()> {
        if self.dna.as_ref().is_some_and(|d| d.is_dirty()) {
            return Err(HalError::Dirty(format!(
                "genome {} has unflushed DNA writes",
                self.name
            )));
        }
        let num_children = self.num_children;
        *self = Self::new(self.name.clone(), num_children, dims, store_dna)?;
        Ok(())
    }

    /// Reshape only the top array: `counts` maps sequence name to new top
    /// segment count; sequences not present keep their existing count.
    /// Bottom array and DNA are untouched.
    pub fn update_top_dimensions(&mut self, counts: &HashMap<String, usize>) -> HalResult<()> {
        self.update_side_dimensions(counts, true)
    }

    /// Reshape only the bottom array; symmetric to
    /// [`Genome::update_top_dimensions`].
    pub fn update_bottom_dimensions(&mut self, counts: &HashMap<String, usize>) -> HalResult<()> {
        self.update_side_dimensions(counts, false)
    }

    fn update_side_dimensions(
        &mut self,
        counts: &HashMap<String, usize>,
        top_side: bool,
    ) -> HalResult<()> {
        let mut new_top_counts = Vec::with_capacity(self.seq_dir.len());
        let mut new_bottom_counts = Vec::with_capacity(self.seq_dir.len());
        let mut names_and_lengths = Vec::with_capacity(self.seq_dir.len());

        for (idx, seq) in self.seq_dir.sequences().iter().enumerate() {
            names_and_lengths.push((seq.name.clone(), seq.length));
            let existing_top = self.segment_count_for(seq, idx, true);
            let existing_bottom = self.segment_count_for(seq, idx, false);
            if top_side {
                new_top_counts.push(counts.get(&seq.name).copied().unwrap_or(existing_top));
                new_bottom_counts.push(existing_bottom);
            } else {
                new_top_counts.push(existing_top);
                new_bottom_counts.push(counts.get(&seq.name).copied().unwrap_or(existing_bottom));
            }
        }

        let has_top = new_top_counts.iter().any(|&c| c > 0);
        let has_bottom = new_bottom_counts.iter().any(|&c| c > 0);

        let seq_dir = SequenceDirectory::build(
            &names_and_lengths,
            has_top.then_some(new_top_counts.as_slice()),
            has_bottom.then_some(new_bottom_counts.as_slice()),
        )?;

        let num_top: usize = new_top_counts.iter().sum();
        let num_bottom: usize = new_bottom_counts.iter().sum();

        self.seq_dir = seq_dir;
        self.top_starts =
            ChunkedArray::create(InMemoryBackend::with_len(num_top + 1), DEFAULT_SEGMENT_CHUNK, DEFAULT_BUFFER_CHUNKS)?;
        self.top_records =
            ChunkedArray::create(InMemoryBackend::with_len(num_top), DEFAULT_SEGMENT_CHUNK, DEFAULT_BUFFER_CHUNKS)?;
        self.bottom_starts = ChunkedArray::create(
            InMemoryBackend::with_len(num_bottom + 1),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;
        self.bottom_records = ChunkedArray::create(
            InMemoryBackend::with_len(num_bottom),
            DEFAULT_SEGMENT_CHUNK,
            DEFAULT_BUFFER_CHUNKS,
        )?;
        self.reset_bottom_child_arity(self.num_children)?;
        Ok(())
    }

    fn segment_count_for(&self, seq: &Sequence, idx: usize, top_side: bool) -> usize {
        let sequences = self.seq_dir.sequences();
        let (first, next_first, total) = if top_side {
            let next = sequences.get(idx + 1).map(|s| s.first_top_index);
            (seq.first_top_index, next, self.top_records.len() as i64)
        } else {
            let next = sequences.get(idx + 1).map(|s| s.first_bottom_index);
            (seq.first_bottom_index, next, self.bottom_records.len() as i64)
        };
        if first < 0 {
            return 0;
        }
        let end = next_first.filter(|&n| n >= 0).unwrap_or(total);
        (end - first).max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Vec<SequenceDimensions> {
        vec![SequenceDimensions {
            name: "s".to_string(),
            length: 4,
            top_segments: 1,
            bottom_segments: 0,
        }]
    }

    #[test]
    fn new_genome_tiles_correctly() {
        let genome = Genome::new("leaf", 0, &dims(), true).unwrap();
        assert_eq!(genome.len(), 4);
        assert!(genome.has_top_array());
        assert!(!genome.has_bottom_array());
        assert_eq!(genome.num_top_segments(), 1);
    }

    #[test]
    fn dna_round_trips() {
        let mut genome = Genome::new("leaf", 0, &dims(), true).unwrap();
        genome.set_string("ACGT").unwrap();
        assert_eq!(genome.get_string().unwrap(), "ACGT");
    }

    #[test]
    fn sequence_scoped_accessors_use_relative_coordinates() {
        let mut genome = Genome::new(
            "g",
            0,
            &[
                SequenceDimensions {
                    name: "s1".to_string(),
                    length: 4,
                    top_segments: 1,
                    bottom_segments: 0,
                },
                SequenceDimensions {
                    name: "s2".to_string(),
                    length: 4,
                    top_segments: 1,
                    bottom_segments: 0,
                },
            ],
            true,
        )
        .unwrap();
        genome.set_string("ACGTACGT").unwrap();
        assert_eq!(genome.get_sequence_string("s2").unwrap(), "ACGT");
        genome.set_sequence_string("s2", "TTTT").unwrap();
        assert_eq!(genome.get_string().unwrap(), "ACGTTTTT");
        assert!(genome.set_sequence_string("s2", "TT").is_err());
    }

    #[test]
    fn set_dimensions_refuses_dirty_dna() {
        let mut genome = Genome::new("leaf", 0, &dims(), true).unwrap();
        genome.set_base(0, b'G').unwrap();
        let err = genome.set_dimensions(&dims(), true);
        assert!(matches!(err, Err(crate::error::HalError::Dirty(_))));
        genome.flush();
        assert!(genome.set_dimensions(&dims(), true).is_ok());
    }

    #[test]
    fn top_index_at_finds_segment() {
        let mut genome = Genome::new(
            "g",
            0,
            &[SequenceDimensions {
                name: "s".to_string(),
                length: 10,
                top_segments: 3,
                bottom_segments: 0,
            }],
            false,
        )
        .unwrap();
        genome.set_top_starts(&[0, 4, 7, 10]).unwrap();
        assert_eq!(genome.top_index_at(0).unwrap(), 0);
        assert_eq!(genome.top_index_at(4).unwrap(), 1);
        assert_eq!(genome.top_index_at(9).unwrap(), 2);
    }
}
