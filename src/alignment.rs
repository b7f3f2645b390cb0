//! The alignment: a tree of genomes plus top-level metadata.

use std::collections::{HashMap, HashSet};

use tracing::{info, instrument};

use crate::error::{HalError, HalResult};
use crate::genome::{Genome, SequenceDimensions};
use crate::model::MetaData;
use crate::phylogeny::Phylogeny;

/// A rooted tree of named genomes.
///
/// Genome data is always resident in this in-memory implementation; the
/// external file container that would make "open" an expensive operation
/// is an out-of-scope collaborator. `open_genome`/`close_genome` still
/// honor the caching and flush-on-close contract so callers get the same
/// pointer-stability and lifecycle guarantees they would against a real
/// backend.
#[derive(Debug, Default)]
pub struct Alignment {
    phylogeny: Phylogeny,
    genomes: HashMap<String, Genome>,
    open: HashSet<String>,
    metadata: MetaData,
}

impl Alignment {
    /// An empty alignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level metadata map.
    pub fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.metadata
    }

    /// Read-only top-level metadata map.
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// The phylogenetic tree.
    pub fn phylogeny(&self) -> &Phylogeny {
        &self.phylogeny
    }

    /// Add the root genome.
    #[instrument(skip(self, dims, name))]
    pub fn add_root_genome(
        &mut self,
        name: impl Into<String>,
        dims: &[SequenceDimensions],
        store_dna: bool,
    ) -> HalResult<()> {
        let name = name.into();
        self.phylogeny.add_root(&name)?;
        // Child arity grows as children are attached, one slot per child.
        let genome = Genome::new(&name, 0, dims, store_dna)?;
        self.genomes.insert(name, genome);
        Ok(())
    }

    /// Add a child genome below `parent`.
    #[instrument(skip(self, dims, name))]
    pub fn add_child_genome(
        &mut self,
        parent: &str,
        name: impl Into<String>,
        branch_length: f64,
        dims: &[SequenceDimensions],
        store_dna: bool,
    ) -> HalResult<()> {
        let name = name.into();
        self.phylogeny.add_child(parent, &name, branch_length)?;
        let genome = Genome::new(&name, 0, dims, store_dna)?;
        self.genomes.insert(name, genome);
        // The new child occupies the next slot in the parent's bottom
        // segments; existing slots keep their links.
        self.genome_mut(parent)?.add_child_slot()?;
        Ok(())
    }

    /// Open (and cache) the named genome, returning a reference.
    pub fn open_genome(&mut self, name: &str) -> HalResult<&Genome> {
        if !self.genomes.contains_key(name) {
            return Err(HalError::NotFound(format!("genome {name}")));
        }
        self.open.insert(name.to_string());
        Ok(self.genomes.get(name).unwrap())
    }

    /// Open (and cache) the named genome for mutation.
    pub fn open_genome_mut(&mut self, name: &str) -> HalResult<&mut Genome> {
        if !self.genomes.contains_key(name) {
            return Err(HalError::NotFound(format!("genome {name}")));
        }
        self.open.insert(name.to_string());
        Ok(self.genomes.get_mut(name).unwrap())
    }

    /// Immutable access without touching the open cache (used by read-only
    /// traversal code that doesn't care about open/close lifecycle).
    pub fn genome(&self, name: &str) -> HalResult<&Genome> {
        self.genomes
            .get(name)
            .ok_or_else(|| HalError::NotFound(format!("genome {name}")))
    }

    /// Mutable access without touching the open cache.
    pub fn genome_mut(&mut self, name: &str) -> HalResult<&mut Genome> {
        self.genomes
            .get_mut(name)
            .ok_or_else(|| HalError::NotFound(format!("genome {name}")))
    }

    /// Whether `name` is currently marked open.
    pub fn is_open(&self, name: &str) -> bool {
        self.open.contains(name)
    }

    /// Flush and evict `name` from the open cache.
    #[instrument(skip(self))]
    pub fn close_genome(&mut self, name: &str) -> HalResult<()> {
        let genome = self.genome_mut(name)?;
        genome.flush();
        self.open.remove(name);
        info!(genome = name, "closed genome");
        Ok(())
    }

    /// Remove a leaf-like genome. Its parent's bottom segments are rebuilt
    /// with one fewer child slot: the removed child's slot drops out and
    /// the surviving children's links and reversed flags shift into their
    /// new positions.
    #[instrument(skip(self))]
    pub fn remove_genome(&mut self, name: &str) -> HalResult<()> {
        if !self.phylogeny.is_leaf(name)? {
            return Err(HalError::InvalidArgument(format!(
                "cannot remove {name}: not a leaf"
            )));
        }
        let parent = self.phylogeny.parent(name)?.map(|s| s.to_string());
        let slot = match &parent {
            Some(p) => self.phylogeny.children(p)?.iter().position(|c| c == name),
            None => None,
        };
        self.phylogeny.remove(name)?;
        self.genomes.remove(name);
        self.open.remove(name);
        if let (Some(parent), Some(slot)) = (parent, slot) {
            self.genome_mut(&parent)?.remove_child_slot(slot)?;
        }
        Ok(())
    }

    /// All genome names.
    pub fn genome_names(&self) -> impl Iterator<Item = &str> {
        self.genomes.keys().map(|s| s.as_str())
    }

    /// Validate the tree-level invariants: connected rooted tree, branch
    /// lengths on every non-root edge, no phylogeny entry without a genome.
    pub fn validate(&self) -> HalResult<()> {
        self.phylogeny.validate()?;
        for name in self.phylogeny.names() {
            if !self.genomes.contains_key(name) {
                return Err(HalError::Inconsistent(format!(
                    "phylogeny references unknown genome {name}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(name: &str, len: u64, top: usize, bottom: usize) -> SequenceDimensions {
        SequenceDimensions {
            name: name.to_string(),
            length: len,
            top_segments: top,
            bottom_segments: bottom,
        }
    }

    #[test]
    fn open_genome_caches_and_close_flushes() {
        let mut aln = Alignment::new();
        aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
        assert!(!aln.is_open("R"));
        aln.open_genome("R").unwrap();
        assert!(aln.is_open("R"));
        aln.close_genome("R").unwrap();
        assert!(!aln.is_open("R"));
    }

    #[test]
    fn add_child_updates_parent_arity() {
        let mut aln = Alignment::new();
        aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
        aln.add_child_genome("R", "L", 1.0, &[seq("s", 4, 1, 0)], true)
            .unwrap();
        let r = aln.genome_mut("R").unwrap();
        assert_eq!(r.num_children(), 1);
    }

    #[test]
    fn remove_genome_shifts_surviving_child_slots() {
        let mut aln = Alignment::new();
        aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
        aln.add_child_genome("R", "A", 1.0, &[seq("s", 4, 1, 0)], true)
            .unwrap();
        aln.add_child_genome("R", "B", 1.0, &[seq("s", 4, 1, 0)], true)
            .unwrap();
        {
            let r = aln.genome_mut("R").unwrap();
            r.set_bottom_starts(&[0, 4]).unwrap();
            r.bottom_record_mut(0).unwrap().set_child(0, 3, false);
            r.bottom_record_mut(0).unwrap().set_child(1, 7, true);
        }

        aln.remove_genome("A").unwrap();
        let r = aln.genome_mut("R").unwrap();
        assert_eq!(r.num_children(), 1);
        let rec = r.bottom_record(0).unwrap();
        assert_eq!(rec.children.len(), 1);
        // B's link moved from slot 1 to slot 0 with its flag intact.
        assert_eq!(rec.children[0].child_index, 7);
        assert!(rec.children[0].child_reversed);
    }

    #[test]
    fn validate_passes_for_consistent_tree() {
        let mut aln = Alignment::new();
        aln.add_root_genome("R", &[seq("s", 4, 0, 1)], true).unwrap();
        aln.add_child_genome("R", "L", 1.0, &[seq("s", 4, 1, 0)], true)
            .unwrap();
        assert!(aln.validate().is_ok());
    }
}
