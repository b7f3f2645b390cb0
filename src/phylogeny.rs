//! In-memory phylogenetic tree structure.
//!
//! Newick parsing is an external collaborator referenced only via the
//! [`NewickSource`] trait seam: this crate never parses newick text itself.
//! A [`Phylogeny`] is built programmatically by `Alignment`'s
//! `add_root`/`add_child` methods, which is exactly what a caller-supplied
//! newick parser would drive it through after reading a tree string.

use std::collections::HashMap;

use crate::error::{HalError, HalResult};

/// Seam for an external newick parser to populate a [`Phylogeny`] without
/// this crate depending on a newick grammar. Not implemented here.
pub trait NewickSource {
    /// Parse a newick string into (parent, child, branch_length) edges in
    /// top-down order, root first.
    fn parse(&self, newick: &str) -> HalResult<Vec<(Option<String>, String, f64)>>;
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<String>,
    children: Vec<String>,
    branch_length: Option<f64>,
}

/// A rooted tree of genome names with non-negative branch lengths on every
/// non-root edge.
#[derive(Debug, Clone, Default)]
pub struct Phylogeny {
    nodes: HashMap<String, Node>,
    root: Option<String>,
}

impl Phylogeny {
    /// An empty phylogeny with no genomes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the root genome. Fails if a root already exists.
    pub fn add_root(&mut self, name: impl Into<String>) -> HalResult<()> {
        let name = name.into();
        if self.root.is_some() {
            return Err(HalError::InvalidArgument(
                "phylogeny already has a root".to_string(),
            ));
        }
        if self.nodes.contains_key(&name) {
            return Err(HalError::InvalidArgument(format!(
                "genome name {name} already exists"
            )));
        }
        self.nodes.insert(
            name.clone(),
            Node {
                parent: None,
                children: Vec::new(),
                branch_length: None,
            },
        );
        self.root = Some(name);
        Ok(())
    }

    /// Add `child` below `parent` with a non-negative branch length.
    pub fn add_child(
        &mut self,
        parent: &str,
        child: impl Into<String>,
        branch_length: f64,
    ) -> HalResult<()> {
        let child = child.into();
        if !self.nodes.contains_key(parent) {
            return Err(HalError::NotFound(format!("genome {parent}")));
        }
        if self.nodes.contains_key(&child) {
            return Err(HalError::InvalidArgument(format!(
                "genome name {child} already exists"
            )));
        }
        if branch_length < 0.0 {
            return Err(HalError::InvalidArgument(
                "branch length must be non-negative".to_string(),
            ));
        }
        self.nodes.insert(
            child.clone(),
            Node {
                parent: Some(parent.to_string()),
                children: Vec::new(),
                branch_length: Some(branch_length),
            },
        );
        self.nodes.get_mut(parent).unwrap().children.push(child);
        Ok(())
    }

    /// Detach a leaf-like genome: `name` must have no children. `name`'s
    /// parent loses that child slot.
    pub fn remove(&mut self, name: &str) -> HalResult<()> {
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| HalError::NotFound(format!("genome {name}")))?;
        if !node.children.is_empty() {
            return Err(HalError::InvalidArgument(format!(
                "cannot remove {name}: it has children"
            )));
        }
        let parent = node.parent.clone();
        self.nodes.remove(name);
        if let Some(parent) = parent {
            self.nodes
                .get_mut(&parent)
                .unwrap()
                .children
                .retain(|c| c != name);
        } else {
            self.root = None;
        }
        Ok(())
    }

    /// Root genome name, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Whether `name` is a known genome.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Parent genome name, or `None` for the root.
    pub fn parent(&self, name: &str) -> HalResult<Option<&str>> {
        self.node(name).map(|n| n.parent.as_deref())
    }

    /// Child genome names, in insertion order.
    pub fn children(&self, name: &str) -> HalResult<&[String]> {
        self.node(name).map(|n| n.children.as_slice())
    }

    /// Branch length above `name`. `None` for the root.
    pub fn branch_length(&self, name: &str) -> HalResult<Option<f64>> {
        self.node(name).map(|n| n.branch_length)
    }

    /// Whether `name` is a leaf (no children).
    pub fn is_leaf(&self, name: &str) -> HalResult<bool> {
        self.node(name).map(|n| n.children.is_empty())
    }

    /// All genome names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    fn node(&self, name: &str) -> HalResult<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| HalError::NotFound(format!("genome {name}")))
    }

    /// Path from `name` up to the root, inclusive of both endpoints.
    pub fn path_to_root(&self, name: &str) -> HalResult<Vec<String>> {
        let mut path = vec![name.to_string()];
        let mut cur = name.to_string();
        while let Some(parent) = self.parent(&cur)? {
            path.push(parent.to_string());
            cur = parent.to_string();
        }
        Ok(path)
    }

    /// Most recent common ancestor of `a` and `b`.
    pub fn mrca(&self, a: &str, b: &str) -> HalResult<String> {
        let path_a = self.path_to_root(a)?;
        let path_b: std::collections::HashSet<_> = self.path_to_root(b)?.into_iter().collect();
        path_a
            .into_iter()
            .find(|n| path_b.contains(n))
            .ok_or_else(|| HalError::Inconsistent(format!("no common ancestor of {a} and {b}")))
    }

    /// All genome names on the path from `ancestor` down to `descendant`,
    /// inclusive, assuming `ancestor` actually sits above `descendant`.
    pub fn path_down(&self, ancestor: &str, descendant: &str) -> HalResult<Vec<String>> {
        let mut path = self.path_to_root(descendant)?;
        let pos = path
            .iter()
            .position(|n| n == ancestor)
            .ok_or_else(|| {
                HalError::Inconsistent(format!("{ancestor} is not an ancestor of {descendant}"))
            })?;
        path.truncate(pos + 1);
        path.reverse();
        Ok(path)
    }

    /// Validate the tree: unique names (guaranteed by construction), exactly
    /// one root, connected, and every non-root node has a branch length.
    pub fn validate(&self) -> HalResult<()> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| HalError::Inconsistent("phylogeny has no root".to_string()))?;
        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            for child in self.children(&name)? {
                if self.branch_length(child)?.is_none() {
                    return Err(HalError::Inconsistent(format!(
                        "non-root genome {child} has no branch length"
                    )));
                }
                stack.push(child.clone());
            }
        }
        if visited.len() != self.nodes.len() {
            return Err(HalError::Inconsistent(
                "phylogeny is not connected".to_string(),
            ));
        }
        Ok(())
    }
}
