//! Input file trees
//!
//! A CWL binding may attach `secondaryFiles` to every File, and those may in
//! turn carry their own. The tree is kept in an arena: nodes live in one
//! vector and refer to their secondary files by [`FileId`]. A node is always
//! allocated before its children, so ids strictly increase along every edge
//! and the structure cannot contain a cycle.

use serde::{Deserialize, Serialize};

/// Index of a node in an [`InputFiles`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A file referenced by a binding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputFile {
    /// Binding key; `None` for secondary files
    pub name: Option<String>,
    /// URI of the file; local before staging, remote after
    pub location: String,
    /// Inline content, for sources that were fetched rather than copied
    pub content: Option<Vec<u8>>,
    /// Position within an array-valued binding entry
    pub index: Option<usize>,
    /// Absolute path to copy the file from
    pub source: Option<String>,
    pub secondary_files: Vec<FileId>,
}

impl InputFile {
    pub fn new(name: Option<String>, location: String, index: Option<usize>) -> Self {
        Self {
            name,
            location,
            index,
            ..Default::default()
        }
    }
}

/// Arena of input files together with the ordered list of top-level ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFiles {
    nodes: Vec<InputFile>,
    roots: Vec<FileId>,
}

impl InputFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a node and returns its id
    pub fn insert(&mut self, file: InputFile) -> FileId {
        self.nodes.push(file);
        FileId(self.nodes.len() - 1)
    }

    /// Allocates a top-level node
    pub fn push_root(&mut self, file: InputFile) -> FileId {
        let id = self.insert(file);
        self.roots.push(id);
        id
    }

    /// Top-level files in binding order
    pub fn roots(&self) -> &[FileId] {
        &self.roots
    }

    pub fn get(&self, id: FileId) -> &InputFile {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut InputFile {
        &mut self.nodes[id.0]
    }

    /// Number of files in the arena, secondary files included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter_roots(&self) -> impl Iterator<Item = &InputFile> {
        self.roots.iter().map(|id| self.get(*id))
    }

    /// Visits `root` and all its secondary files depth-first, parent
    /// before children, children in declaration order.
    pub fn depth_first(&self, root: FileId) -> Vec<FileId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.get(id).secondary_files.iter().rev().copied());
        }
        order
    }

    /// Checks the arena invariant: every edge points to a later node and
    /// every node except the roots has exactly one parent.
    pub fn is_well_formed(&self) -> bool {
        let mut parents = vec![0usize; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            for child in &node.secondary_files {
                if child.0 <= idx || child.0 >= self.nodes.len() {
                    return false;
                }
                parents[child.0] += 1;
            }
        }
        for root in &self.roots {
            if parents[root.0] != 0 {
                return false;
            }
            parents[root.0] = 1;
        }
        parents.iter().all(|count| *count == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (InputFiles, FileId) {
        let mut files = InputFiles::new();
        let root = files.push_root(InputFile::new(Some("a".into()), "f".into(), None));
        let s1 = files.insert(InputFile::new(None, "s1".into(), None));
        let s2 = files.insert(InputFile::new(None, "s2".into(), None));
        let s11 = files.insert(InputFile::new(None, "s11".into(), None));
        files.get_mut(root).secondary_files = vec![s1, s2];
        files.get_mut(s1).secondary_files = vec![s11];
        (files, root)
    }

    #[test]
    fn test_depth_first_order() {
        let (files, root) = tree();
        let locations: Vec<&str> = files
            .depth_first(root)
            .into_iter()
            .map(|id| files.get(id).location.as_str())
            .collect();
        assert_eq!(locations, vec!["f", "s1", "s11", "s2"]);
    }

    #[test]
    fn test_well_formed() {
        let (files, _) = tree();
        assert!(files.is_well_formed());
    }

    #[test]
    fn test_backward_edge_is_rejected() {
        let (mut files, root) = tree();
        let last = FileId(files.len() - 1);
        files.get_mut(last).secondary_files.push(root);
        assert!(!files.is_well_formed());
    }
}
