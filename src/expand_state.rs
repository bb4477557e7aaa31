use std::collections::BTreeSet;

use crate::path::CanonicalPath;

/// Tracks which folders of one panel are expanded.
#[derive(Debug, Default, Clone)]
pub struct ExpansionState {
    expanded: BTreeSet<CanonicalPath>,
}

impl ExpansionState {
    pub fn expand(&mut self, path: &CanonicalPath) {
        self.expanded.insert(path.clone());
    }

    /// Remove this path and all descendants from the expanded set.
    pub fn collapse_recursive(&mut self, path: &CanonicalPath) {
        self.expanded.retain(|p| !p.is_same_or_descendant_of(path));
    }

    pub fn is_expanded(&self, path: &CanonicalPath) -> bool {
        self.expanded.contains(path)
    }

    /// Expanded folders strictly below `path`, parents before children.
    pub fn expanded_below(&self, path: &CanonicalPath) -> Vec<CanonicalPath> {
        let mut below: Vec<_> = self
            .expanded
            .iter()
            .filter(|p| p.is_descendant_of(path))
            .cloned()
            .collect();
        below.sort_by_key(|p| p.as_str().matches('/').count());
        below
    }

    pub fn forget(&mut self, path: &CanonicalPath) {
        self.expanded.remove(path);
    }
}
