//! Parent/child nesting of gate populations.

use crate::error::{GatingError, Result};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Nesting of populations under their parents.
///
/// The structure is a forest: populations without a parent hang off the
/// implicit "all events" root. Boolean references are tracked separately by
/// [`GateLinks`](crate::GateLinks), since they add evaluation dependencies
/// without narrowing the event set.
///
/// # Example
///
/// ```rust
/// use flow_gating::GateHierarchy;
///
/// let mut hierarchy = GateHierarchy::new();
/// hierarchy.add_child("cells", "singlets")?;
/// hierarchy.add_child("singlets", "live")?;
///
/// let ancestors: Vec<&str> = hierarchy.ancestors("live").collect();
/// assert_eq!(ancestors, ["singlets", "cells"]);
/// assert_eq!(hierarchy.depth("live"), 3);
///
/// assert!(hierarchy.add_child("live", "cells").is_err());
/// # Ok::<(), flow_gating::GatingError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct GateHierarchy {
    parent_of: FxHashMap<Arc<str>, Arc<str>>,
    /// Children in insertion order
    children_of: FxHashMap<Arc<str>, Vec<Arc<str>>>,
}

/// Walks from a population up to its top-level ancestor
pub struct Ancestors<'a> {
    hierarchy: &'a GateHierarchy,
    current: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let parent = self.hierarchy.parent(self.current?);
        self.current = parent;
        parent
    }
}

impl GateHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nest `child` under `parent`. A child that already had a parent is moved.
    ///
    /// Fails without changing anything if `parent` is `child` itself or one
    /// of its descendants.
    pub fn add_child(
        &mut self,
        parent: impl Into<Arc<str>>,
        child: impl Into<Arc<str>>,
    ) -> Result<()> {
        let parent = parent.into();
        let child = child.into();

        if parent == child || self.ancestors(&parent).any(|a| *a == *child) {
            return Err(GatingError::invalid_hierarchy(format!(
                "'{child}' cannot be nested under '{parent}': cyclic parent relationship"
            )));
        }

        if let Some(previous) = self.parent_of.insert(child.clone(), parent.clone()) {
            if let Some(siblings) = self.children_of.get_mut(&previous) {
                siblings.retain(|c| *c != child);
            }
        }
        self.children_of.entry(parent).or_default().push(child);
        Ok(())
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.parent_of.get(id).map(|p| p.as_ref())
    }

    pub fn children(&self, id: &str) -> &[Arc<str>] {
        self.children_of.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Closest first
    pub fn ancestors<'a>(&'a self, id: &'a str) -> Ancestors<'a> {
        Ancestors {
            hierarchy: self,
            current: Some(id),
        }
    }

    /// Every population below `id`, depth first in insertion order
    pub fn descendants(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.children(id).iter().rev().map(|c| c.as_ref()).collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().map(|c| c.as_ref()));
        }
        out
    }

    /// The all-events root has depth 0, so a top-level population has depth 1
    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).count() + 1
    }

    pub fn is_root(&self, id: &str) -> bool {
        !self.parent_of.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> GateHierarchy {
        let mut h = GateHierarchy::new();
        h.add_child("cells", "singlets").unwrap();
        h.add_child("singlets", "live").unwrap();
        h.add_child("singlets", "dead").unwrap();
        h
    }

    #[test]
    fn test_nesting() {
        let h = chain();
        assert_eq!(h.parent("live"), Some("singlets"));
        assert_eq!(h.parent("cells"), None);
        assert!(h.is_root("cells"));
        assert!(!h.is_root("dead"));
        let children: Vec<&str> = h.children("singlets").iter().map(|c| c.as_ref()).collect();
        assert_eq!(children, ["live", "dead"]);
        assert!(h.children("live").is_empty());
    }

    #[test]
    fn test_depth_counts_the_root() {
        let h = chain();
        assert_eq!(h.depth("cells"), 1);
        assert_eq!(h.depth("live"), 3);
        assert_eq!(h.ancestors("live").collect::<Vec<_>>(), ["singlets", "cells"]);
    }

    #[test]
    fn test_descendants_depth_first() {
        let mut h = chain();
        h.add_child("live", "cd3").unwrap();
        assert_eq!(h.descendants("cells"), ["singlets", "live", "cd3", "dead"]);
    }

    #[test]
    fn test_cycles_rejected() {
        let mut h = chain();
        assert!(matches!(
            h.add_child("live", "cells"),
            Err(GatingError::InvalidHierarchy { .. })
        ));
        assert!(h.add_child("live", "live").is_err());
        // unchanged after the failed insert
        assert!(h.is_root("cells"));
    }

    #[test]
    fn test_moving_a_child() {
        let mut h = chain();
        h.add_child("cells", "dead").unwrap();
        assert_eq!(h.children("singlets").len(), 1);
        assert_eq!(h.parent("dead"), Some("cells"));
        assert_eq!(h.depth("dead"), 2);
    }
}
