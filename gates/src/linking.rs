//! Boolean references between gates.
//!
//! A boolean operand may live anywhere in the strategy, so these edges add
//! evaluation dependencies without changing subset semantics.

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Reverse index from a referenced population to the boolean gates using it.
///
/// # Example
///
/// ```rust
/// use flow_gating::GateLinks;
///
/// let mut links = GateLinks::new();
/// links.add_link("cd4", "cd4_or_cd8");
/// links.add_link("cd8", "cd4_or_cd8");
///
/// assert_eq!(links.linkers("cd4").collect::<Vec<_>>(), ["cd4_or_cd8"]);
/// assert!(!links.is_linked("cd3"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct GateLinks {
    referenced_by: FxHashMap<Arc<str>, Vec<Arc<str>>>,
}

impl GateLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `linker` reads `target`. Repeated pairs are stored once.
    pub fn add_link(&mut self, target: impl Into<Arc<str>>, linker: impl Into<Arc<str>>) {
        let linker = linker.into();
        let linkers = self.referenced_by.entry(target.into()).or_default();
        if !linkers.contains(&linker) {
            linkers.push(linker);
        }
    }

    /// Gates reading `target`, in the order they were linked
    pub fn linkers(&self, target: &str) -> impl Iterator<Item = &str> {
        self.referenced_by
            .get(target)
            .into_iter()
            .flatten()
            .map(|l| l.as_ref())
    }

    pub fn is_linked(&self, target: &str) -> bool {
        self.referenced_by.contains_key(target)
    }
}
