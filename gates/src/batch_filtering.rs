//! Per-event batch operations over membership vectors.
//!
//! Predicates run on the rayon pool once a sample is large enough to make
//! the split worthwhile; below that they run inline.

use rayon::prelude::*;

/// Evaluate `f` for every event index, in order
pub fn map_events<T, F>(event_count: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..event_count).into_par_iter().map(f).collect()
    } else {
        (0..event_count).map(f).collect()
    }
}

/// Boolean mask of the events satisfying `predicate`
pub fn event_mask<F>(event_count: usize, parallel: bool, predicate: F) -> Vec<bool>
where
    F: Fn(usize) -> bool + Sync + Send,
{
    map_events(event_count, parallel, predicate)
}

/// Restrict `mask` to events also in `parent`
pub fn intersect(mask: &mut [bool], parent: &[bool]) {
    mask.iter_mut()
        .zip(parent)
        .for_each(|(m, &p)| *m = *m && p);
}

pub fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}
