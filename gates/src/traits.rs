use crate::error::Result;
use ndarray::ArrayView1;

/// Trait for gate types whose membership is a per-event test over
/// extracted dimension columns
pub trait GateContainment {
    /// Check whether event `index` is inside, given one column per dimension
    fn contains_event(&self, columns: &[ArrayView1<f64>], index: usize) -> bool;
}

/// Trait for gate types that can be validated
pub trait GateValidation {
    /// Reject degenerate definitions before any events are seen
    fn validate(&self) -> Result<()>;
}
