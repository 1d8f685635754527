//! Interval gates: one-dimensional ranges and axis-aligned boxes.
//!
//! Bounds are closed on both ends; a missing bound leaves that side open.
//! NaN coordinates fail every comparison and are never inside.

use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::traits::{GateContainment, GateValidation};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Optional bounds on one dimension
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Bounds {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        !value.is_nan()
            && self.min.is_none_or(|min| value >= min)
            && self.max.is_none_or(|max| value <= max)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.min.is_none() && self.max.is_none() {
            return Err(GatingError::invalid_geometry(
                "at least one of min and max is required",
            ));
        }
        if self.min.is_some_and(f64::is_nan) || self.max.is_some_and(f64::is_nan) {
            return Err(GatingError::invalid_geometry("bounds must not be NaN"));
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(GatingError::invalid_geometry(format!(
                    "min {min} is greater than max {max}"
                )));
            }
        }
        Ok(())
    }
}

/// 1-D interval gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeGate {
    pub dimension: Dimension,
    #[serde(flatten)]
    pub bounds: Bounds,
}

impl RangeGate {
    pub fn new(dimension: Dimension, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        let gate = Self {
            dimension,
            bounds: Bounds::new(min, max),
        };
        gate.validate()?;
        Ok(gate)
    }
}

impl GateContainment for RangeGate {
    fn contains_event(&self, columns: &[ArrayView1<f64>], index: usize) -> bool {
        self.bounds.contains(columns[0][index])
    }
}

impl GateValidation for RangeGate {
    fn validate(&self) -> Result<()> {
        self.bounds.check()
    }
}

/// Axis-aligned box with independent bounds per dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleGate {
    pub dimensions: Vec<Dimension>,
    pub bounds: Vec<Bounds>,
}

impl RectangleGate {
    pub fn new(dimensions: Vec<Dimension>, bounds: Vec<Bounds>) -> Result<Self> {
        let gate = Self { dimensions, bounds };
        gate.validate()?;
        Ok(gate)
    }
}

impl GateContainment for RectangleGate {
    fn contains_event(&self, columns: &[ArrayView1<f64>], index: usize) -> bool {
        self.bounds
            .iter()
            .zip(columns)
            .all(|(bounds, column)| bounds.contains(column[index]))
    }
}

impl GateValidation for RectangleGate {
    fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(GatingError::invalid_geometry(
                "rectangle gate needs at least one dimension",
            ));
        }
        if self.dimensions.len() != self.bounds.len() {
            return Err(GatingError::invalid_geometry(format!(
                "rectangle gate has {} dimensions but {} bounds",
                self.dimensions.len(),
                self.bounds.len()
            )));
        }
        self.bounds.iter().try_for_each(Bounds::check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_range_closed_bounds() {
        let gate = RangeGate::new(Dimension::new("x"), Some(2.0), Some(5.0)).unwrap();
        let column = array![2.0, 5.0, 1.999999, 5.000001, 3.5, f64::NAN];
        let views = [column.view()];
        let inside: Vec<bool> = (0..column.len())
            .map(|i| gate.contains_event(&views, i))
            .collect();
        assert_eq!(inside, vec![true, true, false, false, true, false]);
    }

    #[test]
    fn test_range_open_side() {
        let gate = RangeGate::new(Dimension::new("x"), None, Some(0.0)).unwrap();
        let column = array![-1.0e300, 0.0, 0.1];
        let views = [column.view()];
        assert!(gate.contains_event(&views, 0));
        assert!(gate.contains_event(&views, 1));
        assert!(!gate.contains_event(&views, 2));
    }

    #[test]
    fn test_rectangle_requires_matching_bounds() {
        let err = RectangleGate::new(
            vec![Dimension::new("x"), Dimension::new("y")],
            vec![Bounds::between(0.0, 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, GatingError::InvalidGateGeometry { .. }));

        assert!(RangeGate::new(Dimension::new("x"), Some(3.0), Some(1.0)).is_err());
        assert!(RangeGate::new(Dimension::new("x"), None, None).is_err());
    }

    #[test]
    fn test_rectangle_contains() {
        let gate = RectangleGate::new(
            vec![Dimension::new("x"), Dimension::new("y")],
            vec![Bounds::between(2.0, 10.0), Bounds::new(Some(2.0), None)],
        )
        .unwrap();
        let x = array![1.0, 3.0, 6.0, 11.0];
        let y = array![1.0, 3.0, 600.0, 3.0];
        let views = [x.view(), y.view()];
        let inside: Vec<bool> = (0..4).map(|i| gate.contains_event(&views, i)).collect();
        assert_eq!(inside, vec![false, true, true, false]);
    }
}
