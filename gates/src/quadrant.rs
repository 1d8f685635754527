//! Quadrant gates: a plane (or higher-dimensional space) split by dividers
//! into named, mutually exclusive regions.
//!
//! Each divider carries one or more sorted cut values on its dimension. An
//! event falls into interval `k` of a divider when `cuts[k-1] <= v < cuts[k]`,
//! and belongs to the quadrant whose positions land in the same interval on
//! every divider. Events with a NaN coordinate belong to no quadrant.

use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::traits::GateValidation;
use itertools::Itertools;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantDivider {
    pub dimension: Dimension,
    pub cuts: Vec<f64>,
}

impl QuadrantDivider {
    pub fn new(dimension: Dimension, cuts: Vec<f64>) -> Self {
        Self { dimension, cuts }
    }

    /// Interval holding `value`, or `None` for NaN
    #[inline]
    pub fn interval(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        Some(self.cuts.partition_point(|&c| c <= value))
    }
}

/// A named region, located by one position per divider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrant {
    pub id: String,
    pub positions: Vec<f64>,
}

impl Quadrant {
    pub fn new(id: impl Into<String>, positions: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            positions,
        }
    }
}

/// Side of a single-cut divider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sign {
    Negative,
    Positive,
}

impl Sign {
    /// A finite position on this side of `cut`. Finite so definitions
    /// survive a JSON round trip.
    fn position(self, cut: f64) -> f64 {
        match self {
            Sign::Negative => cut - cut.abs().max(1.0),
            Sign::Positive => cut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantGate {
    pub dividers: Vec<QuadrantDivider>,
    pub quadrants: Vec<Quadrant>,
}

impl QuadrantGate {
    pub fn new(dividers: Vec<QuadrantDivider>, quadrants: Vec<Quadrant>) -> Result<Self> {
        let gate = Self {
            dividers,
            quadrants,
        };
        gate.validate()?;
        Ok(gate)
    }

    /// Classic two-divider form: one cut on each axis and quadrants named
    /// by their sign on x and y.
    pub fn two_way<S: Into<String>>(
        x: Dimension,
        x_cut: f64,
        y: Dimension,
        y_cut: f64,
        quadrants: impl IntoIterator<Item = (S, Sign, Sign)>,
    ) -> Result<Self> {
        let quadrants = quadrants
            .into_iter()
            .map(|(id, sx, sy)| Quadrant::new(id, vec![sx.position(x_cut), sy.position(y_cut)]))
            .collect();
        Self::new(
            vec![
                QuadrantDivider::new(x, vec![x_cut]),
                QuadrantDivider::new(y, vec![y_cut]),
            ],
            quadrants,
        )
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dividers.iter().map(|d| &d.dimension)
    }

    /// Interval index per divider for every quadrant
    fn quadrant_intervals(&self) -> Vec<Vec<Option<usize>>> {
        self.quadrants
            .iter()
            .map(|q| {
                self.dividers
                    .iter()
                    .zip(&q.positions)
                    .map(|(d, &p)| d.interval(p))
                    .collect()
            })
            .collect()
    }

    /// Build the per-event classifier. Columns are in divider order.
    pub fn locator(&self) -> QuadrantLocator<'_> {
        QuadrantLocator {
            gate: self,
            intervals: self.quadrant_intervals(),
        }
    }
}

/// Maps events to the index of the quadrant containing them
pub struct QuadrantLocator<'a> {
    gate: &'a QuadrantGate,
    intervals: Vec<Vec<Option<usize>>>,
}

impl QuadrantLocator<'_> {
    pub fn locate(&self, columns: &[ArrayView1<f64>], index: usize) -> Option<usize> {
        let event: Vec<Option<usize>> = self
            .gate
            .dividers
            .iter()
            .zip(columns)
            .map(|(d, column)| d.interval(column[index]))
            .collect();
        if event.iter().any(Option::is_none) {
            return None;
        }
        self.intervals.iter().position(|q| *q == event)
    }
}

impl GateValidation for QuadrantGate {
    fn validate(&self) -> Result<()> {
        if self.dividers.is_empty() {
            return Err(GatingError::invalid_geometry(
                "quadrant gate needs at least one divider",
            ));
        }
        for divider in &self.dividers {
            if divider.cuts.is_empty() || divider.cuts.iter().any(|c| !c.is_finite()) {
                return Err(GatingError::invalid_geometry(format!(
                    "divider on {} needs one or more finite cut values",
                    divider.dimension
                )));
            }
            if divider.cuts.iter().tuple_windows().any(|(a, b)| a >= b) {
                return Err(GatingError::invalid_geometry(format!(
                    "cut values of divider on {} must be strictly increasing",
                    divider.dimension
                )));
            }
        }
        if self.quadrants.is_empty() {
            return Err(GatingError::invalid_geometry(
                "quadrant gate needs at least one quadrant",
            ));
        }
        for quadrant in &self.quadrants {
            if quadrant.positions.len() != self.dividers.len() {
                return Err(GatingError::invalid_geometry(format!(
                    "quadrant '{}' has {} positions for {} dividers",
                    quadrant.id,
                    quadrant.positions.len(),
                    self.dividers.len()
                )));
            }
            if quadrant.positions.iter().any(|p| p.is_nan()) {
                return Err(GatingError::invalid_geometry(format!(
                    "quadrant '{}' has a NaN position",
                    quadrant.id
                )));
            }
        }
        let intervals = self.quadrant_intervals();
        if let Some((a, b)) = (0..intervals.len())
            .tuple_combinations()
            .find(|&(a, b)| intervals[a] == intervals[b])
        {
            return Err(GatingError::invalid_geometry(format!(
                "quadrants '{}' and '{}' cover the same region",
                self.quadrants[a].id, self.quadrants[b].id
            )));
        }
        Ok(())
    }
}
