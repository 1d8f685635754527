//! Ellipsoid gates in any number of dimensions.
//!
//! An event `x` is inside when `(x − μ)ᵀ Σ⁻¹ (x − μ) ≤ d²`. The inverse
//! covariance is computed once, when the gate is built or deserialized.

use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::traits::{GateContainment, GateValidation};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EllipsoidDef", into = "EllipsoidDef")]
pub struct EllipsoidGate {
    dimensions: Vec<Dimension>,
    mean: Vec<f64>,
    covariance: Array2<f64>,
    distance_square: f64,
    inverse: Array2<f64>,
}

#[derive(Serialize, Deserialize)]
struct EllipsoidDef {
    dimensions: Vec<Dimension>,
    mean: Vec<f64>,
    /// Row-major covariance matrix
    covariance: Vec<Vec<f64>>,
    distance_square: f64,
}

impl EllipsoidGate {
    pub fn new(
        dimensions: Vec<Dimension>,
        mean: Vec<f64>,
        covariance: Array2<f64>,
        distance_square: f64,
    ) -> Result<Self> {
        let n = dimensions.len();
        if n < 2 {
            return Err(GatingError::invalid_geometry(
                "ellipsoid gate needs at least two dimensions",
            ));
        }
        if mean.len() != n || covariance.nrows() != n || covariance.ncols() != n {
            return Err(GatingError::invalid_geometry(format!(
                "ellipsoid over {n} dimensions needs a mean of length {n} and a {n}x{n} covariance"
            )));
        }
        if !(distance_square.is_finite() && distance_square > 0.0) {
            return Err(GatingError::invalid_geometry(
                "distance square must be positive",
            ));
        }
        if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(GatingError::invalid_geometry(
                "ellipsoid mean and covariance must be finite",
            ));
        }
        let inverse = invert_covariance(&covariance)?;
        Ok(Self {
            dimensions,
            mean,
            covariance,
            distance_square,
            inverse,
        })
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    pub fn distance_square(&self) -> f64 {
        self.distance_square
    }

    /// Squared Mahalanobis distance of event `index` from the mean
    fn distance_squared_at(&self, columns: &[ArrayView1<f64>], index: usize) -> f64 {
        let n = self.mean.len();
        let mut total = 0.0;
        for j in 0..n {
            let dj = columns[j][index] - self.mean[j];
            for k in 0..n {
                let dk = columns[k][index] - self.mean[k];
                total += dj * self.inverse[[j, k]] * dk;
            }
        }
        total
    }
}

fn invert_covariance(covariance: &Array2<f64>) -> Result<Array2<f64>> {
    use ndarray_linalg::Inverse;
    let inverse = covariance.inv().map_err(|e| {
        GatingError::invalid_geometry(format!("covariance matrix is not invertible: {e}"))
    })?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(GatingError::invalid_geometry(
            "covariance matrix is not invertible",
        ));
    }
    Ok(inverse)
}

impl GateContainment for EllipsoidGate {
    fn contains_event(&self, columns: &[ArrayView1<f64>], index: usize) -> bool {
        // NaN distances compare false
        self.distance_squared_at(columns, index) <= self.distance_square
    }
}

impl GateValidation for EllipsoidGate {
    fn validate(&self) -> Result<()> {
        // all checks run at construction
        Ok(())
    }
}

impl PartialEq for EllipsoidGate {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions == other.dimensions
            && self.mean == other.mean
            && self.covariance == other.covariance
            && self.distance_square == other.distance_square
    }
}

impl TryFrom<EllipsoidDef> for EllipsoidGate {
    type Error = GatingError;

    fn try_from(def: EllipsoidDef) -> Result<Self> {
        let n = def.covariance.len();
        if def.covariance.iter().any(|row| row.len() != n) {
            return Err(GatingError::invalid_geometry("covariance matrix must be square"));
        }
        let covariance = Array2::from_shape_vec((n, n), def.covariance.into_iter().flatten().collect())
            .map_err(|e| GatingError::invalid_geometry(e.to_string()))?;
        Self::new(def.dimensions, def.mean, covariance, def.distance_square)
    }
}

impl From<EllipsoidGate> for EllipsoidDef {
    fn from(gate: EllipsoidGate) -> Self {
        EllipsoidDef {
            covariance: gate.covariance.rows().into_iter().map(|r| r.to_vec()).collect(),
            dimensions: gate.dimensions,
            mean: gate.mean,
            distance_square: gate.distance_square,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn dims() -> Vec<Dimension> {
        vec![Dimension::new("x"), Dimension::new("y")]
    }

    #[test]
    fn test_axis_aligned_ellipse() {
        // semi-axes 5 (x) and 3 (y)
        let gate =
            EllipsoidGate::new(dims(), vec![5.0, 5.0], array![[25.0, 0.0], [0.0, 9.0]], 1.0).unwrap();
        let x = array![5.0, 10.0, 5.0, 10.1, 5.0];
        let y = array![5.0, 5.0, 8.0, 5.0, 8.1];
        let views = [x.view(), y.view()];
        let inside: Vec<bool> = (0..5).map(|i| gate.contains_event(&views, i)).collect();
        assert_eq!(inside, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_correlated_covariance() {
        let gate =
            EllipsoidGate::new(dims(), vec![0.0, 0.0], array![[2.0, 1.9], [1.9, 2.0]], 1.0).unwrap();
        let x = array![1.0, 1.0];
        let y = array![1.0, -1.0];
        let views = [x.view(), y.view()];
        // along the major axis vs across it
        assert!(gate.contains_event(&views, 0));
        assert!(!gate.contains_event(&views, 1));
    }

    #[test]
    fn test_singular_covariance_rejected() {
        let err = EllipsoidGate::new(dims(), vec![0.0, 0.0], array![[1.0, 2.0], [2.0, 4.0]], 1.0)
            .unwrap_err();
        assert!(matches!(err, GatingError::InvalidGateGeometry { .. }));
    }

    fn dims3() -> Vec<Dimension> {
        vec![Dimension::new("x"), Dimension::new("y"), Dimension::new("z")]
    }

    #[test]
    fn test_three_dimensional_ellipsoid() {
        // semi-axes 1, 2 and 4 around (1, 1, 1)
        let gate = EllipsoidGate::new(
            dims3(),
            vec![1.0, 1.0, 1.0],
            array![[1.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 16.0]],
            1.0,
        )
        .unwrap();
        let x = array![1.0, 2.0, 1.0, 1.0, 1.5, 1.0, 1.8];
        let y = array![1.0, 1.0, 3.0, 1.0, 2.0, 1.0, 2.6];
        let z = array![1.0, 1.0, 1.0, -3.0, 3.0, 5.1, 1.0];
        let views = [x.view(), y.view(), z.view()];
        let inside: Vec<bool> = (0..7).map(|i| gate.contains_event(&views, i)).collect();
        assert_eq!(inside, vec![true, true, true, true, true, false, false]);
        assert_relative_eq!(gate.distance_squared_at(&views, 4), 0.75);
    }

    #[test]
    fn test_three_dimensional_correlated() {
        let gate = EllipsoidGate::new(
            dims3(),
            vec![0.0, 0.0, 0.0],
            array![[2.0, 1.9, 0.0], [1.9, 2.0, 0.0], [0.0, 0.0, 1.0]],
            1.0,
        )
        .unwrap();
        let x = array![1.0, 1.0];
        let y = array![1.0, -1.0];
        let z = array![0.5, 0.0];
        let views = [x.view(), y.view(), z.view()];
        assert!(gate.contains_event(&views, 0));
        assert!(!gate.contains_event(&views, 1));
    }

    #[test]
    fn test_singular_three_dimensional_covariance_rejected() {
        // second row is twice the first
        let err = EllipsoidGate::new(
            dims3(),
            vec![0.0, 0.0, 0.0],
            array![[2.0, 1.0, 0.0], [4.0, 2.0, 0.0], [0.0, 0.0, 1.0]],
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, GatingError::InvalidGateGeometry { .. }));

        let shape = EllipsoidGate::new(dims3(), vec![0.0, 0.0], array![[1.0, 0.0], [0.0, 1.0]], 1.0)
            .unwrap_err();
        assert!(matches!(shape, GatingError::InvalidGateGeometry { .. }));
    }

    #[test]
    fn test_serde_round_trip_rebuilds_inverse() {
        let gate =
            EllipsoidGate::new(dims(), vec![1.0, 2.0], array![[4.0, 0.0], [0.0, 1.0]], 2.0).unwrap();
        let json = serde_json::to_string(&gate).unwrap();
        let back: EllipsoidGate = serde_json::from_str(&json).unwrap();
        assert_eq!(gate, back);
    }
}
