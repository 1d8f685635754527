//! Spillover compensation
//!
//! A [`CompensationMatrix`] holds the spillover coefficients between an
//! ordered set of detectors. Compensating events solves the linear unmixing
//! `compensated · spill = raw` for the detector columns, i.e.
//! `compensated = raw · spill⁻¹`; the inverse operation multiplies back by
//! the spillover matrix.

use crate::channels::ChannelMap;
use crate::error::{Result, TransformError};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Matrix helpers shared by compensation and its benchmarks
pub struct MatrixOps;

impl MatrixOps {
    /// Invert a square matrix with LAPACK, rejecting singular input
    pub fn invert_matrix(matrix_id: &str, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        use ndarray_linalg::Inverse;
        let inverse = matrix
            .inv()
            .map_err(|e| TransformError::SingularMatrix {
                matrix_id: matrix_id.to_string(),
                message: e.to_string(),
            })?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::SingularMatrix {
                matrix_id: matrix_id.to_string(),
                message: "inverse contains non-finite values".to_string(),
            });
        }
        Ok(inverse)
    }

    /// Multiply the selected event columns by `matrix`, one output column per
    /// rayon task.
    ///
    /// Input: events [n_events × n_channels], columns (len n), matrix [n × n]
    /// Output: [n_events × n]
    pub fn multiply_columns(
        events: ArrayView2<f64>,
        columns: &[usize],
        matrix: &Array2<f64>,
    ) -> Vec<Array1<f64>> {
        let selected = events.select(Axis(1), columns);
        (0..columns.len())
            .into_par_iter()
            .map(|k| selected.dot(&matrix.column(k)))
            .collect()
    }
}

/// Spillover matrix tied to an ordered list of detector channels
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "CompensationMatrixDef", into = "CompensationMatrixDef")]
pub struct CompensationMatrix {
    id: String,
    detectors: Vec<String>,
    fluorochromes: Vec<String>,
    spill: Array2<f64>,
    inverse: Array2<f64>,
}

/// Serialized form of a [`CompensationMatrix`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompensationMatrixDef {
    pub id: String,
    pub detectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluorochromes: Option<Vec<String>>,
    /// Row-major spillover coefficients
    pub matrix: Vec<Vec<f64>>,
    /// Collected detectors without useful signal, dropped with their rows
    /// and columns before inversion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub null_channels: Vec<String>,
}

/// Read-only tabular view of a matrix for reports
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompensationTable {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl CompensationMatrix {
    /// Build a matrix; fluorochrome labels default to empty strings.
    pub fn new(
        id: impl Into<String>,
        detectors: Vec<String>,
        fluorochromes: Option<Vec<String>>,
        spill: Array2<f64>,
    ) -> Result<Self> {
        let id = id.into();
        let n = detectors.len();
        if spill.nrows() != n || spill.ncols() != n {
            return Err(TransformError::shape_mismatch(format!(
                "matrix '{id}' is {}x{} but has {n} detectors",
                spill.nrows(),
                spill.ncols()
            )));
        }
        let mut seen = FxHashSet::with_capacity_and_hasher(n, Default::default());
        if let Some(dup) = detectors.iter().find(|d| !seen.insert(d.as_str())) {
            return Err(TransformError::DuplicateChannel {
                channel: dup.clone(),
            });
        }
        let fluorochromes = fluorochromes.unwrap_or_else(|| vec![String::new(); n]);
        if fluorochromes.len() != n {
            return Err(TransformError::shape_mismatch(format!(
                "matrix '{id}' has {} fluorochrome labels for {n} detectors",
                fluorochromes.len()
            )));
        }
        let inverse = MatrixOps::invert_matrix(&id, &spill)?;
        Ok(Self {
            id,
            detectors,
            fluorochromes,
            spill,
            inverse,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn detectors(&self) -> &[String] {
        &self.detectors
    }

    pub fn fluorochromes(&self) -> &[String] {
        &self.fluorochromes
    }

    pub fn spill(&self) -> &Array2<f64> {
        &self.spill
    }

    /// Copy of this matrix without the named null channels.
    ///
    /// Each dropped detector loses its fluorochrome label and its spillover
    /// row and column. Names that are not detectors are ignored.
    pub fn without_channels<S: AsRef<str>>(&self, null_channels: &[S]) -> Result<Self> {
        let (detectors, fluorochromes, spill) = drop_null_channels(
            self.detectors.clone(),
            Some(self.fluorochromes.clone()),
            &self.spill,
            null_channels,
        );
        Self::new(self.id.clone(), detectors, fluorochromes, spill)
    }

    /// Position of a channel among this matrix's detectors
    pub fn detector_position(&self, channel: &str) -> Option<usize> {
        self.detectors.iter().position(|d| d == channel)
    }

    /// Resolve the detectors to event-matrix columns, in detector order.
    ///
    /// Every detector must be a fluorescence channel of the sample.
    pub fn detector_indices(&self, channels: &ChannelMap) -> Result<Vec<usize>> {
        let fluoro: FxHashSet<&str> = channels.fluoro_labels().collect();
        let missing: Vec<String> = self
            .detectors
            .iter()
            .filter(|d| !fluoro.contains(d.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TransformError::ChannelMismatch { missing });
        }
        self.detectors
            .iter()
            .map(|d| channels.resolve(d))
            .collect()
    }

    /// Compensate the events of a sample, returning a new matrix.
    pub fn apply(&self, events: ArrayView2<f64>, channels: &ChannelMap) -> Result<Array2<f64>> {
        check_width(events, channels)?;
        let indices = self.detector_indices(channels)?;
        self.apply_at(events, &indices)
    }

    /// Undo compensation, recovering raw events.
    pub fn inverse(&self, events: ArrayView2<f64>, channels: &ChannelMap) -> Result<Array2<f64>> {
        check_width(events, channels)?;
        let indices = self.detector_indices(channels)?;
        self.inverse_at(events, &indices)
    }

    /// Compensate with pre-resolved detector columns.
    pub fn apply_at(&self, events: ArrayView2<f64>, indices: &[usize]) -> Result<Array2<f64>> {
        self.multiply_into(events, indices, &self.inverse)
    }

    pub fn inverse_at(&self, events: ArrayView2<f64>, indices: &[usize]) -> Result<Array2<f64>> {
        self.multiply_into(events, indices, &self.spill)
    }

    /// Compensated values of the single detector at `position`.
    ///
    /// Needs every detector column, since spillover mixes all of them.
    pub fn compensate_column(
        &self,
        events: ArrayView2<f64>,
        indices: &[usize],
        position: usize,
    ) -> Result<Array1<f64>> {
        self.check_indices(events, indices)?;
        if position >= self.detectors.len() {
            return Err(TransformError::shape_mismatch(format!(
                "detector position {position} out of range for matrix '{}'",
                self.id
            )));
        }
        let selected = events.select(Axis(1), indices);
        Ok(selected.dot(&self.inverse.column(position)))
    }

    pub fn as_table(&self, use_fluoro_labels: bool) -> CompensationTable {
        let labels = if use_fluoro_labels {
            self.fluorochromes.clone()
        } else {
            self.detectors.clone()
        };
        CompensationTable {
            labels,
            rows: self.spill.rows().into_iter().map(|r| r.to_vec()).collect(),
        }
    }

    fn multiply_into(
        &self,
        events: ArrayView2<f64>,
        indices: &[usize],
        matrix: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        self.check_indices(events, indices)?;
        let columns = MatrixOps::multiply_columns(events, indices, matrix);
        let mut out = events.to_owned();
        for (&col, values) in indices.iter().zip(columns) {
            out.column_mut(col).assign(&values);
        }
        Ok(out)
    }

    fn check_indices(&self, events: ArrayView2<f64>, indices: &[usize]) -> Result<()> {
        if indices.len() != self.detectors.len() {
            return Err(TransformError::shape_mismatch(format!(
                "matrix '{}' needs {} detector columns, got {}",
                self.id,
                self.detectors.len(),
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= events.ncols()) {
            return Err(TransformError::shape_mismatch(format!(
                "column {bad} out of range for {} event columns",
                events.ncols()
            )));
        }
        Ok(())
    }
}

type Retained = (Vec<String>, Option<Vec<String>>, Array2<f64>);

fn drop_null_channels<S: AsRef<str>>(
    detectors: Vec<String>,
    fluorochromes: Option<Vec<String>>,
    spill: &Array2<f64>,
    null_channels: &[S],
) -> Retained {
    let null: FxHashSet<&str> = null_channels.iter().map(AsRef::as_ref).collect();
    let keep: Vec<usize> = detectors
        .iter()
        .enumerate()
        .filter(|(_, d)| !null.contains(d.as_str()))
        .map(|(i, _)| i)
        .collect();
    if keep.len() == detectors.len() {
        return (detectors, fluorochromes, spill.clone());
    }
    let n = detectors.len();
    let pick = |labels: Vec<String>| -> Vec<String> {
        keep.iter().map(|&i| labels[i].clone()).collect()
    };
    // mislabelled input is left for `CompensationMatrix::new` to reject
    let fluorochromes = fluorochromes.map(|f| if f.len() == n { pick(f) } else { f });
    let spill = spill.select(Axis(0), &keep).select(Axis(1), &keep);
    (pick(detectors), fluorochromes, spill)
}

fn check_width(events: ArrayView2<f64>, channels: &ChannelMap) -> Result<()> {
    if events.ncols() != channels.len() {
        return Err(TransformError::shape_mismatch(format!(
            "event matrix has {} columns but {} channel labels",
            events.ncols(),
            channels.len()
        )));
    }
    Ok(())
}

impl PartialEq for CompensationMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.detectors == other.detectors
            && self.fluorochromes == other.fluorochromes
            && self.spill == other.spill
    }
}

impl TryFrom<CompensationMatrixDef> for CompensationMatrix {
    type Error = TransformError;

    fn try_from(def: CompensationMatrixDef) -> Result<Self> {
        let n = def.detectors.len();
        if def.matrix.len() != n || def.matrix.iter().any(|row| row.len() != n) {
            return Err(TransformError::shape_mismatch(format!(
                "matrix '{}' must be {n}x{n}",
                def.id
            )));
        }
        let flat: Vec<f64> = def.matrix.into_iter().flatten().collect();
        let spill = Array2::from_shape_vec((n, n), flat)
            .map_err(|e| TransformError::shape_mismatch(e.to_string()))?;
        let (detectors, fluorochromes, spill) =
            drop_null_channels(def.detectors, def.fluorochromes, &spill, &def.null_channels);
        Self::new(def.id, detectors, fluorochromes, spill)
    }
}

impl From<CompensationMatrix> for CompensationMatrixDef {
    fn from(matrix: CompensationMatrix) -> Self {
        CompensationMatrixDef {
            id: matrix.id,
            detectors: matrix.detectors,
            fluorochromes: Some(matrix.fluorochromes),
            matrix: matrix.spill.rows().into_iter().map(|r| r.to_vec()).collect(),
            null_channels: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn assert_all_close<'a>(
        actual: impl IntoIterator<Item = &'a f64>,
        expected: impl IntoIterator<Item = &'a f64>,
        epsilon: f64,
    ) {
        for (a, e) in actual.into_iter().zip(expected) {
            assert_abs_diff_eq!(*a, *e, epsilon = epsilon);
        }
    }

    fn spill() -> CompensationMatrix {
        CompensationMatrix::new(
            "spill",
            vec!["FL1-A".into(), "FL2-A".into()],
            Some(vec!["FITC".into(), "PE".into()]),
            array![[1.0, 0.2], [0.1, 1.0]],
        )
        .unwrap()
    }

    fn channels() -> ChannelMap {
        ChannelMap::new(["FSC-A", "FL2-A", "FL1-A"]).unwrap()
    }

    #[test]
    fn test_apply_solves_unmixing() {
        let m = spill();
        let events = array![[100.0, 120.0, 200.0], [50.0, 0.0, 0.0]];
        let comp = m.apply(events.view(), &channels()).unwrap();

        // detector order is FL1-A (col 2), FL2-A (col 1)
        let solved = comp.select(Axis(1), &[2, 1]).dot(m.spill());
        assert_all_close(&solved, &events.select(Axis(1), &[2, 1]), 1e-9);
        // non-detector columns are untouched
        assert_eq!(comp.column(0), events.column(0));
        // input left as-is
        assert_eq!(events[[0, 1]], 120.0);
    }

    #[test]
    fn test_round_trip() {
        let m = spill();
        let events = array![[1.0, 33.0, -4.0], [7.0, 250.0, 1000.0], [0.0, 0.0, 0.0]];
        let comp = m.apply(events.view(), &channels()).unwrap();
        let back = m.inverse(comp.view(), &channels()).unwrap();
        assert_eq!(back.dim(), events.dim());
        assert_all_close(&back, &events, 1e-9);
    }

    #[test]
    fn test_compensate_column_matches_full_apply() {
        let m = spill();
        let events = array![[100.0, 120.0, 200.0], [5.0, 80.0, 3.0]];
        let indices = m.detector_indices(&channels()).unwrap();
        let full = m.apply_at(events.view(), &indices).unwrap();
        let fl2 = m.compensate_column(events.view(), &indices, 1).unwrap();
        assert_all_close(&fl2, full.column(1), 1e-12);
    }

    #[test]
    fn test_detectors_must_be_fluorescence() {
        let m = CompensationMatrix::new(
            "bad",
            vec!["FSC-A".into(), "FL1-A".into()],
            None,
            Array2::eye(2),
        )
        .unwrap();
        let err = m.detector_indices(&channels()).unwrap_err();
        assert_eq!(
            err,
            TransformError::ChannelMismatch {
                missing: vec!["FSC-A".into()]
            }
        );
    }

    #[test]
    fn test_singular_rejected() {
        let err = CompensationMatrix::new(
            "singular",
            vec!["FL1-A".into(), "FL2-A".into()],
            None,
            array![[1.0, 2.0], [2.0, 4.0]],
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::SingularMatrix { .. }));
    }

    #[test]
    fn test_equality_ignores_id() {
        let a = spill();
        let mut def = CompensationMatrixDef::from(spill());
        def.id = "other".into();
        let b = CompensationMatrix::try_from(def).unwrap();
        assert_eq!(a, b);

        let c = CompensationMatrix::new(
            "spill",
            vec!["FL1-A".into(), "FL2-A".into()],
            None,
            array![[1.0, 0.2], [0.1, 1.0]],
        )
        .unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_as_table() {
        let table = spill().as_table(true);
        assert_eq!(table.labels, vec!["FITC", "PE"]);
        assert_eq!(table.rows[0], vec![1.0, 0.2]);
        assert_eq!(spill().as_table(false).labels, vec!["FL1-A", "FL2-A"]);
    }

    #[test]
    fn test_serde_default_labels() {
        let json = r#"{"id": "m", "detectors": ["FL1-A"], "matrix": [[1.0]]}"#;
        let m: CompensationMatrix = serde_json::from_str(json).unwrap();
        assert_eq!(m.fluorochromes(), &[String::new()]);
    }

    #[test]
    fn test_null_channels_dropped() {
        let full = CompensationMatrix::new(
            "spill",
            vec!["FL1-A".into(), "FL3-A".into(), "FL2-A".into()],
            Some(vec!["FITC".into(), String::new(), "PE".into()]),
            array![[1.0, 0.5, 0.2], [0.3, 1.0, 0.4], [0.1, 0.6, 1.0]],
        )
        .unwrap();
        let trimmed = full.without_channels(&["FL3-A", "FL9-A"]).unwrap();
        assert_eq!(trimmed, spill());
        assert_eq!(trimmed.id(), "spill");
        assert_eq!(full.without_channels::<&str>(&[]).unwrap(), full);
    }

    #[test]
    fn test_serde_null_channels() {
        // the null detector's row would make the full matrix singular
        let json = r#"{
            "id": "spill",
            "detectors": ["FL1-A", "FL3-A", "FL2-A"],
            "fluorochromes": ["FITC", "", "PE"],
            "matrix": [[1.0, 0.0, 0.2], [0.0, 0.0, 0.0], [0.1, 0.0, 1.0]],
            "null_channels": ["FL3-A"]
        }"#;
        let m: CompensationMatrix = serde_json::from_str(json).unwrap();
        assert_eq!(m, spill());
        assert_eq!(m.detectors(), &["FL1-A", "FL2-A"]);

        let out = serde_json::to_value(&m).unwrap();
        assert!(out.get("null_channels").is_none());
    }
}
