//! Channel references used by geometric gates.
//!
//! A [`Dimension`] names one channel plus optional ids of a compensation
//! matrix and a transform registered with the strategy. Extraction always
//! compensates before transforming, since transforms are defined on the
//! compensated scale.

use crate::error::Result;
use flow_transforms::{ChannelMap, CompensationMatrix, Transform, Transformable};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl Dimension {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            compensation: None,
            transform: None,
        }
    }

    pub fn with_compensation(mut self, matrix_id: impl Into<String>) -> Self {
        self.compensation = Some(matrix_id.into());
        self
    }

    pub fn with_transform(mut self, transform_id: impl Into<String>) -> Self {
        self.transform = Some(transform_id.into());
        self
    }

    /// Column index of this dimension's channel
    pub fn resolve(&self, channels: &ChannelMap) -> Result<usize> {
        Ok(channels.resolve(&self.channel)?)
    }

    /// Select the raw column, compensate it, then transform it.
    ///
    /// `compensation` and `transform` are the objects this dimension's ids
    /// refer to. A channel that is not one of the matrix's detectors passes
    /// through compensation unchanged, but the matrix must still fit the
    /// sample. The input matrix is never modified.
    pub fn extract(
        &self,
        events: ArrayView2<f64>,
        channels: &ChannelMap,
        compensation: Option<&CompensationMatrix>,
        transform: Option<&Transform>,
    ) -> Result<Array1<f64>> {
        let index = self.resolve(channels)?;
        let column = match compensation {
            Some(matrix) => {
                let detectors = matrix.detector_indices(channels)?;
                compensate(events, index, matrix, &detectors, &self.channel)?
            }
            None => events.column(index).to_owned(),
        };
        Ok(match transform {
            Some(t) => t.apply(column.view()),
            None => column,
        })
    }
}

/// Compensated column for `channel`, given the matrix's resolved detector columns
pub(crate) fn compensate(
    events: ArrayView2<f64>,
    index: usize,
    matrix: &CompensationMatrix,
    detectors: &[usize],
    channel: &str,
) -> Result<Array1<f64>> {
    match matrix.detector_position(channel) {
        Some(position) => Ok(matrix.compensate_column(events, detectors, position)?),
        None => Ok(events.column(index).to_owned()),
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)?;
        if let Some(comp) = &self.compensation {
            write!(f, " [comp: {comp}]")?;
        }
        if let Some(xform) = &self.transform {
            write!(f, " [xform: {xform}]")?;
        }
        Ok(())
    }
}
