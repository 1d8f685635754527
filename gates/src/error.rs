//! Error types for gating operations.
//!
//! `GatingError` covers everything that can go wrong between building a
//! strategy and reading its results. Transform and compensation failures from
//! `flow-transforms` are folded into the same taxonomy, and failures raised
//! while evaluating a gate are wrapped with the gate's id via
//! [`GatingError::in_gate`].

use flow_transforms::TransformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatingError {
    /// A dimension references a channel absent from the sample
    #[error("Channel '{channel}' not found in sample channels")]
    UnknownChannel { channel: String },

    /// A channel label appears more than once in a sample
    #[error("Channel '{channel}' appears more than once in sample channels")]
    DuplicateChannel { channel: String },

    /// Compensation detectors are not all fluorescence channels of the sample
    #[error("Detectors must be a subset of the sample's fluorescence channels; missing: {missing:?}")]
    ChannelMismatch { missing: Vec<String> },

    /// No biex lookup table for the requested parameters
    #[error("The parameter value combination negative={negative}, width={width} is unsupported")]
    UnsupportedParameters { negative: f64, width: f64 },

    /// Degenerate gate geometry
    #[error("Invalid gate geometry: {message}")]
    InvalidGateGeometry { message: String },

    /// Structural problems: cycles, duplicate ids, dangling references
    #[error("Invalid hierarchy: {message}")]
    InvalidHierarchy { message: String },

    /// Lookup of a gate id that the strategy or results do not contain
    #[error("Gate '{gate_id}' not found")]
    UnknownGate { gate_id: String },

    #[error("Invalid parameters for {transform}: {message}")]
    InvalidParameters { transform: String, message: String },

    #[error("Unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    #[error("Compensation matrix '{matrix_id}' is singular: {message}")]
    SingularMatrix { matrix_id: String, message: String },

    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Failure while evaluating a specific gate
    #[error("Gate '{gate_id}': {source}")]
    Gate {
        gate_id: String,
        #[source]
        source: Box<GatingError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatingError {
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGateGeometry {
            message: message.into(),
        }
    }

    pub fn invalid_hierarchy(message: impl Into<String>) -> Self {
        Self::InvalidHierarchy {
            message: message.into(),
        }
    }

    pub fn unknown_gate(gate_id: impl Into<String>) -> Self {
        Self::UnknownGate {
            gate_id: gate_id.into(),
        }
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Attach the id of the gate being evaluated. An error that already names
    /// a gate is left as-is.
    pub fn in_gate(self, gate_id: impl Into<String>) -> Self {
        match self {
            Self::Gate { .. } => self,
            other => Self::Gate {
                gate_id: gate_id.into(),
                source: Box::new(other),
            },
        }
    }

    /// The id of the gate this error was raised for, if any
    pub fn gate_id(&self) -> Option<&str> {
        match self {
            Self::Gate { gate_id, .. } => Some(gate_id),
            _ => None,
        }
    }

    /// The underlying error with any gate context stripped
    pub fn root_cause(&self) -> &GatingError {
        match self {
            Self::Gate { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<TransformError> for GatingError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::InvalidParameters { transform, message } => {
                Self::InvalidParameters { transform, message }
            }
            TransformError::UnsupportedParameters { negative, width } => {
                Self::UnsupportedParameters { negative, width }
            }
            TransformError::UnsupportedOperation { message } => {
                Self::UnsupportedOperation { message }
            }
            TransformError::ChannelMismatch { missing } => Self::ChannelMismatch { missing },
            TransformError::UnknownChannel { channel } => Self::UnknownChannel { channel },
            TransformError::DuplicateChannel { channel } => Self::DuplicateChannel { channel },
            TransformError::SingularMatrix { matrix_id, message } => {
                Self::SingularMatrix { matrix_id, message }
            }
            TransformError::ShapeMismatch { message } => Self::ShapeMismatch { message },
        }
    }
}

pub type Result<T> = std::result::Result<T, GatingError>;
