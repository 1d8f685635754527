//! Error types for transform and compensation operations.

use thiserror::Error;

/// Errors raised while building or applying transforms and compensation matrices.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// A transform was given parameters outside its valid domain
    #[error("Invalid parameters for {transform}: {message}")]
    InvalidParameters { transform: String, message: String },

    /// No lookup table exists for the requested biex parameter combination
    #[error(
        "The parameter value combination negative={negative}, width={width} is unsupported"
    )]
    UnsupportedParameters { negative: f64, width: f64 },

    /// The operation is not defined for this transform instance
    #[error("Unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    /// Compensation detectors are not all fluorescence channels of the sample
    #[error("Detectors must be a subset of the sample's fluorescence channels; missing: {missing:?}")]
    ChannelMismatch { missing: Vec<String> },

    /// A channel label could not be resolved against the sample's channel list
    #[error("Channel '{channel}' not found in sample channels")]
    UnknownChannel { channel: String },

    /// The same label appears more than once in a channel list
    #[error("Channel '{channel}' appears more than once in sample channels")]
    DuplicateChannel { channel: String },

    /// A spillover matrix has no inverse
    #[error("Compensation matrix '{matrix_id}' is singular: {message}")]
    SingularMatrix { matrix_id: String, message: String },

    /// Array dimensions do not line up
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },
}

impl TransformError {
    pub fn invalid_parameters(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            transform: transform.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    pub fn unknown_channel(channel: impl Into<String>) -> Self {
        Self::UnknownChannel {
            channel: channel.into(),
        }
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
