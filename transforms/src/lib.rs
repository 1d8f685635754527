//! # flow-transforms
//!
//! Scale transforms and spillover compensation for flow cytometry event data.
//!
//! - [`Transform`]: linear, log, FlowJo log, asinh, logicle, hyperlog and the
//!   lookup-table biex scale, all behind the [`Transformable`] trait
//! - [`CompensationMatrix`]: spillover unmixing over a sample's detector columns
//! - [`ChannelMap`]: resolves channel labels to event-matrix columns
//!
//! ```rust
//! use flow_transforms::{Transform, Transformable};
//!
//! let logicle = Transform::logicle(262144.0, 0.5, 4.5, 0.0)?;
//! let scaled = logicle.transform(1000.0);
//! assert!(scaled > 0.0 && scaled < 1.0);
//! # Ok::<(), flow_transforms::TransformError>(())
//! ```

pub use biex::{BiexLut, BiexLutSet, BiexOptions, WspBiex};
pub use channels::ChannelMap;
pub use error::{Result, TransformError};
pub use hyperlog::{Hyperlog, HyperlogParams};
pub use logicle::{Logicle, LogicleParams};
pub use matrix::{CompensationMatrix, CompensationMatrixDef, CompensationTable, MatrixOps};
pub use transform::{LOG_FLOOR, Transform, TransformKind, Transformable};

pub mod biex;
pub mod channels;
pub mod error;
pub mod hyperlog;
pub mod logicle;
pub mod matrix;
pub mod transform;
