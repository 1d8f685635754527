//! # flow-gating
//!
//! Gating-strategy evaluation for flow cytometry event data.
//!
//! A [`GatingStrategy`] holds a hierarchy of typed gates (range, rectangle,
//! polygon, ellipsoid, quadrant, boolean and ratio), the transforms and
//! compensation matrices their dimensions refer to, and the boolean
//! references between gates. Evaluating it against a raw event matrix yields
//! one membership vector per gate plus count and percentage statistics.
//!
//! ## Quick Start
//!
//! ```rust
//! use flow_gating::*;
//! use flow_transforms::ChannelMap;
//! use ndarray::array;
//!
//! # fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut strategy = GatingStrategy::new();
//! strategy.add_gate(
//!     Gate::rectangle(
//!         "cells",
//!         RectangleGate::new(
//!             vec![Dimension::new("FSC-A"), Dimension::new("SSC-A")],
//!             vec![Bounds::between(2.0, 10.0), Bounds::between(2.0, 10.0)],
//!         )?,
//!     ),
//!     None,
//! )?;
//!
//! let events = array![[1.0, 1.0], [3.0, 3.0], [6.0, 6.0]];
//! let channels = ChannelMap::new(["FSC-A", "SSC-A"])?;
//! let results = evaluate(&strategy, events.view(), &channels)?;
//!
//! assert_eq!(results.get_gate_membership("cells")?, &[false, true, true]);
//! assert_eq!(results.get_gate_count("cells")?, 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Core Concepts
//!
//! ### Effective membership
//!
//! A gate's local predicate is computed over every event and intersected with
//! its parent's effective membership, so an event is in a child only if it
//! passed every ancestor. Boolean gates combine the effective membership of
//! their operands, which may live anywhere in the hierarchy.
//!
//! ### Dimensions
//!
//! Geometric gates read [`Dimension`]s: a channel label plus optional ids of a
//! compensation matrix and a transform registered with the strategy.
//! Compensation is always applied before the transform.
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`GatingError`]. Failures raised while
//! evaluating a gate are wrapped in [`GatingError::Gate`] with the gate's id.

pub mod batch_filtering;
pub mod boolean;
pub mod config;
pub mod dimension;
pub mod ellipsoid;
pub mod error;
pub mod filtering;
pub mod hierarchy;
pub mod linking;
pub mod polygon;
pub mod quadrant;
pub mod ratio;
pub mod rectangle;
pub mod render;
pub mod results;
pub mod strategy;
pub mod traits;
pub mod types;


/// Error types for gating operations
pub use error::{GatingError, Result};

/// Evaluation
pub use config::GatingConfig;
pub use filtering::{DimensionCache, Evaluator, Sample, evaluate, evaluate_samples};

/// Gate definitions
pub use boolean::{BoolOperand, BoolOperator, BooleanGate};
pub use dimension::Dimension;
pub use ellipsoid::EllipsoidGate;
pub use polygon::{PolygonGate, point_in_polygon};
pub use quadrant::{Quadrant, QuadrantDivider, QuadrantGate, Sign};
pub use ratio::RatioGate;
pub use rectangle::{Bounds, RangeGate, RectangleGate};
pub use types::{Gate, GateKind, GateType};

/// Strategy, hierarchy and links
pub use hierarchy::GateHierarchy;
pub use linking::GateLinks;
pub use render::HierarchyFormat;
pub use strategy::{GateDefinition, GatingStrategy, StrategyDefinition, TransformDefinition};

/// Results
pub use results::{GateReportRow, GatingReport, GatingResults};

/// Gate geometry traits
pub use traits::{GateContainment, GateValidation};
