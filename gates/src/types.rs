use crate::boolean::BooleanGate;
use crate::dimension::Dimension;
use crate::ellipsoid::EllipsoidGate;
use crate::error::Result;
use crate::polygon::PolygonGate;
use crate::quadrant::QuadrantGate;
use crate::ratio::RatioGate;
use crate::rectangle::{RangeGate, RectangleGate};
use crate::traits::GateValidation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// Kind of a gate, as reported in results and hierarchy renderings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateType {
    Range,
    Rectangle,
    Polygon,
    Ellipsoid,
    Quadrant,
    Boolean,
    Ratio,
}

/// The kind-specific definition of a gate.
///
/// Serialized with a `type` tag, e.g.
/// `{"type": "range", "dimension": {"channel": "FSC-A"}, "min": 2.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateKind {
    Range(RangeGate),
    Rectangle(RectangleGate),
    Polygon(PolygonGate),
    Ellipsoid(EllipsoidGate),
    Quadrant(QuadrantGate),
    Boolean(BooleanGate),
    Ratio(RatioGate),
}

impl GateKind {
    pub fn gate_type(&self) -> GateType {
        match self {
            GateKind::Range(_) => GateType::Range,
            GateKind::Rectangle(_) => GateType::Rectangle,
            GateKind::Polygon(_) => GateType::Polygon,
            GateKind::Ellipsoid(_) => GateType::Ellipsoid,
            GateKind::Quadrant(_) => GateType::Quadrant,
            GateKind::Boolean(_) => GateType::Boolean,
            GateKind::Ratio(_) => GateType::Ratio,
        }
    }

    /// Dimensions read from the event matrix, in the order the predicate
    /// expects its columns. Ratio gates report their raw inputs.
    pub fn dimensions(&self) -> Vec<Dimension> {
        match self {
            GateKind::Range(g) => vec![g.dimension.clone()],
            GateKind::Rectangle(g) => g.dimensions.clone(),
            GateKind::Polygon(g) => g.dimensions.to_vec(),
            GateKind::Ellipsoid(g) => g.dimensions().to_vec(),
            GateKind::Quadrant(g) => g.dimensions().cloned().collect(),
            GateKind::Boolean(_) => Vec::new(),
            GateKind::Ratio(g) => g.inputs().to_vec(),
        }
    }

    /// Ids of registered transforms this gate refers to
    pub fn transform_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        match self {
            GateKind::Range(g) => refs.extend(g.dimension.transform.as_deref()),
            GateKind::Rectangle(g) => {
                refs.extend(g.dimensions.iter().filter_map(|d| d.transform.as_deref()))
            }
            GateKind::Polygon(g) => {
                refs.extend(g.dimensions.iter().filter_map(|d| d.transform.as_deref()))
            }
            GateKind::Ellipsoid(g) => {
                refs.extend(g.dimensions().iter().filter_map(|d| d.transform.as_deref()))
            }
            GateKind::Quadrant(g) => {
                refs.extend(g.dimensions().filter_map(|d| d.transform.as_deref()))
            }
            GateKind::Boolean(_) => {}
            GateKind::Ratio(g) => refs.extend(g.transform.as_deref()),
        }
        refs
    }

    /// Ids of registered compensation matrices this gate refers to
    pub fn compensation_refs(&self) -> Vec<String> {
        self.dimensions()
            .into_iter()
            .filter_map(|d| d.compensation)
            .collect()
    }

    /// Ids of the gates a boolean gate combines
    pub fn operand_ids(&self) -> Vec<&str> {
        match self {
            GateKind::Boolean(g) => g.operand_ids().collect(),
            _ => Vec::new(),
        }
    }
}

impl GateValidation for GateKind {
    fn validate(&self) -> Result<()> {
        match self {
            GateKind::Range(g) => g.validate(),
            GateKind::Rectangle(g) => g.validate(),
            GateKind::Polygon(g) => g.validate(),
            GateKind::Ellipsoid(g) => g.validate(),
            GateKind::Quadrant(g) => g.validate(),
            GateKind::Boolean(g) => g.validate(),
            GateKind::Ratio(g) => g.validate(),
        }
    }
}

/// A gate definition: an id unique within its strategy plus the kind payload.
///
/// Quadrant gates are containers; the populations they define are named by
/// their quadrants' ids.
///
/// # Example
///
/// ```rust
/// use flow_gating::{Dimension, Gate, GateType, RangeGate};
///
/// let gate = Gate::range(
///     "lymphocytes",
///     RangeGate::new(Dimension::new("FSC-A"), Some(2.0), Some(5.0))?,
/// );
/// assert_eq!(gate.gate_type(), GateType::Range);
/// # Ok::<(), flow_gating::GatingError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    #[serde(with = "arc_str_serde")]
    pub id: Arc<str>,
    #[serde(flatten)]
    pub kind: GateKind,
}

impl Gate {
    pub fn new(id: impl Into<Arc<str>>, kind: GateKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn range(id: impl Into<Arc<str>>, gate: RangeGate) -> Self {
        Self::new(id, GateKind::Range(gate))
    }

    pub fn rectangle(id: impl Into<Arc<str>>, gate: RectangleGate) -> Self {
        Self::new(id, GateKind::Rectangle(gate))
    }

    pub fn polygon(id: impl Into<Arc<str>>, gate: PolygonGate) -> Self {
        Self::new(id, GateKind::Polygon(gate))
    }

    pub fn ellipsoid(id: impl Into<Arc<str>>, gate: EllipsoidGate) -> Self {
        Self::new(id, GateKind::Ellipsoid(gate))
    }

    pub fn quadrant(id: impl Into<Arc<str>>, gate: QuadrantGate) -> Self {
        Self::new(id, GateKind::Quadrant(gate))
    }

    pub fn boolean(id: impl Into<Arc<str>>, gate: BooleanGate) -> Self {
        Self::new(id, GateKind::Boolean(gate))
    }

    pub fn ratio(id: impl Into<Arc<str>>, gate: RatioGate) -> Self {
        Self::new(id, GateKind::Ratio(gate))
    }

    pub fn gate_type(&self) -> GateType {
        self.kind.gate_type()
    }

    /// Ids of the populations this gate defines: its own id, or its
    /// quadrants' ids for a quadrant gate
    pub fn population_ids(&self) -> Vec<Arc<str>> {
        match &self.kind {
            GateKind::Quadrant(q) => q.quadrants.iter().map(|q| Arc::from(q.id.as_str())).collect(),
            _ => vec![self.id.clone()],
        }
    }
}

// Arc<str> ids serialize as plain strings
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        arc.as_ref().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}
