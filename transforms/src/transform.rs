use crate::biex::{BiexLutSet, BiexOptions, WspBiex};
use crate::error::{Result, TransformError};
use crate::hyperlog::Hyperlog;
use crate::logicle::Logicle;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;
use std::fmt;
use strum_macros::{Display, EnumString};

/// Smallest input of the `Log` transform; anything below is clamped to it
pub const LOG_FLOOR: f64 = f64::MIN_POSITIVE;

/// Scale transform applied to a single channel before gating
///
/// Every variant maps raw instrument values onto a dimensionless scale. The
/// parametric forms follow the GatingML 2.0 definitions, where `t` is the top
/// of scale and maps to 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// `(x + a) / (t + a)`
    Linear { t: f64, a: f64 },
    /// `1/m · log10(x / t) + 1`; non-positive input is clamped to
    /// [`LOG_FLOOR`] so every finite value has a finite image
    Log { t: f64, m: f64 },
    /// FlowJo log: values below `offset` are clamped, then
    /// `1/decades · (log10(x) − log10(offset))`
    WspLog { offset: f64, decades: f64 },
    /// `(asinh(x · sinh(m·ln10) / t) + a·ln10) / ((m + a)·ln10)`
    Asinh { t: f64, m: f64, a: f64 },
    Logicle(Logicle),
    Hyperlog(Hyperlog),
    WspBiex(WspBiex),
}

/// Transform families, used to generate default transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransformKind {
    Linear,
    Log,
    WspLog,
    Asinh,
    Logicle,
    Hyperlog,
    #[strum(to_string = "wsp_biex", serialize = "biex")]
    WspBiex,
}

/// Trait for types that map values between the raw and transformed scales
pub trait Transformable {
    fn transform(&self, value: f64) -> f64;
    fn inverse_transform(&self, value: f64) -> Result<f64>;

    /// Transform a whole column, leaving the input untouched.
    fn apply(&self, column: ArrayView1<f64>) -> Array1<f64> {
        column.mapv(|v| self.transform(v))
    }

    fn inverse_apply(&self, column: ArrayView1<f64>) -> Result<Array1<f64>> {
        column
            .iter()
            .map(|&v| self.inverse_transform(v))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }
}

impl Transform {
    pub fn linear(t: f64, a: f64) -> Result<Self> {
        let transform = Transform::Linear { t, a };
        transform.validate()?;
        Ok(transform)
    }

    /// Linear map sending `t1` to 0 and `t2` to 1.
    pub fn linear_between(t1: f64, t2: f64) -> Result<Self> {
        Self::linear(t2, -t1)
    }

    pub fn log(t: f64, m: f64) -> Result<Self> {
        let transform = Transform::Log { t, m };
        transform.validate()?;
        Ok(transform)
    }

    pub fn wsp_log(offset: f64, decades: f64) -> Result<Self> {
        let transform = Transform::WspLog { offset, decades };
        transform.validate()?;
        Ok(transform)
    }

    pub fn asinh(t: f64, m: f64, a: f64) -> Result<Self> {
        let transform = Transform::Asinh { t, m, a };
        transform.validate()?;
        Ok(transform)
    }

    pub fn logicle(t: f64, w: f64, m: f64, a: f64) -> Result<Self> {
        Logicle::new(t, w, m, a).map(Transform::Logicle)
    }

    pub fn hyperlog(t: f64, w: f64, m: f64, a: f64) -> Result<Self> {
        Hyperlog::new(t, w, m, a).map(Transform::Hyperlog)
    }

    pub fn wsp_biex(options: BiexOptions, luts: &BiexLutSet) -> Result<Self> {
        WspBiex::new(options, luts).map(Transform::WspBiex)
    }

    /// Default transform of a family for data with the given top of scale.
    ///
    /// Biex defaults need lookup tables; without them the call fails.
    pub fn default_for(
        kind: TransformKind,
        top_of_scale: f64,
        luts: Option<&BiexLutSet>,
    ) -> Result<Self> {
        match kind {
            TransformKind::Linear => Self::linear(top_of_scale, 0.0),
            TransformKind::Log => Self::log(top_of_scale, 4.0),
            TransformKind::WspLog => Self::wsp_log(1.0, 4.0),
            TransformKind::Asinh => Self::asinh(top_of_scale, 3.5, 0.0),
            TransformKind::Logicle => Self::logicle(top_of_scale, 0.5, 4.0, 0.0),
            TransformKind::Hyperlog => Self::hyperlog(top_of_scale, 0.5, 4.0, 0.0),
            TransformKind::WspBiex => {
                let luts = luts.ok_or_else(|| {
                    TransformError::unsupported_operation(
                        "a biex transform requires a lookup table set",
                    )
                })?;
                Self::wsp_biex(BiexOptions::default(), luts)
            }
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Linear { .. } => TransformKind::Linear,
            Transform::Log { .. } => TransformKind::Log,
            Transform::WspLog { .. } => TransformKind::WspLog,
            Transform::Asinh { .. } => TransformKind::Asinh,
            Transform::Logicle(_) => TransformKind::Logicle,
            Transform::Hyperlog(_) => TransformKind::Hyperlog,
            Transform::WspBiex(_) => TransformKind::WspBiex,
        }
    }

    /// Check the parameters of the closed-form variants. The solved variants
    /// are validated when they are constructed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(TransformError::invalid_parameters(
                self.kind().to_string(),
                message,
            ))
        };
        match *self {
            Transform::Linear { t, a } => {
                if !(t.is_finite() && a.is_finite()) {
                    return invalid("parameters must be finite");
                }
                if t + a == 0.0 {
                    return invalid("t + a must be non-zero");
                }
            }
            Transform::Log { t, m } => {
                if !(t.is_finite() && t > 0.0 && m.is_finite() && m > 0.0) {
                    return invalid("t and m must be positive");
                }
            }
            Transform::WspLog { offset, decades } => {
                if !(offset.is_finite() && offset > 0.0 && decades.is_finite() && decades > 0.0) {
                    return invalid("offset and decades must be positive");
                }
            }
            Transform::Asinh { t, m, a } => {
                if !(t.is_finite() && t > 0.0 && m.is_finite() && m > 0.0) {
                    return invalid("t and m must be positive");
                }
                if !(a.is_finite() && a >= 0.0 && a <= m) {
                    return invalid("a must lie in [0, m]");
                }
            }
            Transform::Logicle(_) | Transform::Hyperlog(_) | Transform::WspBiex(_) => {}
        }
        Ok(())
    }
}

impl Transformable for Transform {
    fn transform(&self, value: f64) -> f64 {
        match self {
            Transform::Linear { t, a } => (value + a) / (t + a),
            Transform::Log { t, m } => {
                if value.is_nan() {
                    return f64::NAN;
                }
                (value.max(LOG_FLOOR) / t).log10() / m + 1.0
            }
            Transform::WspLog { offset, decades } => {
                // NaN.max(offset) would silently clamp missing data
                if value.is_nan() {
                    return f64::NAN;
                }
                (value.max(*offset).log10() - offset.log10()) / decades
            }
            Transform::Asinh { t, m, a } => {
                let m_ln10 = m * LN_10;
                ((value * m_ln10.sinh() / t).asinh() + a * LN_10) / ((m + a) * LN_10)
            }
            Transform::Logicle(logicle) => logicle.scale(value),
            Transform::Hyperlog(hyperlog) => hyperlog.scale(value),
            Transform::WspBiex(biex) => biex.scale(value),
        }
    }

    fn inverse_transform(&self, value: f64) -> Result<f64> {
        Ok(match self {
            Transform::Linear { t, a } => value * (t + a) - a,
            Transform::Log { t, m } => t * 10f64.powf((value - 1.0) * m),
            Transform::WspLog { offset, decades } => offset * 10f64.powf(value * decades),
            Transform::Asinh { t, m, a } => {
                let x = value * (m + a) * LN_10 - a * LN_10;
                x.sinh() * t / (m * LN_10).sinh()
            }
            Transform::Logicle(logicle) => logicle.inverse(value),
            Transform::Hyperlog(hyperlog) => hyperlog.inverse(value),
            Transform::WspBiex(biex) => biex.inverse(value)?,
        })
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Linear { t, a } => write!(f, "Linear(t: {t}, a: {a})"),
            Transform::Log { t, m } => write!(f, "Log(t: {t}, m: {m})"),
            Transform::WspLog { offset, decades } => {
                write!(f, "WspLog(offset: {offset}, decades: {decades})")
            }
            Transform::Asinh { t, m, a } => write!(f, "Asinh(t: {t}, m: {m}, a: {a})"),
            Transform::Logicle(logicle) => {
                let p = logicle.params();
                write!(f, "Logicle(t: {}, w: {}, m: {}, a: {})", p.t, p.w, p.m, p.a)
            }
            Transform::Hyperlog(hyperlog) => {
                let p = hyperlog.params();
                write!(f, "Hyperlog(t: {}, w: {}, m: {}, a: {})", p.t, p.w, p.m, p.a)
            }
            Transform::WspBiex(biex) => biex.fmt(f),
        }
    }
}
