//! Ratio gates: a range test over a value derived from two channels.
//!
//! The derived value is `a * (numerator - b) / (denominator - c)`, optionally
//! taken to `log10` and then transformed. Compensation, when named, is applied
//! to both raw channels before the ratio is formed.

use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::rectangle::Bounds;
use crate::traits::GateValidation;
use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioGate {
    pub numerator: String,
    pub denominator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
    /// Transform applied to the derived ratio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default = "one")]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub c: f64,
    #[serde(default)]
    pub log: bool,
    #[serde(flatten)]
    pub bounds: Bounds,
}

impl RatioGate {
    /// Plain `numerator / denominator` ratio within `bounds`
    pub fn new(numerator: impl Into<String>, denominator: impl Into<String>, bounds: Bounds) -> Result<Self> {
        let gate = Self {
            numerator: numerator.into(),
            denominator: denominator.into(),
            compensation: None,
            transform: None,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            log: false,
            bounds,
        };
        gate.validate()?;
        Ok(gate)
    }

    pub fn with_coefficients(mut self, a: f64, b: f64, c: f64) -> Result<Self> {
        self.a = a;
        self.b = b;
        self.c = c;
        self.validate()?;
        Ok(self)
    }

    pub fn with_log(mut self) -> Self {
        self.log = true;
        self
    }

    pub fn with_compensation(mut self, matrix_id: impl Into<String>) -> Self {
        self.compensation = Some(matrix_id.into());
        self
    }

    pub fn with_transform(mut self, transform_id: impl Into<String>) -> Self {
        self.transform = Some(transform_id.into());
        self
    }

    /// Untransformed input dimensions, numerator first
    pub fn inputs(&self) -> [Dimension; 2] {
        let input = |channel: &str| Dimension {
            channel: channel.to_string(),
            compensation: self.compensation.clone(),
            transform: None,
        };
        [input(&self.numerator), input(&self.denominator)]
    }

    /// Derived value before any transform. Non-positive ratios have no
    /// logarithm and give NaN.
    #[inline]
    pub fn ratio(&self, numerator: f64, denominator: f64) -> f64 {
        let r = self.a * (numerator - self.b) / (denominator - self.c);
        if !self.log {
            r
        } else if r > 0.0 {
            r.log10()
        } else {
            f64::NAN
        }
    }
}

impl GateValidation for RatioGate {
    fn validate(&self) -> Result<()> {
        if ![self.a, self.b, self.c].iter().all(|v| v.is_finite()) {
            return Err(GatingError::invalid_geometry(
                "ratio coefficients must be finite",
            ));
        }
        if self.a == 0.0 {
            return Err(GatingError::invalid_geometry(
                "ratio coefficient a must be non-zero",
            ));
        }
        self.bounds.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plain_ratio() {
        let gate = RatioGate::new("FL1", "FL2", Bounds::between(0.5, 2.0)).unwrap();
        assert_relative_eq!(gate.ratio(10.0, 5.0), 2.0);
        assert!(gate.bounds.contains(gate.ratio(10.0, 5.0)));
        assert!(!gate.bounds.contains(gate.ratio(1.0, 0.0)));
    }

    #[test]
    fn test_fratio_coefficients_and_log() {
        let gate = RatioGate::new("FL1", "FL2", Bounds::new(Some(0.0), None))
            .unwrap()
            .with_coefficients(10.0, 1.0, 2.0)
            .unwrap()
            .with_log();
        // 10 * (11 - 1) / (12 - 2) = 10
        assert_relative_eq!(gate.ratio(11.0, 12.0), 1.0, epsilon = 1e-12);
        assert!(gate.ratio(0.5, 12.0).is_nan());
    }

    #[test]
    fn test_inputs_carry_compensation_only() {
        let gate = RatioGate::new("FL1", "FL2", Bounds::between(0.0, 1.0))
            .unwrap()
            .with_compensation("spill")
            .with_transform("lin");
        let [num, den] = gate.inputs();
        assert_eq!(num, Dimension::new("FL1").with_compensation("spill"));
        assert_eq!(den.channel, "FL2");
        assert!(den.transform.is_none());
    }

    #[test]
    fn test_serde_defaults() {
        let gate: RatioGate =
            serde_json::from_str(r#"{"numerator": "A", "denominator": "B", "max": 3.0}"#).unwrap();
        assert_eq!(gate.a, 1.0);
        assert!(!gate.log);
        assert_eq!(gate.bounds, Bounds::new(None, Some(3.0)));
    }
}
