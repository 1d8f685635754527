//! Logicle scale (Parks & Moore, 2006).
//!
//! The logicle function is the inverse of the modified biexponential
//! `B(y) = a·e^(b·y) − c·e^(−d·y) + f`, constrained so that the scale is linear
//! around zero and logarithmic for large values. `scale` finds `y` with
//! `B(y) = x` by Halley's method, switching to a Taylor series of `B` near
//! the zero point where the closed form loses precision.

use crate::error::{Result, TransformError};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;
use tracing::warn;

pub(crate) const TAYLOR_LENGTH: usize = 16;
const MAX_HALLEY_ITERATIONS: usize = 20;
const MAX_SOLVE_ITERATIONS: usize = 40;

/// User-facing logicle parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogicleParams {
    /// Top of scale
    pub t: f64,
    /// Width of the linear region, in decades
    pub w: f64,
    /// Total decades at full scale
    pub m: f64,
    /// Additional negative decades
    #[serde(default)]
    pub a: f64,
}

/// A logicle transform with its derived coefficients.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "LogicleParams", into = "LogicleParams")]
pub struct Logicle {
    params: LogicleParams,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    f: f64,
    x1: f64,
    x_taylor: f64,
    taylor: [f64; TAYLOR_LENGTH],
}

impl Logicle {
    pub fn new(t: f64, w: f64, m: f64, a: f64) -> Result<Self> {
        Self::try_from(LogicleParams { t, w, m, a })
    }

    pub fn params(&self) -> LogicleParams {
        self.params
    }

    /// Map a raw value onto the logicle scale (`T` maps to 1).
    pub fn scale(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        if value == 0.0 {
            return self.x1;
        }
        let negative = value < 0.0;
        let value = value.abs();

        let mut x = if value < self.f {
            self.x1 + value / self.taylor[0]
        } else {
            (value / self.a).ln() / self.b
        };

        let tolerance = if x > 1.0 {
            3.0 * x * f64::EPSILON
        } else {
            3.0 * f64::EPSILON
        };

        for _ in 0..MAX_HALLEY_ITERATIONS {
            let ae2bx = self.a * (self.b * x).exp();
            let ce2mdx = self.c / (self.d * x).exp();
            let y = if x < self.x_taylor {
                taylor_series(&self.taylor, x - self.x1) - value
            } else {
                (ae2bx + self.f) - (ce2mdx + value)
            };
            let abe2bx = self.b * ae2bx;
            let cde2mdx = self.d * ce2mdx;
            let dy = abe2bx + cde2mdx;
            let ddy = self.b * abe2bx - self.d * cde2mdx;

            let delta = y / (dy * (1.0 - y * ddy / (2.0 * dy * dy)));
            x -= delta;
            if delta.abs() < tolerance {
                return if negative { 2.0 * self.x1 - x } else { x };
            }
        }

        warn!(value, params = ?self.params, "logicle scale did not converge");
        if negative { 2.0 * self.x1 - x } else { x }
    }

    /// Map a logicle scale value back to raw data units.
    pub fn inverse(&self, scale: f64) -> f64 {
        let negative = scale < self.x1;
        let scale = if negative { 2.0 * self.x1 - scale } else { scale };

        let inverse = if scale < self.x_taylor {
            taylor_series(&self.taylor, scale - self.x1)
        } else {
            (self.a * (self.b * scale).exp() + self.f) - self.c / (self.d * scale).exp()
        };

        if negative { -inverse } else { inverse }
    }
}

impl TryFrom<LogicleParams> for Logicle {
    type Error = TransformError;

    fn try_from(params: LogicleParams) -> Result<Self> {
        let LogicleParams { t, w, m, a } = params;
        check_biexponential_params("Logicle", t, w, m, a, false)?;

        let w_norm = w / (m + a);
        let x2 = a / (m + a);
        let x1 = x2 + w_norm;
        let x0 = x2 + 2.0 * w_norm;
        let b = (m + a) * LN_10;
        let d = solve(b, w_norm).ok_or_else(|| {
            TransformError::invalid_parameters("Logicle", "could not solve for the d coefficient")
        })?;

        let c_a = (x0 * (b + d)).exp();
        let mf_a = (b * x1).exp() - c_a / (d * x1).exp();
        let a_coef = t / (((b).exp() - mf_a) - c_a / d.exp());
        let c = c_a * a_coef;
        let f = -mf_a * a_coef;

        let mut taylor = [0.0; TAYLOR_LENGTH];
        let mut pos_coef = a_coef * (b * x1).exp();
        let mut neg_coef = -c / (d * x1).exp();
        for (i, coef) in taylor.iter_mut().enumerate() {
            pos_coef *= b / (i as f64 + 1.0);
            neg_coef *= -d / (i as f64 + 1.0);
            *coef = pos_coef + neg_coef;
        }
        // the second derivative vanishes at x1 by construction
        taylor[1] = 0.0;

        Ok(Self {
            params,
            a: a_coef,
            b,
            c,
            d,
            f,
            x1,
            x_taylor: x1 + w_norm / 4.0,
            taylor,
        })
    }
}

impl From<Logicle> for LogicleParams {
    fn from(value: Logicle) -> Self {
        value.params
    }
}

impl PartialEq for Logicle {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

/// Shared parameter checks for the logicle and hyperlog families.
pub(crate) fn check_biexponential_params(
    name: &str,
    t: f64,
    w: f64,
    m: f64,
    a: f64,
    strict_width: bool,
) -> Result<()> {
    let finite = [t, w, m, a].iter().all(|v| v.is_finite());
    if !finite {
        return Err(TransformError::invalid_parameters(
            name,
            "parameters must be finite",
        ));
    }
    if t <= 0.0 {
        return Err(TransformError::invalid_parameters(name, "T must be positive"));
    }
    if m <= 0.0 {
        return Err(TransformError::invalid_parameters(name, "M must be positive"));
    }
    if w < 0.0 || (strict_width && w == 0.0) {
        return Err(TransformError::invalid_parameters(
            name,
            format!("W = {w} is out of range"),
        ));
    }
    if 2.0 * w > m {
        return Err(TransformError::invalid_parameters(
            name,
            format!("W = {w} exceeds half of M = {m}"),
        ));
    }
    if -a > w || a + w > m - w {
        return Err(TransformError::invalid_parameters(
            name,
            format!("A = {a} is incompatible with W = {w} and M = {m}"),
        ));
    }
    Ok(())
}

/// Evaluate `Σ taylor[i] · dx^(i+1)` by Horner's rule.
pub(crate) fn taylor_series(taylor: &[f64; TAYLOR_LENGTH], dx: f64) -> f64 {
    taylor.iter().rev().fold(0.0, |sum, coef| (sum + coef) * dx)
}

/// Solve `2·ln(d) − 2·ln(b) + w·(b + d) = 0` for `d` with a safeguarded
/// Newton/bisection iteration on `(0, b)`.
fn solve(b: f64, w: f64) -> Option<f64> {
    if w == 0.0 {
        return Some(b);
    }
    let tolerance = 2.0 * b * f64::EPSILON;

    let mut d_lo = 0.0;
    let mut d_hi = b;
    let mut d = (d_lo + d_hi) / 2.0;
    let mut last_delta = d_hi - d_lo;

    let f_b = -2.0 * b.ln() + w * b;
    let mut f = 2.0 * d.ln() + w * d + f_b;
    let mut last_f = f64::NAN;

    for _ in 0..MAX_SOLVE_ITERATIONS {
        let df = 2.0 / d + w;
        let delta;
        if ((d - d_hi) * df - f) * ((d - d_lo) * df - f) >= 0.0
            || (1.9 * f).abs() > (last_delta * df).abs()
        {
            delta = (d_hi - d_lo) / 2.0;
            d = d_lo + delta;
            if d == d_lo {
                return Some(d);
            }
        } else {
            delta = f / df;
            let previous = d;
            d -= delta;
            if d == previous {
                return Some(d);
            }
        }

        if delta.abs() < tolerance {
            return Some(d);
        }
        last_delta = delta;

        f = 2.0 * d.ln() + w * d + f_b;
        if f == 0.0 || f == last_f {
            return Some(d);
        }
        last_f = f;

        if f < 0.0 {
            d_lo = d;
        } else {
            d_hi = d;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_top_of_scale_maps_to_one() {
        let logicle = Logicle::new(262144.0, 0.5, 4.5, 0.0).unwrap();
        assert_relative_eq!(logicle.scale(262144.0), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_maps_to_x1() {
        let logicle = Logicle::new(10000.0, 0.5, 4.5, 0.0).unwrap();
        assert_relative_eq!(logicle.scale(0.0), 0.5 / 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip_across_regions() {
        let logicle = Logicle::new(262144.0, 0.5, 4.5, 0.0).unwrap();
        for value in [-5000.0, -10.0, -0.5, 0.1, 1.0, 50.0, 1000.0, 100_000.0] {
            let scaled = logicle.scale(value);
            assert_relative_eq!(logicle.inverse(scaled), value, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_monotone() {
        let logicle = Logicle::new(10000.0, 1.0, 4.5, 1.0).unwrap();
        let values = [-1000.0, -100.0, -1.0, 0.0, 1.0, 100.0, 1000.0, 10000.0];
        let scaled: Vec<f64> = values.iter().map(|&v| logicle.scale(v)).collect();
        assert!(scaled.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_rejects_wide_linear_region() {
        let err = Logicle::new(10000.0, 3.0, 4.5, 0.0).unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters { .. }));
        assert!(Logicle::new(-1.0, 0.5, 4.5, 0.0).is_err());
    }

    #[test]
    fn test_serde_revalidates() {
        let json = r#"{"t": 262144.0, "w": 0.5, "m": 4.5, "a": 0.0}"#;
        let logicle: Logicle = serde_json::from_str(json).unwrap();
        assert_eq!(logicle.params().m, 4.5);

        let bad = r#"{"t": 262144.0, "w": 4.0, "m": 4.5}"#;
        assert!(serde_json::from_str::<Logicle>(bad).is_err());
    }
}
