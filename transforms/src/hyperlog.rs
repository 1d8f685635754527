//! Hyperlog scale (Bagwell, 2005).
//!
//! Inverse of `EH(y) = a·e^(b·y) + c·y − f`, solved the same way as the
//! logicle: Halley iteration with a Taylor expansion near the zero point.

use crate::error::{Result, TransformError};
use crate::logicle::{TAYLOR_LENGTH, check_biexponential_params, taylor_series};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;
use tracing::warn;

const MAX_HALLEY_ITERATIONS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperlogParams {
    pub t: f64,
    pub w: f64,
    pub m: f64,
    #[serde(default)]
    pub a: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "HyperlogParams", into = "HyperlogParams")]
pub struct Hyperlog {
    params: HyperlogParams,
    a: f64,
    b: f64,
    c: f64,
    f: f64,
    x1: f64,
    x_taylor: f64,
    taylor: [f64; TAYLOR_LENGTH],
}

impl Hyperlog {
    pub fn new(t: f64, w: f64, m: f64, a: f64) -> Result<Self> {
        Self::try_from(HyperlogParams { t, w, m, a })
    }

    pub fn params(&self) -> HyperlogParams {
        self.params
    }

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
            let y = if x < self.x_taylor {
                taylor_series(&self.taylor, x - self.x1) - value
            } else {
                (ae2bx + self.c * x) - (self.f + value)
            };
            let abe2bx = self.b * ae2bx;
            let dy = abe2bx + self.c;
            let ddy = self.b * abe2bx;

            let delta = y / (dy * (1.0 - y * ddy / (2.0 * dy * dy)));
            x -= delta;
            if delta.abs() < tolerance {
                return if negative { 2.0 * self.x1 - x } else { x };
            }
        }

        warn!(value, params = ?self.params, "hyperlog scale did not converge");
        if negative { 2.0 * self.x1 - x } else { x }
    }

    pub fn inverse(&self, scale: f64) -> f64 {
        let negative = scale < self.x1;
        let scale = if negative { 2.0 * self.x1 - scale } else { scale };

        let inverse = if scale < self.x_taylor {
            taylor_series(&self.taylor, scale - self.x1)
        } else {
            (self.a * (self.b * scale).exp() + self.c * scale) - self.f
        };

        if negative { -inverse } else { inverse }
    }
}

impl TryFrom<HyperlogParams> for Hyperlog {
    type Error = TransformError;

    fn try_from(params: HyperlogParams) -> Result<Self> {
        let HyperlogParams { t, w, m, a } = params;
        check_biexponential_params("Hyperlog", t, w, m, a, true)?;

        let w_norm = w / (m + a);
        let x2 = a / (m + a);
        let x1 = x2 + w_norm;
        let x0 = x2 + 2.0 * w_norm;
        let b = (m + a) * LN_10;

        let c_a = (b * x0).exp() / w_norm;
        let f_a = (b * x1).exp() + c_a * x1;
        let a_coef = t / ((b.exp() + c_a) - f_a);
        let c = c_a * a_coef;
        let f = f_a * a_coef;

        let mut taylor = [0.0; TAYLOR_LENGTH];
        let mut pos_coef = a_coef * (b * x1).exp();
        for (i, coef) in taylor.iter_mut().enumerate() {
            pos_coef *= b / (i as f64 + 1.0);
            *coef = pos_coef;
        }
        taylor[0] += c;

        Ok(Self {
            params,
            a: a_coef,
            b,
            c,
            f,
            x1,
            x_taylor: x1 + w_norm / 4.0,
            taylor,
        })
    }
}

impl From<Hyperlog> for HyperlogParams {
    fn from(value: Hyperlog) -> Self {
        value.params
    }
}

impl PartialEq for Hyperlog {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_top_of_scale_maps_to_one() {
        let hyperlog = Hyperlog::new(10000.0, 1.0, 4.5, 0.0).unwrap();
        assert_relative_eq!(hyperlog.scale(10000.0), 1.0, epsilon = 1e-9);
        assert_relative_eq!(hyperlog.scale(0.0), 1.0 / 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let hyperlog = Hyperlog::new(262144.0, 0.5, 4.5, 0.0).unwrap();
        for value in [-2000.0, -3.0, 0.25, 7.0, 640.0, 200_000.0] {
            let scaled = hyperlog.scale(value);
            assert_relative_eq!(hyperlog.inverse(scaled), value, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_rejects_zero_width() {
        assert!(Hyperlog::new(10000.0, 0.0, 4.5, 0.0).is_err());
    }
}
