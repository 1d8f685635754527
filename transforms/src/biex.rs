//! Lookup-table biexponential transform.
//!
//! FlowJo's biex scale is only defined for a fixed grid of `negative` and
//! `width` values. Each grid point has a precomputed table of
//! `(scaled, raw)` rows; the transform is a linear interpolant through that
//! table, clamped to the table's output range outside its input domain.
//! Tables are supplied by the caller through [`BiexLutSet`].

use crate::error::{Result, TransformError};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Supported values of the `negative` option.
pub const BIEX_NEGATIVE_VALUES: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Supported values of the `width` option.
pub const BIEX_WIDTH_VALUES: [f64; 21] = [
    -1000.0,
    -630.957336,
    -501.187225,
    -398.107178,
    -316.227753,
    -251.188644,
    -158.489319,
    -100.0,
    -63.095734,
    -39.810719,
    -25.118864,
    -15.848932,
    -10.0,
    -7.943282,
    -6.309574,
    -5.011872,
    -3.981072,
    -3.162278,
    -2.511886,
    -1.584893,
    -1.0,
];

/// Positive decades baked into every table.
pub const BIEX_POSITIVE_DECADES: f64 = 4.418540;
/// Top of scale baked into every table.
pub const BIEX_MAX_VALUE: f64 = 262144.0;

const GRID_TOLERANCE: f64 = 1e-6;

fn grid_index(grid: &[f64], value: f64) -> Option<usize> {
    grid.iter().position(|g| (g - value).abs() < GRID_TOLERANCE)
}

fn nearest_index(grid: &[f64], value: f64, skip: Option<usize>) -> Option<usize> {
    grid.iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .min_by(|(_, a), (_, b)| (*a - value).abs().total_cmp(&(*b - value).abs()))
        .map(|(i, _)| i)
}

/// One lookup table: `scaled[i]` is the transformed value of `raw[i]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LutRows", into = "LutRows")]
pub struct BiexLut {
    scaled: Vec<f64>,
    raw: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct LutRows {
    scaled: Vec<f64>,
    raw: Vec<f64>,
}

impl BiexLut {
    pub fn new(scaled: Vec<f64>, raw: Vec<f64>) -> Result<Self> {
        if scaled.len() != raw.len() {
            return Err(TransformError::shape_mismatch(format!(
                "lookup table columns differ in length ({} scaled, {} raw)",
                scaled.len(),
                raw.len()
            )));
        }
        if raw.len() < 2 {
            return Err(TransformError::invalid_parameters(
                "WspBiex",
                "lookup table needs at least two rows",
            ));
        }
        if scaled.iter().chain(raw.iter()).any(|v| !v.is_finite()) {
            return Err(TransformError::invalid_parameters(
                "WspBiex",
                "lookup table contains non-finite values",
            ));
        }
        Ok(Self { scaled, raw })
    }

    /// Build a table from rows laid out as `(scaled, raw)`, the column order
    /// of FlowJo's exported tables.
    pub fn from_rows(rows: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let (scaled, raw) = rows.into_iter().unzip();
        Self::new(scaled, raw)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn scaled(&self) -> &[f64] {
        &self.scaled
    }

    pub fn raw(&self) -> &[f64] {
        &self.raw
    }

    /// Row-wise weighted average of the raw columns of two tables; the
    /// scaled column of `self` is kept.
    fn blend(&self, other: &BiexLut, weight_self: f64, weight_other: f64) -> Result<Self> {
        if self.len() != other.len() {
            return Err(TransformError::shape_mismatch(format!(
                "cannot blend lookup tables with {} and {} rows",
                self.len(),
                other.len()
            )));
        }
        let total = weight_self + weight_other;
        let raw = self
            .raw
            .iter()
            .zip(&other.raw)
            .map(|(r1, r2)| (weight_self * r1 + weight_other * r2) / total)
            .collect();
        Self::new(self.scaled.clone(), raw)
    }
}

impl TryFrom<LutRows> for BiexLut {
    type Error = TransformError;

    fn try_from(rows: LutRows) -> Result<Self> {
        Self::new(rows.scaled, rows.raw)
    }
}

impl From<BiexLut> for LutRows {
    fn from(lut: BiexLut) -> Self {
        LutRows {
            scaled: lut.scaled,
            raw: lut.raw,
        }
    }
}

/// Lookup tables keyed by their grid position.
///
/// Loading the tables from disk belongs to the caller; the set only checks
/// that every table sits on the supported grid.
#[derive(Clone, Debug, Default)]
pub struct BiexLutSet {
    tables: FxHashMap<(usize, usize), BiexLut>,
}

impl BiexLutSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, negative: f64, width: f64, lut: BiexLut) -> Result<()> {
        let key = match (
            grid_index(&BIEX_NEGATIVE_VALUES, negative),
            grid_index(&BIEX_WIDTH_VALUES, width),
        ) {
            (Some(n), Some(w)) => (n, w),
            _ => return Err(TransformError::UnsupportedParameters { negative, width }),
        };
        self.tables.insert(key, lut);
        Ok(())
    }

    pub fn get(&self, negative: f64, width: f64) -> Option<&BiexLut> {
        let n = grid_index(&BIEX_NEGATIVE_VALUES, negative)?;
        let w = grid_index(&BIEX_WIDTH_VALUES, width)?;
        self.tables.get(&(n, w))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// File name FlowJo uses for the table at a grid point.
    pub fn table_file_name(negative: f64, width: f64) -> String {
        format!(
            "tr_biex_l256_w{width:.6}_n{negative:.6}_m{BIEX_POSITIVE_DECADES:.6}_r262144.000029.csv"
        )
    }
}

/// Options for building a [`WspBiex`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiexOptions {
    pub negative: f64,
    pub width: f64,
    /// Snap `negative` to the grid and blend the two nearest `width` tables
    /// instead of failing on off-grid values.
    #[serde(default)]
    pub use_nearest: bool,
}

impl Default for BiexOptions {
    fn default() -> Self {
        Self {
            negative: 0.0,
            width: -10.0,
            use_nearest: false,
        }
    }
}

/// Piecewise-linear interpolant over sorted knots, clamped outside the knots.
#[derive(Clone, Debug)]
struct Interpolant {
    xs: Vec<f64>,
    ys: Vec<f64>,
    below: f64,
    above: f64,
}

impl Interpolant {
    fn new(xs: &[f64], ys: &[f64], below: f64, above: f64) -> Self {
        let (xs, ys) = xs
            .iter()
            .zip(ys)
            .sorted_by(|a, b| a.0.total_cmp(b.0))
            .map(|(x, y)| (*x, *y))
            .unzip();
        Self {
            xs,
            ys,
            below,
            above,
        }
    }

    fn eval(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let n = self.xs.len();
        if x < self.xs[0] {
            return self.below;
        }
        if x > self.xs[n - 1] {
            return self.above;
        }
        let i = self.xs.partition_point(|&v| v < x);
        if i == 0 {
            return self.ys[0];
        }
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        if x1 == x0 {
            return y1;
        }
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// FlowJo biex transform backed by a (possibly blended) lookup table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "WspBiexDef", into = "WspBiexDef")]
pub struct WspBiex {
    negative: f64,
    width: f64,
    table: BiexLut,
    forward: Interpolant,
    backward: Option<Interpolant>,
}

#[derive(Serialize, Deserialize)]
struct WspBiexDef {
    negative: f64,
    width: f64,
    table: BiexLut,
}

impl WspBiex {
    pub fn new(options: BiexOptions, luts: &BiexLutSet) -> Result<Self> {
        let BiexOptions {
            negative,
            width,
            use_nearest,
        } = options;
        let unsupported = || TransformError::UnsupportedParameters { negative, width };

        let neg_idx = match grid_index(&BIEX_NEGATIVE_VALUES, negative) {
            Some(idx) => idx,
            None if use_nearest => {
                let idx = nearest_index(&BIEX_NEGATIVE_VALUES, negative, None)
                    .ok_or_else(unsupported)?;
                warn!(
                    requested = negative,
                    used = BIEX_NEGATIVE_VALUES[idx],
                    "biex negative value is not on the lookup grid, using nearest"
                );
                idx
            }
            None => return Err(unsupported()),
        };
        let grid_negative = BIEX_NEGATIVE_VALUES[neg_idx];

        let table = match grid_index(&BIEX_WIDTH_VALUES, width) {
            Some(w_idx) => luts
                .tables
                .get(&(neg_idx, w_idx))
                .cloned()
                .ok_or_else(unsupported)?,
            None if use_nearest => {
                let (lowest, highest) = min_max(&BIEX_WIDTH_VALUES);
                if width < lowest || width > highest {
                    return Err(unsupported());
                }
                let first = nearest_index(&BIEX_WIDTH_VALUES, width, None).ok_or_else(unsupported)?;
                let second =
                    nearest_index(&BIEX_WIDTH_VALUES, width, Some(first)).ok_or_else(unsupported)?;
                let (w1, w2) = (BIEX_WIDTH_VALUES[first], BIEX_WIDTH_VALUES[second]);
                let lut1 = luts.tables.get(&(neg_idx, first)).ok_or_else(unsupported)?;
                let lut2 = luts.tables.get(&(neg_idx, second)).ok_or_else(unsupported)?;

                let spread = (w1 - w2).abs();
                let weight1 = 1.0 - (w1 - width).abs() / spread;
                let weight2 = 1.0 - (w2 - width).abs() / spread;
                warn!(
                    requested = width,
                    closest = w1,
                    next = w2,
                    weight1,
                    weight2,
                    "biex width is not on the lookup grid, blending nearest tables"
                );
                lut1.blend(lut2, weight1, weight2)?
            }
            None => return Err(unsupported()),
        };

        let biex = Self::from_table(grid_negative, width, table);
        debug!(%biex, "built biex transform");
        Ok(biex)
    }

    fn from_table(negative: f64, width: f64, table: BiexLut) -> Self {
        let (y_min, y_max) = min_max(&table.scaled);
        let (x_min, x_max) = min_max(&table.raw);
        let forward = Interpolant::new(&table.raw, &table.scaled, y_min, y_max);

        // reverse lookup is only defined when the table is strictly monotone
        let backward = forward
            .ys
            .windows(2)
            .all(|w| w[0] < w[1])
            .then(|| Interpolant::new(&table.scaled, &table.raw, x_min, x_max));

        Self {
            negative,
            width,
            table,
            forward,
            backward,
        }
    }

    pub fn negative(&self) -> f64 {
        self.negative
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn table(&self) -> &BiexLut {
        &self.table
    }

    pub fn scale(&self, value: f64) -> f64 {
        self.forward.eval(value)
    }

    pub fn inverse(&self, scale: f64) -> Result<f64> {
        self.backward
            .as_ref()
            .map(|interp| interp.eval(scale))
            .ok_or_else(|| {
                TransformError::unsupported_operation(
                    "biex lookup table is not strictly monotone and cannot be inverted",
                )
            })
    }
}

impl std::fmt::Display for WspBiex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WspBiex(negative: {}, width: {})", self.negative, self.width)
    }
}

impl PartialEq for WspBiex {
    fn eq(&self, other: &Self) -> bool {
        self.negative == other.negative && self.width == other.width && self.table == other.table
    }
}

impl TryFrom<WspBiexDef> for WspBiex {
    type Error = TransformError;

    fn try_from(def: WspBiexDef) -> Result<Self> {
        if grid_index(&BIEX_NEGATIVE_VALUES, def.negative).is_none() {
            return Err(TransformError::UnsupportedParameters {
                negative: def.negative,
                width: def.width,
            });
        }
        Ok(Self::from_table(def.negative, def.width, def.table))
    }
}

impl From<WspBiex> for WspBiexDef {
    fn from(biex: WspBiex) -> Self {
        WspBiexDef {
            negative: biex.negative,
            width: biex.width,
            table: biex.table,
        }
    }
}
