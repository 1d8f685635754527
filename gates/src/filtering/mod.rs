//! Strategy evaluation: turning raw events into per-gate membership.
//!
//! Every gate's local predicate is computed over all events, then
//! intersected with its parent's effective membership. Gates run in
//! dependency order so boolean operands and parents are final before they
//! are read, and each gate runs exactly once per sample.

use crate::batch_filtering::{count, event_mask, intersect, map_events};
use crate::config::GatingConfig;
use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::results::{EvaluatedPopulation, GatingResults};
use crate::strategy::GatingStrategy;
use crate::traits::GateContainment;
use crate::types::{Gate, GateKind};
use flow_transforms::{ChannelMap, Transformable};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub mod cache;
pub use cache::DimensionCache;

/// One sample's events: rows are events, columns follow `channels`
#[derive(Debug, Clone)]
pub struct Sample {
    pub id: String,
    pub events: Array2<f64>,
    pub channels: ChannelMap,
}

impl Sample {
    pub fn new(id: impl Into<String>, events: Array2<f64>, channels: ChannelMap) -> Self {
        Self {
            id: id.into(),
            events,
            channels,
        }
    }
}

/// Evaluates a validated strategy against samples
#[derive(Debug, Clone)]
pub struct Evaluator<'a> {
    strategy: &'a GatingStrategy,
    config: GatingConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(strategy: &'a GatingStrategy) -> Self {
        Self::with_config(strategy, GatingConfig::default())
    }

    pub fn with_config(strategy: &'a GatingStrategy, config: GatingConfig) -> Self {
        Self { strategy, config }
    }

    /// Gate one sample. Fails atomically: no results are returned if any
    /// gate fails, and the error names the failing gate.
    pub fn evaluate(
        &self,
        sample_id: &str,
        events: ArrayView2<f64>,
        channels: &ChannelMap,
    ) -> Result<GatingResults> {
        let started = Instant::now();
        if events.ncols() != channels.len() {
            return Err(GatingError::shape_mismatch(format!(
                "event matrix has {} columns but {} channel labels",
                events.ncols(),
                channels.len()
            )));
        }
        let strategy = self.strategy;
        strategy.validate()?;
        let order = strategy.gate_order()?;

        let mut run = SampleRun {
            strategy,
            events,
            channels,
            parallel: self.config.is_parallel(events.nrows()),
            cache: DimensionCache::new(self.config.cache_dimensions),
            membership: vec![None; strategy.population_count()],
        };
        for &gi in &order {
            let gate = &strategy.gates()[gi];
            run.evaluate_gate(gi, gate)
                .map_err(|e| e.in_gate(&*gate.id))?;
        }

        let populations = order
            .iter()
            .flat_map(|&gi| strategy.gate_populations(gi))
            .map(|pi| {
                let population = strategy.population_at(pi);
                let mask = run.membership[pi].take().ok_or_else(|| {
                    GatingError::invalid_hierarchy("population was not evaluated")
                        .in_gate(&*population.id)
                })?;
                Ok(EvaluatedPopulation {
                    id: population.id.clone(),
                    parent: population.parent.clone(),
                    kind: strategy.gates()[population.gate].gate_type(),
                    depth: strategy.depth(&population.id)?,
                    mask,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            sample = sample_id,
            events = events.nrows(),
            gates = populations.len(),
            cached_columns = run.cache.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gated sample"
        );
        Ok(GatingResults::new(sample_id, events.nrows(), populations))
    }

    /// Gate independent samples in parallel, results in input order
    pub fn evaluate_samples(&self, samples: &[Sample]) -> Vec<Result<GatingResults>> {
        samples
            .par_iter()
            .map(|s| self.evaluate(&s.id, s.events.view(), &s.channels))
            .collect()
    }
}

/// Gate one sample with the default configuration
pub fn evaluate(
    strategy: &GatingStrategy,
    events: ArrayView2<f64>,
    channels: &ChannelMap,
) -> Result<GatingResults> {
    Evaluator::new(strategy).evaluate("", events, channels)
}

/// Gate independent samples in parallel against one shared strategy
pub fn evaluate_samples(
    strategy: &GatingStrategy,
    samples: &[Sample],
    config: GatingConfig,
) -> Vec<Result<GatingResults>> {
    Evaluator::with_config(strategy, config).evaluate_samples(samples)
}

/// Working state of one sample evaluation
struct SampleRun<'a> {
    strategy: &'a GatingStrategy,
    events: ArrayView2<'a, f64>,
    channels: &'a ChannelMap,
    parallel: bool,
    cache: DimensionCache,
    /// Effective membership per population, filled in dependency order
    membership: Vec<Option<Vec<bool>>>,
}

impl SampleRun<'_> {
    /// Compensated, transformed column for `dimension`
    fn column(&mut self, dimension: &Dimension) -> Result<Arc<Array1<f64>>> {
        let strategy = self.strategy;
        let (events, channels) = (self.events, self.channels);
        self.cache.get_or_extract(dimension, || {
            let matrix = match &dimension.compensation {
                Some(id) => Some(strategy.matrix(id).ok_or_else(|| {
                    GatingError::invalid_hierarchy(format!(
                        "compensation matrix '{id}' is not registered"
                    ))
                })?),
                None => None,
            };
            let transform = match &dimension.transform {
                Some(id) => Some(strategy.transform(id).ok_or_else(|| {
                    GatingError::invalid_hierarchy(format!("transform '{id}' is not registered"))
                })?),
                None => None,
            };
            dimension.extract(events, channels, matrix, transform)
        })
    }

    fn columns(&mut self, dimensions: &[Dimension]) -> Result<Vec<Arc<Array1<f64>>>> {
        dimensions.iter().map(|d| self.column(d)).collect()
    }

    fn finished(&self, gate_id: &str) -> Result<&[bool]> {
        self.strategy
            .population_position(gate_id)
            .and_then(|pi| self.membership[pi].as_deref())
            .ok_or_else(|| {
                GatingError::invalid_hierarchy(format!("gate '{gate_id}' has not been evaluated"))
            })
    }

    fn evaluate_gate(&mut self, gi: usize, gate: &Gate) -> Result<()> {
        let n = self.events.nrows();
        let parallel = self.parallel;

        // one local mask per population the gate defines, quadrant order
        let local: Vec<Vec<bool>> = match &gate.kind {
            GateKind::Range(g) => vec![self.containment(g, &gate.kind.dimensions())?],
            GateKind::Rectangle(g) => vec![self.containment(g, &g.dimensions)?],
            GateKind::Polygon(g) => vec![self.containment(g, &g.dimensions)?],
            GateKind::Ellipsoid(g) => vec![self.containment(g, g.dimensions())?],
            GateKind::Ratio(g) => {
                let [num, den] = self.columns(&g.inputs())?
                    .try_into()
                    .map_err(|_| GatingError::shape_mismatch("ratio gate needs two inputs"))?;
                let ratio = Array1::from_shape_fn(n, |i| g.ratio(num[i], den[i]));
                let derived = match &g.transform {
                    Some(id) => self
                        .strategy
                        .transform(id)
                        .ok_or_else(|| {
                            GatingError::invalid_hierarchy(format!(
                                "transform '{id}' is not registered"
                            ))
                        })?
                        .apply(ratio.view()),
                    None => ratio,
                };
                vec![event_mask(n, parallel, |i| g.bounds.contains(derived[i]))]
            }
            GateKind::Quadrant(g) => {
                let dimensions: Vec<Dimension> = g.dimensions().cloned().collect();
                let columns = self.columns(&dimensions)?;
                let views: Vec<ArrayView1<f64>> = columns.iter().map(|c| c.view()).collect();
                let locator = g.locator();
                let located = map_events(n, parallel, |i| locator.locate(&views, i));
                (0..g.quadrants.len())
                    .map(|q| located.iter().map(|&l| l == Some(q)).collect())
                    .collect()
            }
            GateKind::Boolean(g) => {
                let operands = g
                    .operand_ids()
                    .map(|id| self.finished(id))
                    .collect::<Result<Vec<&[bool]>>>()?;
                vec![event_mask(n, parallel, |i| g.combine(&operands, i))]
            }
        };

        let population_ids: Vec<usize> = self.strategy.gate_populations(gi).collect();
        let parent = population_ids
            .first()
            .and_then(|&pi| self.strategy.population_at(pi).parent.clone());
        let parent_mask = match &parent {
            Some(p) => Some(self.finished(p)?),
            None => None,
        };
        let effective: Vec<(usize, Vec<bool>)> = population_ids
            .into_iter()
            .zip(local)
            .map(|(pi, mut mask)| {
                if let Some(parent_mask) = parent_mask {
                    intersect(&mut mask, parent_mask);
                }
                (pi, mask)
            })
            .collect();

        for (pi, mask) in effective {
            debug!(
                gate = %self.strategy.population_at(pi).id,
                kind = %gate.gate_type(),
                count = count(&mask),
                "Evaluated gate"
            );
            self.membership[pi] = Some(mask);
        }
        Ok(())
    }

    fn containment<G: GateContainment + Sync>(
        &mut self,
        gate: &G,
        dimensions: &[Dimension],
    ) -> Result<Vec<bool>> {
        let columns = self.columns(dimensions)?;
        let views: Vec<ArrayView1<f64>> = columns.iter().map(|c| c.view()).collect();
        Ok(event_mask(self.events.nrows(), self.parallel, |i| {
            gate.contains_event(&views, i)
        }))
    }
}
