//! The gating strategy: an index-based registry of gates, transforms and
//! compensation matrices, plus the parent tree and boolean reference links
//! between the populations the gates define.

use crate::error::{GatingError, Result};
use crate::hierarchy::GateHierarchy;
use crate::linking::GateLinks;
use crate::traits::GateValidation;
use crate::types::{Gate, GateKind, GateType};
use flow_transforms::{CompensationMatrix, Transform};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// A population a gate defines. Most gates define exactly one, named by the
/// gate id; a quadrant gate defines one per quadrant.
#[derive(Debug, Clone)]
pub(crate) struct Population {
    pub id: Arc<str>,
    pub parent: Option<Arc<str>>,
    /// Index of the defining gate
    pub gate: usize,
}

/// A complete gating strategy, shared read-only across evaluations.
///
/// # Example
///
/// ```rust
/// use flow_gating::{Bounds, Dimension, Gate, GatingStrategy, RectangleGate};
///
/// let mut strategy = GatingStrategy::new();
/// strategy.add_gate(
///     Gate::rectangle(
///         "cells",
///         RectangleGate::new(
///             vec![Dimension::new("FSC-A"), Dimension::new("SSC-A")],
///             vec![Bounds::between(2.0, 10.0), Bounds::between(2.0, 10.0)],
///         )?,
///     ),
///     None,
/// )?;
/// strategy.validate()?;
/// assert_eq!(strategy.gate_ids(), vec!["cells"]);
/// # Ok::<(), flow_gating::GatingError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct GatingStrategy {
    gates: Vec<Gate>,
    gate_index: FxHashMap<Arc<str>, usize>,
    populations: Vec<Population>,
    population_index: FxHashMap<Arc<str>, usize>,
    hierarchy: GateHierarchy,
    links: GateLinks,
    transforms: FxHashMap<String, Transform>,
    matrices: FxHashMap<String, CompensationMatrix>,
}

/// Registered transform, serialized as `{"id": ..., "type": ..., params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDefinition {
    pub id: String,
    #[serde(flatten)]
    pub transform: Transform,
}

/// A gate together with the population it is nested under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub gate: Gate,
}

/// Serializable form of a strategy. Gates may name parents that appear
/// later in the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    #[serde(default)]
    pub transforms: Vec<TransformDefinition>,
    #[serde(default)]
    pub matrices: Vec<CompensationMatrix>,
    #[serde(default)]
    pub gates: Vec<GateDefinition>,
}

impl GatingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a strategy from its serialized definition
    pub fn from_definition(definition: StrategyDefinition) -> Result<Self> {
        let mut strategy = Self::new();
        for TransformDefinition { id, transform } in definition.transforms {
            strategy.add_transform(id, transform)?;
        }
        for matrix in definition.matrices {
            strategy.add_matrix(matrix)?;
        }
        for GateDefinition { parent, gate } in definition.gates {
            strategy.add_gate(gate, parent.as_deref())?;
        }
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definition: StrategyDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    /// Serializable form, gates in insertion order
    pub fn to_definition(&self) -> StrategyDefinition {
        let mut transforms: Vec<TransformDefinition> = self
            .transforms
            .iter()
            .map(|(id, transform)| TransformDefinition {
                id: id.clone(),
                transform: transform.clone(),
            })
            .collect();
        transforms.sort_by(|a, b| a.id.cmp(&b.id));

        let matrices = self
            .matrices
            .values()
            .sorted_by(|a, b| a.id().cmp(b.id()))
            .cloned()
            .collect();

        let gates = self
            .gates
            .iter()
            .enumerate()
            .map(|(gi, gate)| GateDefinition {
                parent: self.gate_parent(gi).map(|p| p.to_string()),
                gate: gate.clone(),
            })
            .collect();

        StrategyDefinition {
            transforms,
            matrices,
            gates,
        }
    }

    pub fn add_transform(&mut self, id: impl Into<String>, transform: Transform) -> Result<()> {
        let id = id.into();
        transform.validate()?;
        if self.transforms.contains_key(&id) {
            return Err(GatingError::invalid_hierarchy(format!(
                "duplicate transform id '{id}'"
            )));
        }
        self.transforms.insert(id, transform);
        Ok(())
    }

    pub fn add_matrix(&mut self, matrix: CompensationMatrix) -> Result<()> {
        if self.matrices.contains_key(matrix.id()) {
            return Err(GatingError::invalid_hierarchy(format!(
                "duplicate compensation matrix id '{}'",
                matrix.id()
            )));
        }
        self.matrices.insert(matrix.id().to_string(), matrix);
        Ok(())
    }

    /// Register a gate under `parent` (`None` for the all-events root).
    ///
    /// The gate's geometry is validated here. The parent and any boolean
    /// operands may be registered later; [`validate`](Self::validate)
    /// checks that they all resolve.
    pub fn add_gate(&mut self, gate: Gate, parent: Option<&str>) -> Result<()> {
        let gate_id = gate.id.clone();
        gate.kind.validate().map_err(|e| e.in_gate(&*gate_id))?;

        let population_ids = gate.population_ids();
        let mut new_ids: Vec<&Arc<str>> = vec![&gate_id];
        if matches!(gate.kind, GateKind::Quadrant(_)) {
            new_ids.extend(population_ids.iter());
        }
        if let Some(dup) = new_ids.iter().duplicates().next() {
            return Err(GatingError::invalid_hierarchy(format!(
                "duplicate gate id '{dup}' within gate '{gate_id}'"
            )));
        }
        if let Some(dup) = new_ids.iter().find(|id| self.is_registered(id)) {
            return Err(GatingError::invalid_hierarchy(format!(
                "duplicate gate id '{dup}'"
            )));
        }

        let parent: Option<Arc<str>> = parent.map(Arc::from);
        if let Some(parent) = &parent {
            // a parent already below one of the new populations closes a loop
            let ancestors: Vec<&str> = self.hierarchy.ancestors(parent).collect();
            if let Some(id) = new_ids
                .iter()
                .find(|id| {
                    let id: &str = id;
                    id == &**parent || ancestors.contains(&id)
                })
            {
                return Err(GatingError::invalid_hierarchy(format!(
                    "gate '{id}' cannot be nested under '{parent}': cyclic parent relationship"
                )));
            }
        }

        let gate_index = self.gates.len();
        for id in &population_ids {
            if let Some(parent) = &parent {
                self.hierarchy.add_child(parent.clone(), id.clone())?;
            }
            self.population_index.insert(id.clone(), self.populations.len());
            self.populations.push(Population {
                id: id.clone(),
                parent: parent.clone(),
                gate: gate_index,
            });
        }
        for operand in gate.kind.operand_ids() {
            self.links.add_link(operand, gate_id.clone());
        }
        self.gate_index.insert(gate_id, gate_index);
        self.gates.push(gate);
        Ok(())
    }

    fn is_registered(&self, id: &str) -> bool {
        self.gate_index.contains_key(id) || self.population_index.contains_key(id)
    }

    /// Check every reference and that the dependency graph is acyclic
    pub fn validate(&self) -> Result<()> {
        self.check_references()?;
        self.gate_order().map(|_| ())
    }

    fn check_references(&self) -> Result<()> {
        for population in &self.populations {
            let Some(parent) = &population.parent else {
                continue;
            };
            if !self.population_index.contains_key(parent) {
                let message = if self.gate_index.contains_key(parent) {
                    format!("parent '{parent}' is a quadrant gate; nest under one of its quadrants")
                } else {
                    format!("parent '{parent}' does not exist")
                };
                return Err(GatingError::invalid_hierarchy(message).in_gate(&*population.id));
            }
        }
        for gate in &self.gates {
            let in_gate = |e: GatingError| e.in_gate(&*gate.id);
            for operand in gate.kind.operand_ids() {
                if !self.population_index.contains_key(operand) {
                    return Err(in_gate(GatingError::invalid_hierarchy(format!(
                        "boolean operand '{operand}' does not exist"
                    ))));
                }
            }
            for transform in gate.kind.transform_refs() {
                if !self.transforms.contains_key(transform) {
                    return Err(in_gate(GatingError::invalid_hierarchy(format!(
                        "transform '{transform}' is not registered"
                    ))));
                }
            }
            for matrix in gate.kind.compensation_refs() {
                if !self.matrices.contains_key(&matrix) {
                    return Err(in_gate(GatingError::invalid_hierarchy(format!(
                        "compensation matrix '{matrix}' is not registered"
                    ))));
                }
            }
        }
        Ok(())
    }

    /// Gate indices in dependency order: parents and boolean operands before
    /// the gates that use them, ties broken by insertion order.
    pub(crate) fn gate_order(&self) -> Result<Vec<usize>> {
        let gate_count = self.gates.len();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); gate_count];
        for (gi, dependent_list) in dependents.iter_mut().enumerate() {
            let mut seen = FxHashSet::default();
            for population in self.populations.iter().filter(|p| p.gate == gi) {
                let children = self
                    .hierarchy
                    .children(&population.id)
                    .iter()
                    .filter_map(|c| self.population_index.get(c))
                    .map(|&pi| self.populations[pi].gate);
                let linkers = self
                    .links
                    .linkers(&population.id)
                    .filter_map(|l| self.gate_index.get(l).copied());
                seen.extend(children.chain(linkers));
            }
            dependent_list.extend(seen.into_iter().sorted());
        }

        let mut in_degree = vec![0usize; gate_count];
        for &d in dependents.iter().flatten() {
            in_degree[d] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(gi, _)| Reverse(gi))
            .collect();
        let mut order = Vec::with_capacity(gate_count);
        while let Some(Reverse(gi)) = ready.pop() {
            order.push(gi);
            for &d in &dependents[gi] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }

        if order.len() < gate_count {
            let stuck = (0..gate_count)
                .filter(|&gi| in_degree[gi] > 0)
                .map(|gi| self.gates[gi].id.as_ref())
                .join(", ");
            return Err(GatingError::invalid_hierarchy(format!(
                "cyclic dependency among gates: {stuck}"
            )));
        }
        Ok(order)
    }

    /// Population ids in the order they are evaluated
    pub fn evaluation_order(&self) -> Result<Vec<&str>> {
        self.check_references()?;
        let order = self.gate_order()?;
        Ok(order
            .into_iter()
            .flat_map(|gi| self.gate_populations(gi))
            .map(|pi| self.populations[pi].id.as_ref())
            .collect())
    }

    /// Ids of every population, in insertion order
    pub fn gate_ids(&self) -> Vec<&str> {
        self.populations.iter().map(|p| p.id.as_ref()).collect()
    }

    /// Ids of populations directly under the all-events root
    pub fn root_gate_ids(&self) -> Vec<&str> {
        self.populations
            .iter()
            .filter(|p| self.hierarchy.is_root(&p.id))
            .map(|p| p.id.as_ref())
            .collect()
    }

    pub fn get_parent_gate_id(&self, gate_id: &str) -> Result<Option<&str>> {
        self.population(gate_id)?;
        Ok(self.hierarchy.parent(gate_id))
    }

    pub fn get_child_gate_ids(&self, gate_id: &str) -> Result<Vec<&str>> {
        self.population(gate_id)?;
        Ok(self
            .hierarchy
            .children(gate_id)
            .iter()
            .map(|c| c.as_ref())
            .collect())
    }

    pub fn gate_kind(&self, gate_id: &str) -> Result<GateType> {
        let population = self.population(gate_id)?;
        Ok(self.gates[population.gate].gate_type())
    }

    /// Depth below the all-events root, which has depth 0
    pub fn depth(&self, gate_id: &str) -> Result<usize> {
        self.population(gate_id)?;
        Ok(self.hierarchy.depth(gate_id))
    }

    /// Gates that reference `gate_id` as a boolean operand
    pub fn get_referencing_gate_ids(&self, gate_id: &str) -> Result<Vec<&str>> {
        self.population(gate_id)?;
        Ok(self.links.linkers(gate_id).collect())
    }

    /// Gate definition by id; quadrant gates are found by container id
    pub fn gate(&self, gate_id: &str) -> Option<&Gate> {
        self.gate_index.get(gate_id).map(|&gi| &self.gates[gi])
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn transform(&self, id: &str) -> Option<&Transform> {
        self.transforms.get(id)
    }

    pub fn matrix(&self, id: &str) -> Option<&CompensationMatrix> {
        self.matrices.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub(crate) fn population(&self, gate_id: &str) -> Result<&Population> {
        self.population_index
            .get(gate_id)
            .map(|&pi| &self.populations[pi])
            .ok_or_else(|| GatingError::unknown_gate(gate_id))
    }

    pub(crate) fn population_at(&self, index: usize) -> &Population {
        &self.populations[index]
    }

    pub(crate) fn population_position(&self, gate_id: &str) -> Option<usize> {
        self.population_index.get(gate_id).copied()
    }

    pub(crate) fn population_count(&self) -> usize {
        self.populations.len()
    }

    /// Population indices defined by gate `gi`, in quadrant order
    pub(crate) fn gate_populations(&self, gi: usize) -> impl Iterator<Item = usize> + '_ {
        self.populations
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.gate == gi)
            .map(|(pi, _)| pi)
    }

    fn gate_parent(&self, gi: usize) -> Option<&str> {
        self.populations
            .iter()
            .find(|p| p.gate == gi)
            .and_then(|p| p.parent.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::BooleanGate;
    use crate::dimension::Dimension;
    use crate::quadrant::{QuadrantGate, Sign};
    use crate::rectangle::RangeGate;

    fn range(id: &str) -> Gate {
        Gate::range(
            id,
            RangeGate::new(Dimension::new("x"), Some(0.0), Some(1.0)).unwrap(),
        )
    }

    fn quads(id: &str) -> Gate {
        Gate::quadrant(
            id,
            QuadrantGate::two_way(
                Dimension::new("x"),
                0.5,
                Dimension::new("y"),
                0.5,
                [
                    ("q--", Sign::Negative, Sign::Negative),
                    ("q+-", Sign::Positive, Sign::Negative),
                    ("q-+", Sign::Negative, Sign::Positive),
                    ("q++", Sign::Positive, Sign::Positive),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_duplicate_id() {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("a"), None).unwrap();
        let err = strategy.add_gate(range("a"), None).unwrap_err();
        assert!(matches!(err, GatingError::InvalidHierarchy { .. }));
        // ids are case sensitive
        assert!(strategy.add_gate(range("A"), None).is_ok());
    }

    #[test]
    fn test_out_of_order_parents() {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("child"), Some("parent")).unwrap();
        assert!(strategy.validate().is_err());
        strategy.add_gate(range("parent"), None).unwrap();
        strategy.validate().unwrap();
        assert_eq!(strategy.evaluation_order().unwrap(), vec!["parent", "child"]);
        assert_eq!(strategy.depth("child").unwrap(), 2);
    }

    #[test]
    fn test_parent_cycle() {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("a"), Some("b")).unwrap();
        let err = strategy.add_gate(range("b"), Some("a")).unwrap_err();
        assert!(matches!(err, GatingError::InvalidHierarchy { .. }));
        let err = strategy.add_gate(range("c"), Some("c")).unwrap_err();
        assert!(matches!(err, GatingError::InvalidHierarchy { .. }));
    }

    #[test]
    fn test_boolean_cycle() {
        let mut strategy = GatingStrategy::new();
        strategy
            .add_gate(Gate::boolean("x", BooleanGate::not("y").unwrap()), None)
            .unwrap();
        strategy
            .add_gate(Gate::boolean("y", BooleanGate::not("x").unwrap()), None)
            .unwrap();
        let err = strategy.validate().unwrap_err();
        assert!(matches!(err, GatingError::InvalidHierarchy { .. }));
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_boolean_operand_under_its_own_child() {
        // b is nested under the boolean gate that references it
        let mut strategy = GatingStrategy::new();
        strategy
            .add_gate(Gate::boolean("bool", BooleanGate::and(["b"]).unwrap()), None)
            .unwrap();
        strategy.add_gate(range("b"), Some("bool")).unwrap();
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_unknown_operand() {
        let mut strategy = GatingStrategy::new();
        strategy
            .add_gate(Gate::boolean("b", BooleanGate::or(["missing"]).unwrap()), None)
            .unwrap();
        let err = strategy.validate().unwrap_err();
        assert_eq!(err.gate_id(), Some("b"));
        assert!(matches!(err.root_cause(), GatingError::InvalidHierarchy { .. }));
    }

    #[test]
    fn test_unregistered_transform() {
        let mut strategy = GatingStrategy::new();
        let gate = Gate::range(
            "g",
            RangeGate::new(Dimension::new("x").with_transform("logicle"), Some(0.0), None).unwrap(),
        );
        strategy.add_gate(gate, None).unwrap();
        assert!(strategy.validate().is_err());
        strategy
            .add_transform("logicle", Transform::logicle(262144.0, 0.5, 4.5, 0.0).unwrap())
            .unwrap();
        strategy.validate().unwrap();
    }

    #[test]
    fn test_quadrant_populations() {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("cells"), None).unwrap();
        strategy.add_gate(quads("quads"), Some("cells")).unwrap();
        strategy.add_gate(range("deep"), Some("q++")).unwrap();
        strategy.validate().unwrap();

        assert_eq!(
            strategy.get_child_gate_ids("cells").unwrap(),
            vec!["q--", "q+-", "q-+", "q++"]
        );
        assert_eq!(strategy.get_parent_gate_id("q+-").unwrap(), Some("cells"));
        assert_eq!(strategy.gate_kind("q++").unwrap(), GateType::Quadrant);
        assert!(matches!(
            strategy.gate_kind("quads"),
            Err(GatingError::UnknownGate { .. })
        ));
        assert!(strategy.gate("quads").is_some());

        // the container cannot be a parent
        strategy.add_gate(range("bad"), Some("quads")).unwrap();
        assert!(strategy.validate().is_err());
    }

    #[test]
    fn test_quadrant_id_collision() {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("q++"), None).unwrap();
        assert!(strategy.add_gate(quads("quads"), None).is_err());
        assert!(strategy.gate("quads").is_none());
    }

    #[test]
    fn test_definition_round_trip() {
        let json = r#"{
            "transforms": [{"id": "lin", "type": "linear", "t": 10.0, "a": 0.0}],
            "gates": [
                {"id": "child", "parent": "top", "type": "range",
                 "dimension": {"channel": "x", "transform": "lin"}, "max": 0.5},
                {"id": "top", "type": "range", "dimension": {"channel": "x"}, "min": 1.0}
            ]
        }"#;
        let strategy = GatingStrategy::from_json(json).unwrap();
        assert_eq!(strategy.evaluation_order().unwrap(), vec!["top", "child"]);

        let definition = strategy.to_definition();
        let rebuilt = GatingStrategy::from_definition(definition.clone()).unwrap();
        assert_eq!(rebuilt.to_definition(), definition);
    }
}
