//! Per-sample evaluation output.

use crate::error::{GatingError, Result};
use crate::types::GateType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Summary statistics of one gated population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReportRow {
    pub gate_id: String,
    /// `None` for populations under the all-events root
    pub parent_id: Option<String>,
    pub gate_kind: GateType,
    pub depth: usize,
    pub count: usize,
    pub percent_of_parent: f64,
    pub percent_of_total: f64,
}

/// Report rows of one sample, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatingReport {
    pub sample_id: String,
    pub event_count: usize,
    pub rows: Vec<GateReportRow>,
}

impl GatingReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for GatingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sample {} ({} events)", self.sample_id, self.event_count)?;
        writeln!(
            f,
            "{:<32} {:<12} {:>10} {:>10} {:>10}",
            "gate", "kind", "count", "% parent", "% total"
        )?;
        for row in &self.rows {
            let indent = "  ".repeat(row.depth.saturating_sub(1));
            writeln!(
                f,
                "{:<32} {:<12} {:>10} {:>10.2} {:>10.2}",
                format!("{indent}{}", row.gate_id),
                row.gate_kind.to_string(),
                row.count,
                row.percent_of_parent,
                row.percent_of_total
            )?;
        }
        Ok(())
    }
}

/// `100 * part / whole`, or 0 when `whole` is 0
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// Final membership of one population, as produced by the evaluator
#[derive(Debug, Clone)]
pub(crate) struct EvaluatedPopulation {
    pub id: Arc<str>,
    pub parent: Option<Arc<str>>,
    pub kind: GateType,
    pub depth: usize,
    pub mask: Vec<bool>,
}

/// Membership vectors and statistics of one sample, immutable once built
#[derive(Debug, Clone)]
pub struct GatingResults {
    membership: FxHashMap<Arc<str>, Vec<bool>>,
    rows: FxHashMap<Arc<str>, usize>,
    report: GatingReport,
}

impl GatingResults {
    /// Assemble results from final memberships, listed parents first
    pub(crate) fn new(
        sample_id: impl Into<String>,
        event_count: usize,
        populations: Vec<EvaluatedPopulation>,
    ) -> Self {
        let mut membership = FxHashMap::default();
        let mut row_index: FxHashMap<Arc<str>, usize> = FxHashMap::default();
        let mut rows: Vec<GateReportRow> = Vec::with_capacity(populations.len());

        for EvaluatedPopulation {
            id,
            parent,
            kind: gate_kind,
            depth,
            mask,
        } in populations
        {
            let count = crate::batch_filtering::count(&mask);
            let parent_count = parent
                .as_ref()
                .and_then(|p| row_index.get(p))
                .map_or(event_count, |&r| rows[r].count);
            rows.push(GateReportRow {
                gate_id: id.to_string(),
                parent_id: parent.map(|p| p.to_string()),
                gate_kind,
                depth,
                count,
                percent_of_parent: percent(count, parent_count),
                percent_of_total: percent(count, event_count),
            });
            row_index.insert(id.clone(), rows.len() - 1);
            membership.insert(id, mask);
        }

        Self {
            membership,
            rows: row_index,
            report: GatingReport {
                sample_id: sample_id.into(),
                event_count,
                rows,
            },
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.report.sample_id
    }

    pub fn event_count(&self) -> usize {
        self.report.event_count
    }

    /// Gate ids in evaluation order
    pub fn gate_ids(&self) -> impl Iterator<Item = &str> {
        self.report.rows.iter().map(|r| r.gate_id.as_str())
    }

    pub fn get_gate_membership(&self, gate_id: &str) -> Result<&[bool]> {
        self.membership
            .get(gate_id)
            .map(Vec::as_slice)
            .ok_or_else(|| GatingError::unknown_gate(gate_id))
    }

    pub fn get_gate_row(&self, gate_id: &str) -> Result<&GateReportRow> {
        self.rows
            .get(gate_id)
            .map(|&r| &self.report.rows[r])
            .ok_or_else(|| GatingError::unknown_gate(gate_id))
    }

    pub fn get_gate_count(&self, gate_id: &str) -> Result<usize> {
        Ok(self.get_gate_row(gate_id)?.count)
    }

    /// Percent of the parent population
    pub fn get_gate_relative_percent(&self, gate_id: &str) -> Result<f64> {
        Ok(self.get_gate_row(gate_id)?.percent_of_parent)
    }

    /// Percent of all events in the sample
    pub fn get_gate_absolute_percent(&self, gate_id: &str) -> Result<f64> {
        Ok(self.get_gate_row(gate_id)?.percent_of_total)
    }

    pub fn report(&self) -> &GatingReport {
        &self.report
    }
}
