//! Boolean combinations of other gates.
//!
//! Operands are gate ids anywhere in the strategy. Operators combine the
//! operands' effective memberships, so a boolean gate sees exactly the
//! events that were gated into each operand.

use crate::error::{GatingError, Result};
use crate::traits::GateValidation;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BoolOperator {
    And,
    Or,
    Not,
}

/// Reference to another gate, optionally complemented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolOperand {
    pub gate_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub complement: bool,
}

impl BoolOperand {
    pub fn new(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            complement: false,
        }
    }

    pub fn complement(gate_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            complement: true,
        }
    }

    #[inline]
    fn value(&self, membership: &[bool], index: usize) -> bool {
        membership[index] != self.complement
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanGate {
    pub operator: BoolOperator,
    pub operands: Vec<BoolOperand>,
}

impl BooleanGate {
    pub fn new(operator: BoolOperator, operands: Vec<BoolOperand>) -> Result<Self> {
        let gate = Self { operator, operands };
        gate.validate()?;
        Ok(gate)
    }

    pub fn and<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::new(BoolOperator::And, ids.into_iter().map(BoolOperand::new).collect())
    }

    pub fn or<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::new(BoolOperator::Or, ids.into_iter().map(BoolOperand::new).collect())
    }

    pub fn not(id: impl Into<String>) -> Result<Self> {
        Self::new(BoolOperator::Not, vec![BoolOperand::new(id)])
    }

    pub fn operand_ids(&self) -> impl Iterator<Item = &str> {
        self.operands.iter().map(|o| o.gate_id.as_str())
    }

    /// Combine operand memberships for one event. `memberships` is in
    /// operand order.
    #[inline]
    pub fn combine(&self, memberships: &[&[bool]], index: usize) -> bool {
        let mut values = self
            .operands
            .iter()
            .zip(memberships)
            .map(|(operand, m)| operand.value(m, index));
        match self.operator {
            BoolOperator::And => values.all(|v| v),
            BoolOperator::Or => values.any(|v| v),
            BoolOperator::Not => !values.next().unwrap_or(false),
        }
    }
}

impl GateValidation for BooleanGate {
    fn validate(&self) -> Result<()> {
        match (self.operator, self.operands.len()) {
            (BoolOperator::Not, 1) => Ok(()),
            (BoolOperator::Not, n) => Err(GatingError::invalid_hierarchy(format!(
                "NOT takes exactly one operand, got {n}"
            ))),
            (op, 0) => Err(GatingError::invalid_hierarchy(format!(
                "{} needs at least one operand",
                op.to_string().to_uppercase()
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_operators() {
        let a = [true, true, false, false];
        let b = [true, false, true, false];
        let eval = |gate: &BooleanGate, ms: &[&[bool]]| -> Vec<bool> {
            (0..4).map(|i| gate.combine(ms, i)).collect()
        };

        assert_eq!(
            eval(&BooleanGate::and(["a", "b"]).unwrap(), &[&a, &b]),
            vec![true, false, false, false]
        );
        assert_eq!(
            eval(&BooleanGate::or(["a", "b"]).unwrap(), &[&a, &b]),
            vec![true, true, true, false]
        );
        assert_eq!(
            eval(&BooleanGate::not("a").unwrap(), &[&a]),
            vec![false, false, true, true]
        );
    }

    #[test]
    fn test_complemented_operand() {
        let gate = BooleanGate::new(
            BoolOperator::And,
            vec![BoolOperand::new("a"), BoolOperand::complement("b")],
        )
        .unwrap();
        let a = [true, true];
        let b = [true, false];
        assert!(!gate.combine(&[&a, &b], 0));
        assert!(gate.combine(&[&a, &b], 1));
    }

    #[test]
    fn test_operand_counts() {
        let err = BooleanGate::new(
            BoolOperator::Not,
            vec![BoolOperand::new("a"), BoolOperand::new("b")],
        )
        .unwrap_err();
        assert!(matches!(err, GatingError::InvalidHierarchy { .. }));
        assert!(BooleanGate::new(BoolOperator::Or, vec![]).is_err());
        assert!(BooleanGate::and(["only"]).is_ok());
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(BoolOperator::from_str("AND").unwrap(), BoolOperator::And);
        assert_eq!(BoolOperator::Not.to_string(), "not");
    }
}
