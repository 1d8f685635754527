//! Hierarchy renderings for display: an ASCII tree and a nested mapping.

use crate::error::Result;
use crate::strategy::GatingStrategy;
use serde_json::{Value, json};
use strum_macros::{Display, EnumString};

const ROOT: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HierarchyFormat {
    #[default]
    Ascii,
    Json,
}

impl GatingStrategy {
    /// Tree of gate ids under `root`, e.g.
    ///
    /// ```text
    /// root
    /// ├── Range1
    /// ├── Polygon1
    /// │   ╰── ParAnd2
    /// ╰── Ellipse1
    /// ```
    pub fn ascii(&self) -> String {
        let mut lines = vec![ROOT.to_string()];
        let roots = self.root_gate_ids();
        for (i, id) in roots.iter().enumerate() {
            self.ascii_node(id, "", i + 1 == roots.len(), &mut lines);
        }
        lines.join("\n")
    }

    fn ascii_node(&self, id: &str, prefix: &str, last: bool, lines: &mut Vec<String>) {
        let branch = if last { "╰── " } else { "├── " };
        lines.push(format!("{prefix}{branch}{id}"));
        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        let children = self.get_child_gate_ids(id).unwrap_or_default();
        for (i, child) in children.iter().enumerate() {
            self.ascii_node(child, &child_prefix, i + 1 == children.len(), lines);
        }
    }

    /// Nested mapping of the hierarchy with gate kinds and boolean operands
    pub fn to_value(&self) -> Value {
        let children: Vec<Value> = self
            .root_gate_ids()
            .into_iter()
            .map(|id| self.node_value(id))
            .collect();
        json!({ "id": ROOT, "children": children })
    }

    fn node_value(&self, id: &str) -> Value {
        let children: Vec<Value> = self
            .get_child_gate_ids(id)
            .unwrap_or_default()
            .into_iter()
            .map(|c| self.node_value(c))
            .collect();
        let kind = self.gate_kind(id).map(|k| k.to_string()).ok();
        let mut node = json!({ "id": id, "type": kind, "children": children });
        if let Some(gate) = self.gate(id) {
            let operands = gate.kind.operand_ids();
            if !operands.is_empty() {
                node["operands"] = json!(operands);
            }
        }
        node
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn get_gate_hierarchy(&self, format: HierarchyFormat) -> Result<String> {
        match format {
            HierarchyFormat::Ascii => Ok(self.ascii()),
            HierarchyFormat::Json => self.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::BooleanGate;
    use crate::dimension::Dimension;
    use crate::rectangle::RangeGate;
    use crate::types::Gate;
    use std::str::FromStr;

    fn range(id: &str) -> Gate {
        Gate::range(
            id,
            RangeGate::new(Dimension::new("x"), Some(0.0), None).unwrap(),
        )
    }

    fn strategy() -> GatingStrategy {
        let mut strategy = GatingStrategy::new();
        strategy.add_gate(range("Range1"), None).unwrap();
        strategy.add_gate(range("Polygon1"), None).unwrap();
        strategy
            .add_gate(
                Gate::boolean("ParAnd2", BooleanGate::and(["Range1", "Polygon1"]).unwrap()),
                Some("Polygon1"),
            )
            .unwrap();
        strategy.add_gate(range("Ellipse1"), None).unwrap();
        strategy
    }

    #[test]
    fn test_ascii_tree() {
        let expected = "root\n├── Range1\n├── Polygon1\n│   ╰── ParAnd2\n╰── Ellipse1";
        assert_eq!(strategy().ascii(), expected);
    }

    #[test]
    fn test_nested_value() {
        let value = strategy().to_value();
        assert_eq!(value["id"], "root");
        let polygon = &value["children"][1];
        assert_eq!(polygon["id"], "Polygon1");
        assert_eq!(polygon["type"], "range");
        let and = &polygon["children"][0];
        assert_eq!(and["type"], "boolean");
        assert_eq!(and["operands"], json!(["Range1", "Polygon1"]));
    }

    #[test]
    fn test_format_dispatch() {
        let strategy = strategy();
        let format = HierarchyFormat::from_str("JSON").unwrap();
        let json = strategy.get_gate_hierarchy(format).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, strategy.to_value());
        assert_eq!(
            strategy.get_gate_hierarchy(HierarchyFormat::default()).unwrap(),
            strategy.ascii()
        );
    }
}
