use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dashboard counters keyed by name (`achievements`, `total_users`,
/// `pending_grading`, ...). Which counters are present depends on the role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardStats(BTreeMap<String, Value>);

impl DashboardStats {
    /// Counter value; missing or non-numeric counters read as 0
    pub fn count(&self, name: &str) -> i64 {
        match self.0.get(name) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn raw(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}
