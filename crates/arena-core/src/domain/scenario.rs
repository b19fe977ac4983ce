//! Scenario definitions: the fixed inputs an agent is evaluated against.

use std::collections::BTreeMap;

use arena_state::ArenaType;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key under which a scenario payload declares the fields it expects back.
pub const REPORT_KEY: &str = "report";

/// What a rubric expects to find under one output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    /// Output must equal this boolean.
    Flag(bool),
    /// Output must be numeric and at least this value.
    AtLeast(f64),
    /// Output only needs to be present; earns partial credit.
    Present,
}

impl Expectation {
    /// Report-schema type string for this expectation.
    ///
    /// Thresholds above 1 are counts (`count:N`), the rest are ratios.
    pub fn report_type(&self) -> String {
        match self {
            Expectation::Flag(_) => "bool".to_string(),
            Expectation::AtLeast(t) if *t > 1.0 => format!("count:{}", t.ceil() as u64),
            Expectation::AtLeast(_) => "ratio".to_string(),
            Expectation::Present => "text".to_string(),
        }
    }
}

/// Expected output fields for a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub expectations: BTreeMap<String, Expectation>,
}

impl Rubric {
    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }
}

/// One immutable arena scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub id: String,
    pub name: String,
    pub arena_type: ArenaType,
    /// Multiplier reflecting task hardness, typically 0.8..=1.4
    pub difficulty: f64,
    pub input: Value,
    pub rubric: Rubric,
}

impl ScenarioSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arena_type: ArenaType,
        difficulty: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arena_type,
            difficulty,
            input: Value::Object(Map::new()),
            rubric: Rubric::default(),
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Add an expected output field to the rubric.
    pub fn requires(mut self, key: impl Into<String>, expectation: Expectation) -> Self {
        self.rubric.expectations.insert(key.into(), expectation);
        self
    }

    /// The payload handed to the agent: `input` plus a `report` object
    /// naming each expected field and its type.
    ///
    /// An explicit `report` already present in `input` is kept as is.
    pub fn payload(&self) -> Value {
        let mut payload = match &self.input {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other.clone());
                map
            }
        };
        if !payload.contains_key(REPORT_KEY) && !self.rubric.is_empty() {
            let report: Map<String, Value> = self
                .rubric
                .expectations
                .iter()
                .map(|(k, e)| (k.clone(), json!(e.report_type())))
                .collect();
            payload.insert(REPORT_KEY.to_string(), Value::Object(report));
        }
        Value::Object(payload)
    }

    /// `tests_total` declared by the input, if any.
    pub fn tests_total(&self) -> Option<u64> {
        self.input.get("tests_total").and_then(Value::as_u64)
    }
}
