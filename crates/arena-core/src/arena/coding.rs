//! Coding arena: bug fixing, features, optimization, testing, documentation.

use std::time::Duration;

use arena_state::ArenaType;
use serde_json::{json, Value};

use super::rubric::coding_effectiveness;
use super::upi::{autonomy, coding_efficiency, upi};
use super::{run_upi_battery, select_ids, AgentInterface};
use crate::domain::{ArenaRunResult, EngineFailure, Expectation, ScenarioSpec, UpiBreakdown};
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::scoring::UpiWeights;

pub const DEFAULT_KEYWORD: &str = "bug_fixing";

pub const KEYWORD_SCENARIOS: [(&str, [&str; 3]); 5] = [
    ("bug_fixing", ["fix_failing_tests", "debug_error", "patch_security"]),
    ("feature_impl", ["implement_function", "add_endpoint", "create_model"]),
    ("optimization", ["improve_performance", "reduce_complexity", "refactor"]),
    ("testing", ["write_unit_tests", "add_integration_tests", "improve_coverage"]),
    ("documentation", ["write_docstrings", "create_readme", "api_documentation"]),
];

/// Battery used when no keyword matches.
pub const DEFAULT_BATTERY: [&str; 3] = ["fix_failing_tests", "implement_function", "write_docstrings"];

fn challenge(id: &str, name: &str, difficulty: f64, input: Value, flags: &[&str]) -> ScenarioSpec {
    flags.iter().fold(
        ScenarioSpec::new(id, name, ArenaType::Coding, difficulty).with_input(input),
        |spec, key| spec.requires(*key, Expectation::Flag(true)),
    )
}

/// Challenge graded by a test suite of `tests_total` cases.
fn tested(id: &str, name: &str, difficulty: f64, input: Value) -> ScenarioSpec {
    let total = input.get("tests_total").and_then(Value::as_u64).unwrap_or(0);
    challenge(id, name, difficulty, input, &["compile_success"])
        .requires("tests_passed", Expectation::AtLeast(total as f64))
}

/// All coding scenarios, in keyword order.
pub fn catalog() -> Vec<ScenarioSpec> {
    vec![
        tested(
            "fix_failing_tests",
            "Fix Failing Unit Tests",
            1.0,
            json!({
                "code": "def calculate_average(numbers):\n    return sum(numbers) / len(numbers)\n\n\
                         def find_max(numbers):\n    max_val = numbers[0]\n    for n in numbers:\n        \
                         if n > max_val:\n            max_val = n\n    return max_val\n",
                "tests": [
                    {"name": "test_average_normal", "input": [[1, 2, 3]], "expected": 2.0},
                    {"name": "test_average_empty", "input": [[]], "expected": 0},
                    {"name": "test_max_normal", "input": [[1, 5, 3]], "expected": 5},
                    {"name": "test_max_empty", "input": [[]], "expected": null},
                ],
                "tests_total": 4,
            }),
        ),
        challenge(
            "debug_error",
            "Debug Runtime Error",
            1.1,
            json!({
                "code": "def process_data(data):\n    result = []\n    for item in data:\n        \
                         result.append(item['value'] * 2)\n    return result\n",
                "error": "KeyError: 'value'",
                "test_input": [{"value": 1}, {"name": "test"}, {"value": 3}],
            }),
            &["error_fixed", "handles_edge_cases"],
        ),
        challenge(
            "patch_security",
            "Patch Security Vulnerability",
            1.3,
            json!({
                "code": "import os\n\ndef execute_command(user_input):\n    os.system(f\"echo {user_input}\")\n",
                "vulnerability_type": "command_injection",
            }),
            &["vulnerability_fixed", "input_sanitized"],
        ),
        tested(
            "implement_function",
            "Implement Function from Spec",
            1.0,
            json!({
                "spec": "Implement fibonacci(n) returning the nth Fibonacci number. \
                         fibonacci(0) = 0, fibonacci(1) = 1, negative inputs return None.",
                "tests": [
                    {"input": 0, "expected": 0},
                    {"input": 1, "expected": 1},
                    {"input": 10, "expected": 55},
                    {"input": -1, "expected": null},
                ],
                "tests_total": 4,
            }),
        ),
        challenge(
            "add_endpoint",
            "Add API Endpoint",
            1.2,
            json!({
                "framework": "flask",
                "spec": "Add GET /api/users/<user_id> returning user JSON, 404 when missing, \
                         400 when user_id is not an integer.",
                "existing_code": "from flask import Flask, jsonify\napp = Flask(__name__)\n\n\
                                  users = {1: {'name': 'Alice'}, 2: {'name': 'Bob'}}\n",
            }),
            &["endpoint_added", "handles_not_found", "handles_invalid_input"],
        ),
        challenge(
            "create_model",
            "Create Data Model",
            1.1,
            json!({
                "spec": "SQLAlchemy model Product: id (Integer, primary key), name (String, required, \
                         max 100), price (Float, required, positive), stock (Integer, default 0), \
                         created_at (DateTime, auto-set).",
            }),
            &["model_created", "all_fields_present", "constraints_applied"],
        ),
        challenge(
            "improve_performance",
            "Improve Algorithm Performance",
            1.2,
            json!({
                "code": "def find_duplicates(arr):\n    duplicates = []\n    for i in range(len(arr)):\n        \
                         for j in range(i + 1, len(arr)):\n            \
                         if arr[i] == arr[j] and arr[i] not in duplicates:\n                \
                         duplicates.append(arr[i])\n    return duplicates\n",
                "benchmark": {"input_size": 10000, "target_ms": 100},
            }),
            &["performance_improved", "functionality_preserved"],
        ),
        challenge(
            "reduce_complexity",
            "Reduce Code Complexity",
            1.1,
            json!({
                "code": "def process_order(order):\n    if order is not None:\n        \
                         if order.status == 'pending':\n            if order.items is not None:\n                \
                         if len(order.items) > 0:\n                    if order.total > 0:\n                        \
                         if order.customer is not None:\n                            return True\n    return False\n",
                "complexity_target": "cyclomatic < 5",
            }),
            &["complexity_reduced", "logic_preserved"],
        ),
        challenge(
            "refactor",
            "Refactor Code",
            1.0,
            json!({
                "code": "def f(x):\n    r = x * 2\n    return r\n\ndef g(x):\n    r = x * 2\n    return r + 1\n\n\
                         def h(x):\n    r = x * 2\n    return r - 1\n",
            }),
            &["duplication_removed", "naming_improved"],
        ),
        challenge(
            "write_unit_tests",
            "Write Unit Tests",
            1.0,
            json!({
                "code": "def validate_email(email):\n    import re\n    \
                         pattern = r'^[\\w\\.-]+@[\\w\\.-]+\\.\\w+$'\n    return bool(re.match(pattern, email))\n",
                "test_framework": "pytest",
                "coverage_target": 0.8,
            }),
            &["tests_written", "edge_cases_covered", "coverage_met"],
        ),
        challenge(
            "add_integration_tests",
            "Add Integration Tests",
            1.2,
            json!({
                "endpoint": "POST /api/orders",
                "dependencies": ["database", "payment_service"],
            }),
            &["integration_test_added", "mocks_appropriate"],
        ),
        challenge(
            "improve_coverage",
            "Improve Test Coverage",
            1.1,
            json!({
                "current_coverage": 0.65,
                "target_coverage": 0.85,
                "uncovered_lines": [15, 16, 23, 24, 25, 30],
            }),
            &["coverage_improved", "new_tests_added"],
        ),
        challenge(
            "write_docstrings",
            "Write Docstrings",
            0.9,
            json!({
                "code": "def calculate_discount(price, percentage, max_discount=None):\n    \
                         discount = price * percentage / 100\n    \
                         if max_discount and discount > max_discount:\n        discount = max_discount\n    \
                         return price - discount\n",
                "style": "google",
            }),
            &["docstring_added", "params_documented", "returns_documented"],
        ),
        challenge(
            "create_readme",
            "Create README",
            0.9,
            json!({
                "project_name": "FastAPI User Service",
                "features": ["User CRUD", "Authentication", "Rate limiting"],
                "stack": ["Python", "FastAPI", "PostgreSQL"],
            }),
            &["readme_created", "installation_included", "usage_included"],
        ),
        challenge(
            "api_documentation",
            "Generate API Documentation",
            1.0,
            json!({
                "endpoints": [
                    {"method": "GET", "path": "/users", "description": "List users"},
                    {"method": "POST", "path": "/users", "description": "Create user"},
                    {"method": "GET", "path": "/users/{id}", "description": "Get user"},
                ],
                "format": "openapi",
            }),
            &["documentation_generated", "all_endpoints_documented"],
        ),
    ]
}

/// Scenarios for an agent's keywords.
pub fn select_battery(keywords: &[String]) -> Vec<ScenarioSpec> {
    let ids = select_ids(keywords, &KEYWORD_SCENARIOS, DEFAULT_KEYWORD, &DEFAULT_BATTERY);
    let catalog = catalog();
    ids.into_iter()
        .filter_map(|id| catalog.iter().find(|s| s.id == id).cloned())
        .collect()
}

fn score(
    spec: &ScenarioSpec,
    result: &ExecutionResult,
    output: &Value,
    weights: &UpiWeights,
) -> UpiBreakdown {
    upi(
        weights,
        coding_effectiveness(spec, output),
        coding_efficiency(result.elapsed_ms, output),
        autonomy(result.retries, output),
    )
}

#[derive(Debug, Clone)]
pub struct CodingArena {
    weights: UpiWeights,
    timeout: Duration,
    battery: Option<Vec<ScenarioSpec>>,
}

impl CodingArena {
    pub fn new(weights: UpiWeights, timeout: Duration) -> Self {
        Self {
            weights,
            timeout,
            battery: None,
        }
    }

    pub fn with_battery(mut self, battery: Vec<ScenarioSpec>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub async fn run(
        &self,
        agent: &AgentInterface,
        sandbox: &dyn SandboxExecutor,
    ) -> Result<ArenaRunResult, EngineFailure> {
        let battery = match &self.battery {
            Some(fixed) => fixed.clone(),
            None => select_battery(&agent.keywords),
        };
        run_upi_battery(
            ArenaType::Coding,
            &battery,
            agent,
            sandbox,
            self.timeout,
            &self.weights,
            score,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_fifteen_challenges() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 15);
        assert!(catalog.iter().all(|s| s.arena_type == ArenaType::Coding));
        let security = catalog.iter().find(|s| s.id == "patch_security").unwrap();
        assert!((security.difficulty - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_tested_challenges_expect_full_pass() {
        let spec = catalog()
            .into_iter()
            .find(|s| s.id == "fix_failing_tests")
            .unwrap();
        assert_eq!(spec.tests_total(), Some(4));
        assert_eq!(
            spec.rubric.expectations.get("tests_passed"),
            Some(&Expectation::AtLeast(4.0))
        );
        assert_eq!(spec.payload()["report"]["tests_passed"], "count:4");
    }

    #[test]
    fn test_unknown_keyword_uses_default_battery() {
        let battery = select_battery(&["poetry".to_string()]);
        let ids: Vec<&str> = battery.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, DEFAULT_BATTERY.to_vec());
    }

    #[test]
    fn test_keyword_selection_in_order() {
        let battery = select_battery(&["documentation".to_string(), "testing".to_string()]);
        let ids: Vec<&str> = battery.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "write_docstrings",
                "create_readme",
                "api_documentation",
                "write_unit_tests",
                "add_integration_tests",
            ]
        );
    }
}
