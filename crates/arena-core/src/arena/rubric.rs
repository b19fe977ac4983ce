//! Effectiveness scoring against a scenario rubric.

use serde_json::Value;

use super::upi::clamp01;
use crate::domain::{Expectation, Rubric, ScenarioSpec};

/// Partial credit for a present field whose expectation is not checkable.
const PRESENT_CREDIT: f64 = 0.5;
const COMPILE_BONUS: f64 = 0.10;

fn credit(expectation: &Expectation, actual: &Value) -> f64 {
    match expectation {
        Expectation::Flag(expected) => {
            if actual.as_bool() == Some(*expected) {
                1.0
            } else {
                0.0
            }
        }
        Expectation::AtLeast(threshold) => match actual.as_f64() {
            Some(v) if v >= *threshold => 1.0,
            _ => 0.0,
        },
        Expectation::Present => PRESENT_CREDIT,
    }
}

/// Fraction of rubric expectations met by `output`, in `[0, 1]`.
///
/// Missing or null fields earn nothing. An empty rubric gives full credit
/// for any non-null output.
pub fn rubric_credit(rubric: &Rubric, output: &Value) -> f64 {
    if rubric.is_empty() {
        return if output.is_null() { 0.0 } else { 1.0 };
    }
    let earned: f64 = rubric
        .expectations
        .iter()
        .map(|(key, expectation)| match output.get(key) {
            None | Some(Value::Null) => 0.0,
            Some(actual) => credit(expectation, actual),
        })
        .sum();
    clamp01(earned / rubric.len() as f64)
}

/// Coding effectiveness: test pass rate when the scenario declares
/// `tests_total` and the agent reports `tests_passed`, otherwise the
/// generic rubric. Scaled by difficulty and capped at 1.
pub fn coding_effectiveness(spec: &ScenarioSpec, output: &Value) -> f64 {
    let passed = output.get("tests_passed").and_then(Value::as_f64);
    let base = match (spec.tests_total(), passed) {
        (Some(total), Some(passed)) if total > 0 => {
            let mut rate = clamp01(passed / total as f64);
            // An absent flag is read as a successful compile.
            let compiled = output
                .get("compile_success")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            if compiled {
                rate += COMPILE_BONUS;
            }
            rate.min(1.0)
        }
        _ => rubric_credit(&spec.rubric, output),
    };
    clamp01(base * spec.difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_state::ArenaType;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sample_rubric() -> Rubric {
        ScenarioSpec::new("s", "S", ArenaType::Utility, 1.0)
            .requires("done", Expectation::Flag(true))
            .requires("accuracy", Expectation::AtLeast(0.8))
            .requires("summary", Expectation::Present)
            .requires("valid", Expectation::Flag(true))
            .rubric
    }

    #[test]
    fn test_full_and_partial_credit() {
        let rubric = sample_rubric();
        let full = json!({"done": true, "accuracy": 0.9, "summary": "x", "valid": true});
        // Present-only field is capped at half credit.
        assert!(approx(rubric_credit(&rubric, &full), 3.5 / 4.0));

        let partial = json!({"done": false, "accuracy": 0.5, "summary": "x"});
        assert!(approx(rubric_credit(&rubric, &partial), 0.5 / 4.0));
    }

    #[test]
    fn test_missing_and_mistyped_fields_earn_nothing() {
        let rubric = sample_rubric();
        let out = json!({"done": "yes", "accuracy": "high", "summary": null});
        assert!(approx(rubric_credit(&rubric, &out), 0.0));
    }

    #[test]
    fn test_empty_rubric() {
        let rubric = Rubric::default();
        assert!(approx(rubric_credit(&rubric, &json!({"anything": 1})), 1.0));
        assert!(approx(rubric_credit(&rubric, &Value::Null), 0.0));
    }

    #[test]
    fn test_coding_pass_rate_with_compile_bonus() {
        let spec = ScenarioSpec::new("fix", "Fix", ArenaType::Coding, 1.0)
            .with_input(json!({"tests_total": 4}))
            .requires("tests_passed", Expectation::AtLeast(4.0));

        let out = json!({"tests_passed": 3, "compile_success": true});
        assert!(approx(coding_effectiveness(&spec, &out), 0.85));

        let no_flag = json!({"tests_passed": 4});
        assert!(approx(coding_effectiveness(&spec, &no_flag), 1.0));

        let failed_compile = json!({"tests_passed": 2, "compile_success": false});
        assert!(approx(coding_effectiveness(&spec, &failed_compile), 0.5));
    }

    #[test]
    fn test_coding_difficulty_scales_and_caps() {
        let spec = ScenarioSpec::new("sec", "Patch", ArenaType::Coding, 1.3)
            .requires("vulnerability_fixed", Expectation::Flag(true))
            .requires("input_sanitized", Expectation::Flag(true));
        let half = json!({"vulnerability_fixed": true, "input_sanitized": false});
        assert!(approx(coding_effectiveness(&spec, &half), 0.65));
        let full = json!({"vulnerability_fixed": true, "input_sanitized": true});
        assert!(approx(coding_effectiveness(&spec, &full), 1.0));
    }
}
