//! Deterministic in-process sandbox.
//!
//! Never runs the submitted code. It screens the source for host-access and
//! network constructs, treats an unbroken `while True:` loop as code that
//! never returns, and otherwise fabricates the fields the scenario asks for
//! in its `report` schema. Output is derived from SHA-256 of code and input,
//! so the same code always yields the same result. Simulated crashes are
//! keyed by the request and the attempt number, never by call order.
//!
//! Report field types: `bool`, `ratio`, `count:N`, `range:LO:HI`,
//! `positions:N`, `text`.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::{SandboxError, SandboxResult};
use super::executor::SandboxExecutor;
use super::result::{ExecutionResult, Resource};
use super::settings::MockSettings;
use crate::domain::REPORT_KEY;

const NETWORK_PATTERN: &str =
    r"(?m)^\s*(?:import|from)\s+(?:socket|requests|urllib|http\.client|httpx|aiohttp)\b";
const HOST_IMPORT_PATTERN: &str =
    r"(?m)^\s*(?:import|from)\s+(?:os|subprocess|shutil|ctypes|multiprocessing)\b";
const HOST_CALL_PATTERN: &str = r"\b(?:eval|exec|__import__|open|compile)\s*\(";
const LOOP_PATTERN: &str = r"(?m)^\s*while\s+(?:True|1)\s*:";
const BREAK_PATTERN: &str = r"\bbreak\b";

fn compile(pattern: &str) -> SandboxResult<Regex> {
    Regex::new(pattern).map_err(|source| SandboxError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Deterministic byte stream keyed by a seed.
struct SeededStream {
    seed: [u8; 32],
    counter: u64,
}

impl SeededStream {
    fn new(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
            hasher.update([0u8]);
        }
        Self {
            seed: hasher.finalize().into(),
            counter: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update(self.counter.to_le_bytes());
        self.counter += 1;
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub struct MockSandbox {
    settings: MockSettings,
    network: Regex,
    host_import: Regex,
    host_call: Regex,
    endless_loop: Regex,
    loop_break: Regex,
}

impl MockSandbox {
    pub fn new(settings: MockSettings) -> SandboxResult<Self> {
        Ok(Self {
            settings,
            network: compile(NETWORK_PATTERN)?,
            host_import: compile(HOST_IMPORT_PATTERN)?,
            host_call: compile(HOST_CALL_PATTERN)?,
            endless_loop: compile(LOOP_PATTERN)?,
            loop_break: compile(BREAK_PATTERN)?,
        })
    }

    fn screen(&self, code: &str) -> Option<ExecutionResult> {
        if let Some(m) = self.network.find(code) {
            return Some(ExecutionResult::resource_exceeded(
                Resource::Network,
                format!("network access denied: {}", m.as_str().trim()),
                0,
            ));
        }
        if let Some(m) = self
            .host_import
            .find(code)
            .or_else(|| self.host_call.find(code))
        {
            return Some(ExecutionResult::crashed(
                format!("forbidden construct: {}", m.as_str().trim()),
                0,
            ));
        }
        None
    }

    fn never_returns(&self, code: &str) -> bool {
        self.endless_loop.is_match(code) && !self.loop_break.is_match(code)
    }

    fn latency_ms(&self, stream: &mut SeededStream) -> u64 {
        let lo = self.settings.latency_min_ms;
        let hi = self.settings.latency_max_ms.max(lo);
        lo + stream.next_u64() % (hi - lo).saturating_add(1)
    }

    fn fabricate(report: Option<&Map<String, Value>>, stream: &mut SeededStream) -> Value {
        let Some(report) = report else {
            let mut fingerprint = [0u8; 6];
            fingerprint.copy_from_slice(&stream.seed[..6]);
            return json!({ "status": "ok", "fingerprint": hex::encode(fingerprint) });
        };

        let mut out = Map::new();
        for (field, kind) in report {
            let kind = kind.as_str().unwrap_or("text");
            out.insert(field.clone(), Self::fabricate_field(kind, stream));
        }
        Value::Object(out)
    }

    fn fabricate_field(kind: &str, stream: &mut SeededStream) -> Value {
        let mut parts = kind.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("bool"), None, None) => json!(stream.next_f64() < 0.8),
            (Some("ratio"), None, None) => json!(round2(0.5 + 0.5 * stream.next_f64())),
            (Some("count"), Some(n), None) => {
                let n: u64 = n.parse().unwrap_or(1);
                let v = ((n as f64) * (0.5 + 0.5 * stream.next_f64())).round() as u64;
                json!(v.min(n))
            }
            (Some("range"), Some(lo), Some(hi)) => {
                let lo: f64 = lo.parse().unwrap_or(0.0);
                let hi: f64 = hi.parse().unwrap_or(1.0);
                json!(round2(lo + (hi - lo) * stream.next_f64()))
            }
            (Some("positions"), Some(n), None) => {
                let n: usize = n.parse().unwrap_or(0);
                let positions: Vec<f64> = (0..n)
                    .map(|_| round2(2.0 * stream.next_f64() - 1.0))
                    .collect();
                json!(positions)
            }
            (Some("text"), None, None) => json!("ok"),
            _ => Value::Null,
        }
    }
}

#[async_trait]
impl SandboxExecutor for MockSandbox {
    async fn execute(&self, code: &str, input: &Value, timeout: Duration) -> ExecutionResult {
        self.execute_attempt(code, input, timeout, 1).await
    }

    async fn execute_attempt(
        &self,
        code: &str,
        input: &Value,
        _timeout: Duration,
        attempt: u32,
    ) -> ExecutionResult {
        if let Some(rejected) = self.screen(code) {
            debug!(status = rejected.status.label(), "mock sandbox rejected code");
            return rejected;
        }
        if self.never_returns(code) {
            // The caller's timeout is the only way out.
            return std::future::pending().await;
        }

        let input_text = input.to_string();
        let mut stream = SeededStream::new(&[code.as_bytes(), input_text.as_bytes()]);
        let elapsed_ms = self.latency_ms(&mut stream);

        if self.settings.failure_rate > 0.0 {
            let mut failure = SeededStream::new(&[&stream.seed, &attempt.to_le_bytes()]);
            if failure.next_f64() < self.settings.failure_rate {
                return ExecutionResult::crashed("simulated sandbox failure", elapsed_ms);
            }
        }

        if self.settings.sleep {
            tokio::time::sleep(Duration::from_millis(elapsed_ms)).await;
        }

        let report = input.get(REPORT_KEY).and_then(Value::as_object);
        let output = Self::fabricate(report, &mut stream);
        ExecutionResult::success(output, elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::result::ExecutionStatus;

    const CLEAN: &str = "def decide(state):\n    return {'ok': True}\n";

    fn mock() -> MockSandbox {
        MockSandbox::new(MockSettings::default()).unwrap()
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_same_code_same_output() {
        let input = json!({"report": {"done": "bool", "accuracy": "ratio"}});
        let a = mock().execute(CLEAN, &input, timeout()).await;
        let b = mock().execute(CLEAN, &input, timeout()).await;
        assert!(a.is_success());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_report_schema_shapes_output() {
        let input = json!({"report": {
            "done": "bool",
            "accuracy": "ratio",
            "tests_passed": "count:4",
            "positions": "positions:6",
            "pnl": "range:-1:1",
        }});
        let r = mock().execute(CLEAN, &input, timeout()).await;
        let out = r.output().unwrap();
        assert!(out["done"].is_boolean());
        let acc = out["accuracy"].as_f64().unwrap();
        assert!((0.5..=1.0).contains(&acc));
        assert!(out["tests_passed"].as_u64().unwrap() <= 4);
        assert_eq!(out["positions"].as_array().unwrap().len(), 6);
        let pnl = out["pnl"].as_f64().unwrap();
        assert!((-1.0..=1.0).contains(&pnl));
    }

    #[tokio::test]
    async fn test_latency_within_configured_range() {
        let r = mock().execute(CLEAN, &json!({}), timeout()).await;
        assert!((50..=500).contains(&r.elapsed_ms));
        assert!(r.output().unwrap()["fingerprint"].is_string());
    }

    #[tokio::test]
    async fn test_host_access_crashes() {
        for code in [
            "import os\ndef decide(s): return os.listdir('/')",
            "def decide(s): return eval(s['expr'])",
            "def decide(s): return open('/etc/passwd').read()",
        ] {
            let r = mock().execute(code, &json!({}), timeout()).await;
            match r.status {
                ExecutionStatus::Crashed { reason } => assert!(reason.contains("forbidden")),
                other => panic!("expected Crashed, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_network_is_resource_exceeded() {
        let code = "import socket\ndef decide(s): return {}";
        let r = mock().execute(code, &json!({}), timeout()).await;
        match r.status {
            ExecutionStatus::ResourceExceeded { resource, .. } => {
                assert_eq!(resource, Resource::Network)
            }
            other => panic!("expected ResourceExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_loop_with_break_runs() {
        let code = "def decide(s):\n    while True:\n        break\n    return {}\n";
        let r = mock().execute(code, &json!({}), timeout()).await;
        assert!(r.is_success());
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_crashes() {
        let sandbox = MockSandbox::new(MockSettings {
            failure_rate: 1.0,
            ..Default::default()
        })
        .unwrap();
        let r = sandbox.execute(CLEAN, &json!({}), timeout()).await;
        assert!(matches!(r.status, ExecutionStatus::Crashed { .. }));
    }

    fn flaky() -> MockSandbox {
        MockSandbox::new(MockSettings {
            failure_rate: 0.5,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_failures_do_not_depend_on_call_order() {
        let inputs: Vec<Value> = (0..16).map(|i| json!({"scenario": i})).collect();

        let forward = flaky();
        let mut first = Vec::new();
        for input in &inputs {
            first.push(forward.execute(CLEAN, input, timeout()).await);
        }

        let backward = flaky();
        let mut second = Vec::new();
        for input in inputs.iter().rev() {
            second.push(backward.execute(CLEAN, input, timeout()).await);
        }
        second.reverse();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_retry_attempts_roll_independently() {
        let sandbox = flaky();
        let input = json!({"scenario": "retry"});
        let mut statuses = Vec::new();
        for attempt in 1..=32 {
            let r = sandbox.execute_attempt(CLEAN, &input, timeout(), attempt).await;
            // The same attempt always rolls the same way.
            let again = sandbox.execute_attempt(CLEAN, &input, timeout(), attempt).await;
            assert_eq!(r, again);
            statuses.push(r.is_success());
        }
        assert!(statuses.contains(&true));
        assert!(statuses.contains(&false));
    }

    #[tokio::test]
    async fn test_unbounded_latency_range_does_not_overflow() {
        let sandbox = MockSandbox::new(MockSettings {
            latency_min_ms: 0,
            latency_max_ms: u64::MAX,
            ..Default::default()
        })
        .unwrap();
        let r = sandbox.execute(CLEAN, &json!({}), timeout()).await;
        assert!(r.is_success());
    }

    #[test]
    fn test_identifiers_containing_keywords_pass_screen() {
        let m = mock();
        let code = "def decide(s):\n    reopen = s.get('execute')\n    return {'v': reopen}\n";
        assert!(m.screen(code).is_none());
    }
}
