//! Universal Performance Index sub-metrics.
//!
//! Every sub-metric is clamped to `[0, 1]` before weighting.

use serde_json::Value;

use crate::domain::UpiBreakdown;
use crate::scoring::UpiWeights;

/// Autonomy lost per retry or hint.
const AUTONOMY_PENALTY: f64 = 0.25;

/// Elapsed-ms breakpoints for the utility efficiency curve.
const UTILITY_CURVE: [(f64, f64); 4] = [(200.0, 1.0), (500.0, 0.8), (1_000.0, 0.5), (5_000.0, 0.0)];

/// Elapsed-ms breakpoints for the coding efficiency curve.
const CODING_CURVE: [(f64, f64); 4] = [(500.0, 1.0), (2_000.0, 0.8), (5_000.0, 0.5), (30_000.0, 0.0)];

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

pub fn upi(weights: &UpiWeights, effectiveness: f64, efficiency: f64, autonomy: f64) -> UpiBreakdown {
    let effectiveness = clamp01(effectiveness);
    let efficiency = clamp01(efficiency);
    let autonomy = clamp01(autonomy);
    let upi = weights.effectiveness * effectiveness
        + weights.efficiency * efficiency
        + weights.autonomy * autonomy;
    UpiBreakdown {
        effectiveness,
        efficiency,
        autonomy,
        upi: clamp01(upi),
    }
}

/// Piecewise-linear interpolation; flat before the first point and after the last.
fn piecewise(x: f64, points: &[(f64, f64)]) -> f64 {
    let Some(&(x0, y0)) = points.first() else {
        return 0.0;
    };
    if x <= x0 {
        return y0;
    }
    for pair in points.windows(2) {
        let (xa, ya) = pair[0];
        let (xb, yb) = pair[1];
        if x <= xb {
            return ya + (x - xa) / (xb - xa) * (yb - ya);
        }
    }
    points.last().map(|&(_, y)| y).unwrap_or(0.0)
}

pub fn utility_time_efficiency(elapsed_ms: u64) -> f64 {
    clamp01(piecewise(elapsed_ms as f64, &UTILITY_CURVE))
}

pub fn coding_time_efficiency(elapsed_ms: u64) -> f64 {
    clamp01(piecewise(elapsed_ms as f64, &CODING_CURVE))
}

/// Code-quality signal: 0.8 base, +0.1 for coverage above 80 %, +0.1 when
/// the output reports a successful compile.
pub fn coding_quality(output: &Value) -> f64 {
    let mut quality = 0.8;
    if output
        .get("coverage")
        .and_then(Value::as_f64)
        .is_some_and(|c| c > 0.8)
    {
        quality += 0.1;
    }
    if output.get("compile_success").and_then(Value::as_bool) == Some(true) {
        quality += 0.1;
    }
    clamp01(quality)
}

/// Coding efficiency blends 60 % time and 40 % quality.
pub fn coding_efficiency(elapsed_ms: u64, output: &Value) -> f64 {
    clamp01(0.6 * coding_time_efficiency(elapsed_ms) + 0.4 * coding_quality(output))
}

/// `1 - 0.25 * (retries + hints_used)`, floor 0. Hints are self-reported
/// by the agent under `hints_used`.
pub fn autonomy(retries: u32, output: &Value) -> f64 {
    let hints = output.get("hints_used").and_then(Value::as_u64).unwrap_or(0);
    let interventions = retries as f64 + hints as f64;
    clamp01(1.0 - AUTONOMY_PENALTY * interventions)
}
