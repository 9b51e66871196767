// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel counters and the telemetry report document.

use serde::Serialize;

use crate::advisor::BreakerState;
use crate::config::SimConfig;
use crate::v2x::SecurityStats;

/// Running counters owned by the world, mutated only in the apply phase.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SimStats {
    pub elapsed_time: f64,
    pub near_misses: u64,
    pub late_yields: u64,
    pub successful_preemptions: u64,
    pub collisions_prevented: u64,
    pub llm_calls: u64,
    pub llm_failures: u64,
    pub decision_faults: u64,
    pub despawns: u64,
}

impl SimStats {
    /// Cooperation score: rewards clean preemptions, penalizes near misses
    /// and late yields. Clamped to `[0, 100]`.
    pub fn cooperation_score(&self, config: &SimConfig) -> f64 {
        let score = 100.0 - config.near_miss_weight * self.near_misses as f64
            - config.late_yield_weight * self.late_yields as f64
            + config.preemption_weight * self.successful_preemptions as f64;
        score.clamp(0.0, 100.0)
    }
}

/// Sanitized counter document handed to telemetry consumers.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport {
    pub tick: u64,
    pub elapsed_time: f64,
    pub agents: usize,
    pub security: SecurityStats,
    pub breaker: BreakerState,
    pub breaker_window_failures: usize,
    pub near_misses: u64,
    pub late_yields: u64,
    pub successful_preemptions: u64,
    pub collisions_prevented: u64,
    pub llm_calls: u64,
    pub llm_failures: u64,
    pub decision_faults: u64,
    pub despawns: u64,
    pub cooperation_score: f64,
}

impl TelemetryReport {
    /// Emit the report at the telemetry boundary.
    pub fn emit(&self) {
        tracing::info!(
            target: "telemetry",
            tick = self.tick,
            agents = self.agents,
            rejected = self.security.rejected(),
            near_misses = self.near_misses,
            preemptions = self.successful_preemptions,
            llm_calls = self.llm_calls,
            cooperation_score = self.cooperation_score,
            "telemetry report"
        );
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
