// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker guarding the advisor.
//!
//! Failure timestamps live in a sliding window; crossing the threshold
//! opens the breaker for a cooldown, after which a single probe decides
//! between closing and re-opening. Time is sim-time seconds supplied by
//! the caller, so the breaker laws are testable without sleeping.

use std::collections::VecDeque;

use serde::Serialize;

/// Breaker state, as surfaced in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open { until: f64 },
    HalfOpen,
}

/// What the tick loop may do with advisor calls this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerGate {
    /// Forward calls normally.
    Closed,
    /// Forward exactly one probe call; hold everything else.
    Probe,
    /// Fail every call immediately with `BreakerOpen`.
    Open,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    window: f64,
    cooldown: f64,
    state: BreakerState,
    failures: VecDeque<f64>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: f64, cooldown: f64) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            cooldown,
            state: BreakerState::Closed,
            failures: VecDeque::new(),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Failures currently inside the window.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Gate decision for this tick: a pure read, safe to take before the
    /// decision fan-out. The open-to-half-open transition it implies is
    /// committed by [`CircuitBreaker::advance`] in the apply phase.
    pub fn gate(&self, now: f64) -> BreakerGate {
        match self.state {
            BreakerState::Closed => BreakerGate::Closed,
            BreakerState::HalfOpen => BreakerGate::Probe,
            BreakerState::Open { until } => {
                if now >= until {
                    BreakerGate::Probe
                } else {
                    BreakerGate::Open
                }
            }
        }
    }

    /// Commit the open-to-half-open transition once the cooldown has
    /// expired. Called from the single-writer apply phase, before the
    /// tick's advisor outcomes are recorded.
    pub fn advance(&mut self, now: f64) {
        if let BreakerState::Open { until } = self.state {
            if now >= until {
                self.state = BreakerState::HalfOpen;
            }
        }
    }

    /// Record one advisor failure (timeout, transport, malformed).
    pub fn record_failure(&mut self, now: f64) {
        match self.state {
            BreakerState::HalfOpen => {
                // Probe failed: re-open for another cooldown.
                self.failures.clear();
                self.state = BreakerState::Open { until: now + self.cooldown };
            }
            BreakerState::Closed => {
                self.prune(now);
                self.failures.push_back(now);
                if self.failures.len() >= self.threshold as usize {
                    self.failures.clear();
                    self.state = BreakerState::Open { until: now + self.cooldown };
                }
            }
            // In-flight results landing after the breaker opened.
            BreakerState::Open { .. } => {}
        }
    }

    /// Record one advisor success.
    pub fn record_success(&mut self, _now: f64) {
        if self.state == BreakerState::HalfOpen {
            self.failures.clear();
            self.state = BreakerState::Closed;
        }
    }

    fn prune(&mut self, now: f64) {
        while let Some(&front) = self.failures.front() {
            if now - front > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
