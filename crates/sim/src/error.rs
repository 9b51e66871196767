// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes for the simulation kernel.
///
/// Channel errors (`InvalidMac` through `RateLimited`) are local to the
/// rejected publish and counted in security stats. Advisor errors feed the
/// circuit breaker and never surface beyond the agent that made the call.
/// `CoordinatorInvariantViolation` is fatal to the tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimError {
    InvalidMac,
    InvalidRange,
    StaleMessage,
    RateLimited,
    BreakerOpen,
    AdvisorTimeout,
    AdvisorMalformed,
    AgentDecisionFault,
    CoordinatorInvariantViolation,
}

impl SimError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMac => "INVALID_MAC",
            Self::InvalidRange => "INVALID_RANGE",
            Self::StaleMessage => "STALE_MESSAGE",
            Self::RateLimited => "RATE_LIMITED",
            Self::BreakerOpen => "BREAKER_OPEN",
            Self::AdvisorTimeout => "ADVISOR_TIMEOUT",
            Self::AdvisorMalformed => "ADVISOR_MALFORMED",
            Self::AgentDecisionFault => "AGENT_DECISION_FAULT",
            Self::CoordinatorInvariantViolation => "COORDINATOR_INVARIANT_VIOLATION",
        }
    }

    /// Whether this error counts as a failure against the circuit breaker.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Self::AdvisorTimeout | Self::AdvisorMalformed)
    }

    /// Whether this error rejects a channel publish.
    pub fn is_publish_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidMac | Self::InvalidRange | Self::StaleMessage | Self::RateLimited
        )
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SimError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
