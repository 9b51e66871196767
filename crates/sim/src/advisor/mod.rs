// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The language-model advisor seam.
//!
//! `advise` is an opaque, cancellable capability: any transport satisfies
//! the contract as long as it returns the `{action, speed, reason}` schema
//! within the deadline. The caller wraps every call in a timeout and routes
//! all failures through the circuit breaker; the advisor is never on the
//! critical path.

pub mod breaker;
pub mod http;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::agent::{Action, Intent};
use crate::collision::Risk;
use crate::error::SimError;
use crate::priority::Advisory;

pub use breaker::{BreakerGate, BreakerState, CircuitBreaker};
pub use http::HttpAdvisor;

/// A nearby peer, as summarized for the advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub distance: f64,
    pub is_emergency: bool,
}

/// Compact context sent with each advisor call: own state, the three
/// nearest peers, the arbitration advisory, and a memory digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorContext {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub intent: Intent,
    pub risk_level: Risk,
    pub advisory: Advisory,
    pub peers: Vec<PeerSummary>,
    pub memory_digest: String,
    pub speed_limit: f64,
}

/// A validated advisor suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorDecision {
    pub action: Action,
    pub speed: f64,
    pub reason: String,
}

pub trait Advisor: Send + Sync {
    /// Suggest a decision for the given context. Cancellable: dropping the
    /// returned future abandons the call.
    fn advise(
        &self,
        ctx: AdvisorContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdvisorDecision, SimError>> + Send + '_>>;
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    action: String,
    speed: f64,
    #[serde(default)]
    reason: String,
}

/// Parse and validate a raw advisor response body.
///
/// Schema: `action ∈ {go, yield, brake, stop}`, `speed ∈ [0, v_max]` and
/// finite, `reason` free text. Any violation is a breaker failure.
pub fn parse_response(body: &str, v_max: f64) -> Result<AdvisorDecision, SimError> {
    let raw: RawResponse =
        serde_json::from_str(body).map_err(|_| SimError::AdvisorMalformed)?;
    let action = match raw.action.as_str() {
        "go" => Action::Go,
        "yield" => Action::Yield,
        "brake" => Action::Brake,
        "stop" => Action::Stop,
        _ => return Err(SimError::AdvisorMalformed),
    };
    if !raw.speed.is_finite() || raw.speed < 0.0 || raw.speed > v_max {
        return Err(SimError::AdvisorMalformed);
    }
    Ok(AdvisorDecision { action, speed: raw.speed, reason: raw.reason })
}

#[cfg(test)]
#[path = "advisor_tests.rs"]
mod tests;
