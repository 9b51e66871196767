// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit and spec tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::advisor::{Advisor, AdvisorContext, AdvisorDecision};
use crate::agent::{Action, Intent};
use crate::collision::Risk;
use crate::error::SimError;
use crate::v2x::{Snapshot, V2xChannel, V2xMessage};

pub const TEST_KEY: &str = "test-shared-key";

/// A channel with generous limits for snapshot construction.
pub fn test_channel() -> V2xChannel {
    V2xChannel::new(TEST_KEY, 25.0, 1000.0, 5.0, 5.0, 64)
}

/// An unsigned message with sane defaults.
pub fn base_message(agent_id: &str) -> V2xMessage {
    V2xMessage {
        agent_id: agent_id.to_owned(),
        x: 0.0,
        y: 0.0,
        v: 10.0,
        theta: 0.0,
        intent: Intent::Through,
        decision: Action::Go,
        risk_level: Risk::Low,
        is_emergency: false,
        timestamp: 1.0,
        mac: String::new(),
    }
}

/// Kinematic description of one snapshot agent:
/// `(id, x, y, v, theta, is_emergency)`.
pub type AgentSpec<'a> = (&'a str, f64, f64, f64, f64, bool);

/// Build a snapshot by publishing one signed message per agent.
pub fn snapshot_of(specs: &[AgentSpec<'_>]) -> Arc<Snapshot> {
    let mut channel = test_channel();
    let key = channel.signing_key().clone();
    for (id, x, y, v, theta, is_emergency) in specs {
        let mut msg = base_message(id);
        msg.x = *x;
        msg.y = *y;
        msg.v = *v;
        msg.theta = *theta;
        msg.is_emergency = *is_emergency;
        msg.sign(&key);
        #[allow(clippy::unwrap_used)]
        channel.publish(msg, 1.0).unwrap();
    }
    channel.capture_snapshot(1, 1.0)
}

/// Advisor that replays a scripted sequence of responses, optionally
/// sleeping first (to exercise the caller's deadline).
pub struct ScriptedAdvisor {
    responses: Mutex<VecDeque<Result<AdvisorDecision, SimError>>>,
    delay: Option<Duration>,
    calls: AtomicU64,
}

impl ScriptedAdvisor {
    pub fn new(responses: Vec<Result<AdvisorDecision, SimError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            delay: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// An advisor with no script: every call answers `go` at 10 m/s.
    pub fn always_go() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Advisor for ScriptedAdvisor {
    fn advise(
        &self,
        _ctx: AdvisorContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdvisorDecision, SimError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let next = {
            #[allow(clippy::unwrap_used)]
            let mut responses = self.responses.lock().unwrap();
            responses.pop_front()
        };
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            next.unwrap_or(Ok(AdvisorDecision {
                action: Action::Go,
                speed: 10.0,
                reason: "scripted default".to_owned(),
            }))
        })
    }
}
