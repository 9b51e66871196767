// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vehicle agents: kinematic state, behavior profiles, and per-tick
//! integration. Profiles are a tagged variant over one decision-function
//! interface; there is no behavior hierarchy.

pub mod decision;
pub mod memory;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::collision::Risk;
use crate::v2x::V2xMessage;

pub use decision::{decide, DecisionInput, DecisionOutcome};
pub use memory::{AgentMemory, MemoryEntry};

/// Planned movement through the next intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Through,
    Left,
    Right,
}

/// Committed action for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Go,
    Yield,
    Brake,
    Stop,
    PullOver,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Yield => "yield",
            Self::Brake => "brake",
            Self::Stop => "stop",
            Self::PullOver => "pull_over",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision function's output: an action, the speed it aims for, and a
/// human-readable reason carried into exports and memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub target_speed: f64,
    pub reason: String,
}

impl Decision {
    pub fn new(action: Action, target_speed: f64, reason: impl Into<String>) -> Self {
        Self { action, target_speed, reason: reason.into() }
    }

    /// The safe default when nothing better is known.
    pub fn stop(reason: impl Into<String>) -> Self {
        Self::new(Action::Stop, 0.0, reason)
    }
}

/// Behavior profile tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorProfile {
    Normal,
    Emergency,
    Police,
    Drunk,
}

impl BehaviorProfile {
    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::Emergency)
    }

    pub fn is_police(&self) -> bool {
        matches!(self, Self::Police)
    }

    pub fn is_drunk(&self) -> bool {
        matches!(self, Self::Drunk)
    }
}

/// Forward acceleration limit, m/s^2.
const ACCEL: f64 = 3.0;
/// Service deceleration limit, m/s^2.
const DECEL: f64 = 6.0;
/// Emergency braking deceleration, m/s^2.
const HARD_DECEL: f64 = 8.0;
/// Heading slew rate, degrees per second.
const TURN_RATE: f64 = 180.0;
/// Lateral slew toward the pull-over offset, m/s.
const LATERAL_RATE: f64 = 1.5;
/// Full pull-over lateral offset, meters.
const PULL_OVER_OFFSET: f64 = 3.0;
/// Waypoint arrival threshold, meters.
const WAYPOINT_REACHED: f64 = 3.0;

/// A simulated vehicle. All mutation happens in the single-writer apply and
/// integrate phases; the decision phase only ever sees copies.
#[derive(Debug)]
pub struct VehicleAgent {
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Heading in degrees, `[0, 360)`, 0 = +x.
    pub theta: f64,
    /// Scalar speed, m/s, never negative.
    pub v: f64,
    /// Signed offset from the path centerline (pull-over maneuver).
    pub lateral_offset: f64,
    pub waypoints: VecDeque<(f64, f64)>,
    pub intent: Intent,
    pub profile: BehaviorProfile,
    /// Background-traffic agents get a weaker presence in exports.
    pub background: bool,
    pub inside_intersection: bool,
    pub pulling_over: bool,
    pub last_decision: Decision,
    pub risk_level: Risk,
    pub memory: AgentMemory,
    /// Last four committed actions, newest last (oscillation damper input).
    pub recent_actions: VecDeque<Action>,
    /// Tick until which the oscillation damper forces `yield`.
    pub damper_until: u64,
    pub consecutive_faults: u32,
    pub llm_calls: u64,
    /// Timestamp of the last broadcast; broadcasts are monotonic per agent.
    pub last_broadcast: f64,
}

impl VehicleAgent {
    pub fn new(id: impl Into<String>, x: f64, y: f64, theta: f64, v: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            theta: wrap_degrees(theta),
            v: v.max(0.0),
            lateral_offset: 0.0,
            waypoints: VecDeque::new(),
            intent: Intent::Through,
            profile: BehaviorProfile::Normal,
            background: false,
            inside_intersection: false,
            pulling_over: false,
            last_decision: Decision::new(Action::Go, v.max(0.0), "spawned"),
            risk_level: Risk::Low,
            memory: AgentMemory::new(),
            recent_actions: VecDeque::new(),
            damper_until: 0,
            consecutive_faults: 0,
            llm_calls: 0,
            last_broadcast: -1.0,
        }
    }

    pub fn with_profile(mut self, profile: BehaviorProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_waypoints(mut self, waypoints: impl IntoIterator<Item = (f64, f64)>) -> Self {
        self.waypoints = waypoints.into_iter().collect();
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn heading_vec(&self) -> (f64, f64) {
        let rad = self.theta.to_radians();
        (rad.cos(), rad.sin())
    }

    pub fn distance_to(&self, point: (f64, f64)) -> f64 {
        ((self.x - point.0).powi(2) + (self.y - point.1).powi(2)).sqrt()
    }

    /// Build the (unsigned) broadcast for this tick. The caller signs it
    /// with the channel key before publishing.
    pub fn broadcast(&mut self, timestamp: f64) -> V2xMessage {
        self.last_broadcast = timestamp;
        V2xMessage {
            agent_id: self.id.clone(),
            x: self.x,
            y: self.y,
            v: self.v,
            theta: self.theta,
            intent: self.intent,
            decision: self.last_decision.action,
            risk_level: self.risk_level,
            is_emergency: self.profile.is_emergency(),
            timestamp,
            mac: String::new(),
        }
    }

    /// Push a committed action into the damper window.
    pub fn push_action(&mut self, action: Action) {
        if self.recent_actions.len() == 4 {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(action);
    }

    /// Whether the last four actions alternate between `go` and a halt
    /// (`stop` or `brake`).
    pub fn is_oscillating(&self) -> bool {
        if self.recent_actions.len() < 4 {
            return false;
        }
        if self
            .recent_actions
            .iter()
            .any(|a| !matches!(a, Action::Go | Action::Stop | Action::Brake))
        {
            return false;
        }
        let classes: Vec<bool> =
            self.recent_actions.iter().map(|a| *a == Action::Go).collect();
        classes.windows(2).all(|w| w[0] != w[1])
    }

    /// Integrate one tick of kinematics toward the committed decision.
    ///
    /// `heading_noise` is the drunk profile's pre-drawn perturbation in
    /// degrees (zero for everyone else).
    pub fn integrate(&mut self, dt: f64, heading_noise: f64) {
        let target_speed = self.last_decision.target_speed.max(0.0);
        let rate = match self.last_decision.action {
            Action::Brake => HARD_DECEL,
            _ if target_speed < self.v => DECEL,
            _ => ACCEL,
        };
        if self.v < target_speed {
            self.v = (self.v + ACCEL * dt).min(target_speed);
        } else {
            self.v = (self.v - rate * dt).max(target_speed);
        }

        // Steer toward the next waypoint, rate-limited. A vehicle holding
        // the lane edge for an emergency keeps its heading instead of
        // steering back onto the lane line.
        if let Some(&wp) = self.waypoints.front() {
            if self.distance_to(wp) <= WAYPOINT_REACHED {
                self.waypoints.pop_front();
            }
        }
        if !self.pulling_over {
            if let Some(&wp) = self.waypoints.front() {
                let desired = (wp.1 - self.y).atan2(wp.0 - self.x).to_degrees();
                let delta = shortest_arc(self.theta, desired);
                let max_step = TURN_RATE * dt;
                self.theta = wrap_degrees(self.theta + delta.clamp(-max_step, max_step));
            }
        }
        self.theta = wrap_degrees(self.theta + heading_noise);

        let (hx, hy) = self.heading_vec();
        self.x += hx * self.v * dt;
        self.y += hy * self.v * dt;

        // Lateral creep toward the pull-over offset (or back to center).
        let target_lateral = if self.pulling_over { PULL_OVER_OFFSET } else { 0.0 };
        let step = LATERAL_RATE * dt;
        let before = self.lateral_offset;
        if self.lateral_offset < target_lateral {
            self.lateral_offset = (self.lateral_offset + step).min(target_lateral);
        } else {
            self.lateral_offset = (self.lateral_offset - step).max(target_lateral);
        }
        // The offset displaces the agent perpendicular to its heading
        // (to the right in right-hand traffic).
        let shift = self.lateral_offset - before;
        self.x += hy * shift;
        self.y -= hx * shift;
    }
}

/// Wrap an angle into `[0, 360)`.
pub fn wrap_degrees(theta: f64) -> f64 {
    let wrapped = theta.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-180, 180]`.
pub fn shortest_arc(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(360.0);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
