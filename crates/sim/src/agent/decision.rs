// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-tick decision function.
//!
//! Stages, in order: perception over the shared snapshot, hard safety
//! pre-overrides (which the advisor can never bypass), the guarded advisor
//! call, the deterministic adaptive cascade, the oscillation damper, and
//! the pull-over maneuver. The drunk profile is an adversary: its own
//! pre-overrides are suppressed and it probabilistically disregards
//! signals, while every peer keeps the full pipeline.

use std::sync::Arc;
use std::time::Duration;

use crate::advisor::{Advisor, AdvisorContext, BreakerGate, PeerSummary};
use crate::agent::{Action, BehaviorProfile, Decision, Intent};
use crate::collision::{CollisionPair, Risk};
use crate::error::SimError;
use crate::priority::Advisory;
use crate::v2x::{Snapshot, V2xMessage};

/// Speed while yielding, m/s.
const YIELD_SPEED: f64 = 3.0;
/// Speed while pulling over, m/s.
const PULL_OVER_SPEED: f64 = 2.0;
/// Follow rule kicks in below this TTC to the leader, seconds.
const FOLLOW_TTC: f64 = 2.0;
/// Heading alignment tolerance for same-lane checks, degrees.
const LANE_ALIGN: f64 = 45.0;
/// Lateral tolerance for same-lane checks, meters. A completed pull-over
/// (3 m offset) leaves the lane.
const LANE_WIDTH: f64 = 2.5;
/// Wider lateral bound for spotting an emergency on the same road: a
/// vehicle that has already pulled aside keeps yielding until the
/// emergency is past.
const EMERGENCY_LANE_WIDTH: f64 = 6.0;

/// Pre-drawn randomness for the drunk profile (drawn single-threaded
/// before fan-out so the parallel phase stays deterministic).
#[derive(Debug, Clone, Copy, Default)]
pub struct DrunkDraws {
    pub ignore_signals: bool,
    pub heading_noise: f64,
    pub speed_jitter: Option<f64>,
}

/// Immutable copy of the deciding agent's own state.
#[derive(Debug, Clone)]
pub struct AgentView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub v: f64,
    pub intent: Intent,
    pub profile: BehaviorProfile,
    pub inside_intersection: bool,
    pub pulling_over: bool,
    pub risk_level: Risk,
}

/// Everything one decision call needs; owned or shared, so the call can run
/// on the worker pool against the immutable snapshot.
pub struct DecisionInput {
    pub view: AgentView,
    pub snapshot: Arc<Snapshot>,
    pub pairs: Arc<Vec<CollisionPair>>,
    pub advisory: Advisory,
    /// Coordinator grant, when queued at or inside an intersection.
    pub admitted: Option<bool>,
    /// Red light showing for this agent's approach at the stop line.
    pub at_red_light: bool,
    pub gate: BreakerGate,
    /// Whether this agent holds the single half-open probe slot.
    pub is_probe: bool,
    pub advisor: Option<Arc<dyn Advisor>>,
    pub llm_timeout: Duration,
    pub memory_digest: String,
    /// Oscillation damper currently forcing yield.
    pub damper_active: bool,
    pub drunk: DrunkDraws,
    pub speed_limit: f64,
    pub v_max: f64,
    pub obs_radius: f64,
    pub emergency_detect_range: f64,
}

/// Result handed back to the apply phase. All mutation it implies happens
/// there, single-writer.
#[derive(Debug)]
pub struct DecisionOutcome {
    pub agent_id: String,
    pub decision: Decision,
    pub pulling_over: bool,
    /// `Some(result)` when an advisor call actually went out.
    pub advisor_result: Option<Result<(), SimError>>,
    /// Success counts toward `llm_calls`; timeouts and failures do not.
    pub llm_success: bool,
    pub context_summary: String,
    pub late_yield: bool,
    /// Set by the tick loop when the decision task itself died.
    pub fault: bool,
}

#[derive(Debug)]
struct Perception {
    neighbors: Vec<(String, f64)>,
    /// Leader on the same lane: (peer id, gap meters, closing speed m/s).
    leader: Option<(String, f64, f64)>,
    /// Emergency vehicle behind on the same lane within detection range.
    trailing_emergency: Option<String>,
    /// Worst risk among pairs involving this agent.
    own_risk: Risk,
}

fn perceive(input: &DecisionInput) -> Perception {
    let view = &input.view;
    let mut p = Perception {
        neighbors: Vec::new(),
        leader: None,
        trailing_emergency: None,
        own_risk: Risk::Low,
    };

    let heading = view.theta.to_radians();
    let (hx, hy) = (heading.cos(), heading.sin());

    for msg in input.snapshot.messages() {
        if msg.agent_id == view.id {
            continue;
        }
        let rel = (msg.x - view.x, msg.y - view.y);
        let dist = (rel.0 * rel.0 + rel.1 * rel.1).sqrt();
        if dist > input.obs_radius && dist > input.emergency_detect_range {
            continue;
        }
        if dist <= input.obs_radius {
            p.neighbors.push((msg.agent_id.clone(), dist));
        }

        let forward = rel.0 * hx + rel.1 * hy;
        let lateral = (rel.0 * hy - rel.1 * hx).abs();
        let align = heading_delta(view.theta, msg.theta).abs();

        if align <= LANE_ALIGN {
            if forward > 0.0 && lateral <= LANE_WIDTH && dist <= input.obs_radius {
                let closing = view.v - msg.v;
                let better = match &p.leader {
                    Some((_, gap, _)) => forward < *gap,
                    None => true,
                };
                if better {
                    p.leader = Some((msg.agent_id.clone(), forward, closing));
                }
            } else if forward < 0.0
                && msg.is_emergency
                && lateral <= EMERGENCY_LANE_WIDTH
                && dist <= input.emergency_detect_range
            {
                p.trailing_emergency = Some(msg.agent_id.clone());
            }
        }
    }
    p.neighbors.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    for pair in input.pairs.iter() {
        if pair.involves(&view.id) && pair.risk > p.own_risk {
            p.own_risk = pair.risk;
        }
    }
    p
}

fn heading_delta(a: f64, b: f64) -> f64 {
    let diff = (b - a).rem_euclid(360.0);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Run the full pipeline for one agent.
pub async fn decide(input: DecisionInput) -> DecisionOutcome {
    let perception = perceive(&input);
    let view = input.view.clone();
    let context_summary = format!(
        "risk={} advisory={:?} neighbors={} at_red={}",
        perception.own_risk,
        input.advisory,
        perception.neighbors.len(),
        input.at_red_light,
    );

    let decision = if view.profile.is_drunk() {
        drunk_decision(&input, &perception)
    } else {
        cooperative_decision(&input, &perception).await
    };

    let (decision, pulling_over, advisor_result, llm_success) = decision;
    let late_yield = input.advisory == Advisory::MustYield && decision.action == Action::Go;

    DecisionOutcome {
        agent_id: view.id,
        decision,
        pulling_over,
        advisor_result,
        llm_success,
        context_summary,
        late_yield,
        fault: false,
    }
}

type Chosen = (Decision, bool, Option<Result<(), SimError>>, bool);

async fn cooperative_decision(input: &DecisionInput, perception: &Perception) -> Chosen {
    let view = &input.view;

    // Hard pre-overrides. Nothing below this block can relax them.
    if let Some(decision) = hard_override(input, perception) {
        // Pull-over is the one override that also sets the maneuver flag;
        // an agent clearing the intersection ahead of a trailing emergency
        // pulls over on the first tick outside the box.
        let pulling_over = decision.action == Action::PullOver;
        return (decision, pulling_over, None, false);
    }

    // Oscillation damper.
    if input.damper_active {
        return (
            Decision::new(Action::Yield, YIELD_SPEED.min(view.v), "damping oscillation"),
            false,
            None,
            false,
        );
    }

    // Advisor, gated by the breaker.
    let mut advisor_result = None;
    if let Some(advisor) = advisor_allowed(input) {
        let ctx = build_context(input, perception);
        match tokio::time::timeout(input.llm_timeout, advisor.advise(ctx)).await {
            Ok(Ok(suggestion)) => {
                let decision = Decision::new(
                    suggestion.action,
                    suggestion.speed,
                    format!("advisor: {}", suggestion.reason),
                );
                return (decision, false, Some(Ok(())), true);
            }
            Ok(Err(err)) => advisor_result = Some(Err(err)),
            Err(_) => advisor_result = Some(Err(SimError::AdvisorTimeout)),
        }
    }

    // Deterministic adaptive cascade.
    let decision = adaptive_rule(input, perception);
    (decision, false, advisor_result, false)
}

fn hard_override(input: &DecisionInput, perception: &Perception) -> Option<Decision> {
    let view = &input.view;

    // Already inside: continue to clear, whatever else is happening.
    if view.inside_intersection {
        let target = if view.profile.is_emergency() {
            input.speed_limit * 1.5
        } else {
            input.speed_limit
        };
        return Some(Decision::new(Action::Go, target, "clearing intersection"));
    }

    // Red light at the stop line. Emergencies are the preemption
    // beneficiary and slow-roll instead of stopping.
    if input.at_red_light {
        if view.profile.is_emergency() {
            return Some(Decision::new(
                Action::Yield,
                (input.speed_limit * 0.7).max(6.0),
                "emergency through red, awaiting preemption",
            ));
        }
        return Some(Decision::stop("red light"));
    }

    // Coordinator hold at the stop line.
    if input.admitted == Some(false) && !view.profile.is_emergency() {
        return Some(Decision::stop("waiting for intersection slot"));
    }

    // Imminent collision.
    if perception.own_risk == Risk::Collision {
        return Some(Decision::new(Action::Brake, 0.0, "imminent collision"));
    }

    // Trailing emergency on the same lane: pull over (outside the box).
    if perception.trailing_emergency.is_some() && !view.profile.is_emergency() {
        return Some(Decision::new(
            Action::PullOver,
            PULL_OVER_SPEED,
            "yielding lane to emergency vehicle",
        ));
    }

    // Must-yield with an emergency nearby is a yield, not a suggestion.
    if input.advisory == Advisory::MustYield && emergency_nearby(input) {
        return Some(Decision::new(Action::Yield, 0.0, "yielding to emergency"));
    }

    None
}

fn emergency_nearby(input: &DecisionInput) -> bool {
    let view = &input.view;
    input.snapshot.messages().any(|m| {
        m.is_emergency
            && m.agent_id != view.id
            && ((m.x - view.x).powi(2) + (m.y - view.y).powi(2)).sqrt()
                <= input.emergency_detect_range
    })
}

fn advisor_allowed(input: &DecisionInput) -> Option<&Arc<dyn Advisor>> {
    let advisor = input.advisor.as_ref()?;
    match input.gate {
        BreakerGate::Closed => Some(advisor),
        BreakerGate::Probe if input.is_probe => Some(advisor),
        _ => None,
    }
}

fn build_context(input: &DecisionInput, perception: &Perception) -> AdvisorContext {
    let view = &input.view;
    let peers = perception
        .neighbors
        .iter()
        .take(3)
        .filter_map(|(id, dist)| {
            input.snapshot.get(id).map(|m: &V2xMessage| PeerSummary {
                agent_id: m.agent_id.clone(),
                x: m.x,
                y: m.y,
                v: m.v,
                theta: m.theta,
                distance: *dist,
                is_emergency: m.is_emergency,
            })
        })
        .collect();
    AdvisorContext {
        agent_id: view.id.clone(),
        x: view.x,
        y: view.y,
        v: view.v,
        theta: view.theta,
        intent: view.intent,
        risk_level: perception.own_risk,
        advisory: input.advisory,
        peers,
        memory_digest: input.memory_digest.clone(),
        speed_limit: input.speed_limit,
    }
}

/// The deterministic cascade used when the advisor is unavailable or its
/// suggestion never arrived.
fn adaptive_rule(input: &DecisionInput, perception: &Perception) -> Decision {
    let view = &input.view;

    // Follow distance: decelerate when closing on the leader too fast.
    if let Some((leader, gap, closing)) = &perception.leader {
        if *closing > 0.0 && gap / closing < FOLLOW_TTC {
            // An emergency weaves rather than stalling behind traffic.
            let floor = if view.profile.is_emergency() { 6.0 } else { 0.0 };
            let target = (view.v - *closing).max(floor);
            if gap / closing < FOLLOW_TTC / 2.0 && !view.profile.is_emergency() {
                return Decision::new(Action::Brake, target, format!("closing on {leader}"));
            }
            return Decision::new(Action::Yield, target, format!("following {leader}"));
        }
    }

    if input.at_red_light {
        return Decision::stop("red light");
    }

    if input.advisory == Advisory::MustYield {
        return Decision::new(Action::Yield, YIELD_SPEED.min(view.v), "yielding right of way");
    }

    let target = if view.profile.is_emergency() {
        input.speed_limit * 1.5
    } else {
        input.speed_limit
    };
    Decision::new(Action::Go, target.min(input.v_max), "clear to proceed")
}

/// The adversarial profile: no pre-overrides, probabilistic signal
/// disregard, random speed transients. Peers protect themselves; this
/// agent does not.
fn drunk_decision(input: &DecisionInput, perception: &Perception) -> Chosen {
    let draws = input.drunk;

    let base_limit = input.speed_limit;
    let target = match draws.speed_jitter {
        Some(jitter) => (base_limit * (1.0 + jitter)).clamp(0.0, input.v_max),
        None => base_limit,
    };

    if draws.ignore_signals {
        return (
            Decision::new(Action::Go, target, "ignoring signals"),
            false,
            None,
            false,
        );
    }

    // A lucid moment: follow the adaptive cascade, minus the overrides.
    let mut decision = adaptive_rule(input, perception);
    if decision.action == Action::Go {
        decision.target_speed = target;
    }
    (decision, false, None, false)
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
