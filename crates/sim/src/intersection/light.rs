// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traffic light phase machine with emergency preemption.
//!
//! Normal cycle: NS green -> all-red interlock -> EW green -> interlock.
//! An emergency approaching a red axis forces a short all-red, then greens
//! the emergency's axis and holds until the vehicle clears. The interrupted
//! phase resumes with a starvation credit so preemption cannot starve it.

use serde::{Deserialize, Serialize};

/// Road axis through an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Ns,
    Ew,
}

impl Axis {
    pub fn other(&self) -> Self {
        match self {
            Self::Ns => Self::Ew,
            Self::Ew => Self::Ns,
        }
    }
}

/// Externally visible phase. At most one non-red axis at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficPhase {
    NsGreen,
    EwGreen,
    AllRed,
    EmergencyAllRed,
}

impl TrafficPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NsGreen => "NS_GREEN",
            Self::EwGreen => "EW_GREEN",
            Self::AllRed => "ALL_RED",
            Self::EmergencyAllRed => "EMERGENCY_ALL_RED",
        }
    }
}

impl std::fmt::Display for TrafficPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demand seen by the light this tick: an emergency vehicle approaching on
/// the given axis, not yet through the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyDemand {
    pub axis: Axis,
}

#[derive(Debug, Clone)]
enum State {
    Green { axis: Axis, remaining: f64 },
    Interlock { next: Axis, remaining: f64 },
    PreemptAllRed { target: Axis, remaining: f64 },
    PreemptGreen { target: Axis },
}

/// The infrastructure agent controlling one intersection.
#[derive(Debug, Clone)]
pub struct TrafficLight {
    ns_green: f64,
    ew_green: f64,
    interlock: f64,
    preempt_all_red: f64,
    credit: f64,
    state: State,
    /// Phase that was cut short by preemption, with its remaining time.
    interrupted: Option<(Axis, f64)>,
    /// Completed preemption cycles, surfaced in telemetry.
    pub preemptions: u64,
}

impl TrafficLight {
    pub fn new(
        ns_green: f64,
        ew_green: f64,
        interlock: f64,
        preempt_all_red: f64,
        credit: f64,
    ) -> Self {
        Self {
            ns_green,
            ew_green,
            interlock,
            preempt_all_red,
            credit,
            state: State::Green { axis: Axis::Ns, remaining: ns_green },
            interrupted: None,
            preemptions: 0,
        }
    }

    fn green_duration(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Ns => self.ns_green,
            Axis::Ew => self.ew_green,
        }
    }

    pub fn phase(&self) -> TrafficPhase {
        match &self.state {
            State::Green { axis: Axis::Ns, .. } | State::PreemptGreen { target: Axis::Ns } => {
                TrafficPhase::NsGreen
            }
            State::Green { axis: Axis::Ew, .. } | State::PreemptGreen { target: Axis::Ew } => {
                TrafficPhase::EwGreen
            }
            State::Interlock { .. } => TrafficPhase::AllRed,
            State::PreemptAllRed { .. } => TrafficPhase::EmergencyAllRed,
        }
    }

    /// Seconds left in the current phase. Held phases report zero.
    pub fn remaining(&self) -> f64 {
        match &self.state {
            State::Green { remaining, .. }
            | State::Interlock { remaining, .. }
            | State::PreemptAllRed { remaining, .. } => *remaining,
            State::PreemptGreen { .. } => 0.0,
        }
    }

    pub fn is_green(&self, axis: Axis) -> bool {
        matches!(self.phase(), TrafficPhase::NsGreen if axis == Axis::Ns)
            || matches!(self.phase(), TrafficPhase::EwGreen if axis == Axis::Ew)
    }

    /// Advance the machine one tick. Transitions take effect at tick
    /// boundaries only; `demand` is the emergency approach detected on the
    /// pre-decision snapshot.
    pub fn step(&mut self, dt: f64, demand: Option<EmergencyDemand>) {
        if let Some(demand) = demand {
            match &self.state {
                // Emergency on the green axis: hold the green, do not count down.
                State::Green { axis, .. } if *axis == demand.axis => return,
                State::PreemptGreen { target } if *target == demand.axis => return,
                // Emergency on a red axis: begin preemption.
                State::Green { axis, remaining } => {
                    self.interrupted = Some((*axis, *remaining));
                    self.state = State::PreemptAllRed {
                        target: demand.axis,
                        remaining: self.preempt_all_red,
                    };
                    return;
                }
                State::Interlock { next, .. } => {
                    // The suppressed phase is the one the interlock was
                    // leading into.
                    self.interrupted = Some((*next, self.green_duration(*next)));
                    self.state = State::PreemptAllRed {
                        target: demand.axis,
                        remaining: self.preempt_all_red,
                    };
                    return;
                }
                State::PreemptAllRed { .. } => {}
                State::PreemptGreen { .. } => {
                    // Demand switched axes mid-preemption; restart the all-red.
                    self.state = State::PreemptAllRed {
                        target: demand.axis,
                        remaining: self.preempt_all_red,
                    };
                    return;
                }
            }
        }

        match &mut self.state {
            State::Green { axis, remaining } => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    let next = axis.other();
                    self.state = State::Interlock { next, remaining: self.interlock };
                }
            }
            State::Interlock { next, remaining } => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    let axis = *next;
                    self.state =
                        State::Green { axis, remaining: self.green_duration(axis) };
                }
            }
            State::PreemptAllRed { target, remaining } => {
                *remaining -= dt;
                if *remaining <= 0.0 {
                    self.state = State::PreemptGreen { target: *target };
                }
            }
            State::PreemptGreen { .. } => {
                if demand.is_none() {
                    // Emergency cleared: resume the interrupted phase with
                    // the starvation credit applied.
                    self.preemptions += 1;
                    let (axis, remaining) = self
                        .interrupted
                        .take()
                        .unwrap_or((Axis::Ns, self.ns_green));
                    self.state =
                        State::Green { axis, remaining: remaining + self.credit };
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "light_tests.rs"]
mod tests;
