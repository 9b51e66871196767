// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Right-of-way and emergency-preemption arbitration.
//!
//! Two rules, applied in order over the pre-decision snapshot: emergency
//! vehicles preempt every non-emergency peer near a conflict zone, then the
//! right-hand rule settles pairs approaching an uncontrolled intersection
//! together. The output is advisory; the decision function folds it in and
//! hard overrides still win.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::intersection::Coordinator;
use crate::v2x::Snapshot;

/// Per-agent arbitration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    MustYield,
    MayGo,
}

/// Compute the advisory map for every agent in the snapshot.
pub fn arbitrate(
    snapshot: &Snapshot,
    coordinator: &Coordinator,
    d_pre: f64,
    d_arrive: f64,
) -> HashMap<String, Advisory> {
    let mut advisories: HashMap<String, Advisory> =
        snapshot.iter().map(|(id, _)| (id.clone(), Advisory::MayGo)).collect();

    for intersection in &coordinator.intersections {
        let center = intersection.center;

        // Rule 1: emergency preemption. Everyone except the (winning)
        // emergency yields inside the preemption zone.
        let mut emergencies: Vec<&str> = snapshot
            .messages()
            .filter(|m| m.is_emergency && distance(m.position(), center) <= d_pre)
            .map(|m| m.agent_id.as_str())
            .collect();
        if !emergencies.is_empty() {
            // Two converging emergencies resolve by id order.
            emergencies.sort_unstable();
            let winner = emergencies[0];
            for msg in snapshot.messages() {
                if msg.agent_id != winner && distance(msg.position(), center) <= d_pre {
                    advisories.insert(msg.agent_id.clone(), Advisory::MustYield);
                }
            }
            continue;
        }

        // Rule 2: right of way at uncontrolled intersections.
        if intersection.controlled {
            continue;
        }
        let approaching: Vec<_> = snapshot
            .messages()
            .filter(|m| {
                let d = distance(m.position(), center);
                d <= d_arrive && heading_toward(m, center)
            })
            .collect();
        for (i, a) in approaching.iter().enumerate() {
            for b in approaching.iter().skip(i + 1) {
                // Positive means b approaches from a's right.
                let diff = (b.theta - a.theta).rem_euclid(360.0);
                if (45.0..135.0).contains(&diff) {
                    advisories.insert(a.agent_id.clone(), Advisory::MustYield);
                } else if (225.0..315.0).contains(&diff) {
                    advisories.insert(b.agent_id.clone(), Advisory::MustYield);
                }
                // Head-on (~180) and followers (~0): both may go.
            }
        }
    }

    advisories
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn heading_toward(msg: &crate::v2x::V2xMessage, center: (f64, f64)) -> bool {
    let rad = msg.theta.to_radians();
    let to_center = (center.0 - msg.x, center.1 - msg.y);
    rad.cos() * to_center.0 + rad.sin() * to_center.1 > 0.0
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
