// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pair-wise time-to-collision prediction over the channel snapshot.
//!
//! Trajectories are extrapolated linearly from each agent's broadcast
//! position and velocity. For a candidate pair the detector solves the
//! quadratic `|dp + t*dv|^2 = s^2` in closed form and takes the smallest
//! non-negative root as the TTC. A uniform hash grid keyed by the prefilter
//! radius keeps typical cost near O(n*k); worst case stays O(n^2).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::v2x::Snapshot;

/// Predicted severity band for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
    Collision,
}

impl Risk {
    /// Band for a time-to-collision in seconds.
    pub fn from_ttc(ttc: f64) -> Self {
        if ttc <= 1.5 {
            Self::Collision
        } else if ttc <= 3.0 {
            Self::High
        } else if ttc <= 5.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Collision => "collision",
        }
    }
}

impl std::fmt::Display for Risk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicted conflict between two agents. `a < b` lexicographically, so a
/// pair is reported exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPair {
    pub a: String,
    pub b: String,
    pub ttc: f64,
    pub risk: Risk,
}

impl CollisionPair {
    pub fn involves(&self, agent_id: &str) -> bool {
        self.a == agent_id || self.b == agent_id
    }

    pub fn peer_of(&self, agent_id: &str) -> Option<&str> {
        if self.a == agent_id {
            Some(&self.b)
        } else if self.b == agent_id {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// Closed-form TTC for two linearly extrapolated trajectories.
///
/// Returns the smallest `t >= 0` at which the separation reaches
/// `radius`, or `None` when the trajectories never get that close.
/// Already-overlapping agents collide immediately (`t = 0`), including the
/// zero-relative-speed case.
pub fn time_to_collision(
    dp: (f64, f64),
    dv: (f64, f64),
    radius: f64,
) -> Option<f64> {
    let dist2 = dp.0 * dp.0 + dp.1 * dp.1;
    let r2 = radius * radius;
    if dist2 <= r2 {
        return Some(0.0);
    }

    // |dp + t*dv|^2 = r^2  =>  a*t^2 + b*t + c = 0
    let a = dv.0 * dv.0 + dv.1 * dv.1;
    let b = 2.0 * (dp.0 * dv.0 + dp.1 * dv.1);
    let c = dist2 - r2;

    if a < 1e-12 {
        // Parallel (zero relative velocity) and not overlapping: never meet.
        return None;
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t0 = (-b - sqrt_disc) / (2.0 * a);
    let t1 = (-b + sqrt_disc) / (2.0 * a);
    let t = if t0 >= 0.0 {
        t0
    } else if t1 >= 0.0 {
        // Entry root is in the past but exit root is ahead; treat as
        // immediate overlap of the predicted interval.
        0.0
    } else {
        return None;
    };
    Some(t)
}

/// Compute all pairs above `Risk::Low` for the snapshot.
///
/// Pairs are keyed `(min, max)` and emitted in lexicographic order.
pub fn detect(snapshot: &Snapshot, prefilter_radius: f64, collision_radius: f64) -> Vec<CollisionPair> {
    let msgs: Vec<_> = snapshot.messages().collect();
    let cell = prefilter_radius.max(1.0);

    // Bucket agents into grid cells of the prefilter size; only same-cell
    // and neighboring-cell agents can be within the radius.
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (idx, msg) in msgs.iter().enumerate() {
        let key = ((msg.x / cell).floor() as i64, (msg.y / cell).floor() as i64);
        grid.entry(key).or_default().push(idx);
    }

    let mut pairs = Vec::new();
    for (&(cx, cy), members) in &grid {
        for &i in members {
            for dx in -1..=1i64 {
                for dy in -1..=1i64 {
                    let Some(neighbors) = grid.get(&(cx + dx, cy + dy)) else {
                        continue;
                    };
                    for &j in neighbors {
                        // Each unordered pair once.
                        if msgs[j].agent_id <= msgs[i].agent_id {
                            continue;
                        }
                        if let Some(pair) =
                            assess(msgs[i], msgs[j], prefilter_radius, collision_radius)
                        {
                            pairs.push(pair);
                        }
                    }
                }
            }
        }
    }

    pairs.sort_by(|p, q| p.a.cmp(&q.a).then_with(|| p.b.cmp(&q.b)));
    pairs.dedup_by(|p, q| p.a == q.a && p.b == q.b);
    pairs
}

fn assess(
    a: &crate::v2x::V2xMessage,
    b: &crate::v2x::V2xMessage,
    prefilter_radius: f64,
    collision_radius: f64,
) -> Option<CollisionPair> {
    let dp = (b.x - a.x, b.y - a.y);
    if dp.0 * dp.0 + dp.1 * dp.1 > prefilter_radius * prefilter_radius {
        return None;
    }
    let va = a.velocity();
    let vb = b.velocity();
    let dv = (vb.0 - va.0, vb.1 - va.1);

    let ttc = time_to_collision(dp, dv, collision_radius)?;
    let risk = Risk::from_ttc(ttc);
    if risk == Risk::Low {
        return None;
    }
    Some(CollisionPair { a: a.agent_id.clone(), b: b.agent_id.clone(), ttc, risk })
}

#[cfg(test)]
#[path = "collision_tests.rs"]
mod tests;
