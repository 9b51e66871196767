// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sanitized per-tick state document for presentation and telemetry.
//!
//! Everything crossing this boundary is finite and range-clamped; no
//! internal error ever leaks through an export.

use indexmap::IndexMap;
use serde::Serialize;

use crate::agent::VehicleAgent;
use crate::collision::CollisionPair;
use crate::intersection::{Grid, Intersection};
use crate::stats::SimStats;

#[derive(Debug, Clone, Serialize)]
pub struct AgentExport {
    pub x: f64,
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub decision: String,
    pub reason: String,
    pub risk_level: String,
    pub is_emergency: bool,
    pub is_police: bool,
    pub is_drunk: bool,
    pub pulling_over: bool,
    pub inside_intersection: bool,
    pub background: bool,
    pub llm_calls: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureExport {
    pub phase: String,
    pub phase_remaining: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairExport {
    pub agent1: String,
    pub agent2: String,
    pub ttc: f64,
    pub risk: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridExport {
    pub intersections: Vec<PointExport>,
    pub grid_spacing: f64,
    pub demo_intersection: usize,
    pub cols: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointExport {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsExport {
    pub elapsed_time: f64,
    pub collisions_prevented: u64,
    pub cooperation_score: f64,
}

/// The document published once per tick.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedState {
    pub running: bool,
    pub scenario: Option<String>,
    pub tick: u64,
    pub t: f64,
    pub agents: IndexMap<String, AgentExport>,
    pub infrastructure: IndexMap<String, InfrastructureExport>,
    pub collision_pairs: Vec<PairExport>,
    pub grid: GridExport,
    pub stats: StatsExport,
}

/// Replace non-finite values before they cross the boundary.
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn build(
    running: bool,
    scenario: Option<&str>,
    tick: u64,
    t: f64,
    agents: impl Iterator<Item = (String, AgentSnapshot)>,
    intersections: &[Intersection],
    pairs: &[CollisionPair],
    grid: &Grid,
    stats: &SimStats,
    cooperation_score: f64,
) -> ExportedState {
    let mut agent_exports = IndexMap::new();
    for (id, a) in agents {
        agent_exports.insert(id, a.into_export());
    }
    agent_exports.sort_keys();

    let mut infrastructure = IndexMap::new();
    for intersection in intersections {
        if let Some(light) = &intersection.light {
            infrastructure.insert(
                intersection.id.clone(),
                InfrastructureExport {
                    phase: light.phase().as_str().to_owned(),
                    phase_remaining: sanitize(light.remaining()).max(0.0),
                },
            );
        }
    }

    let collision_pairs = pairs
        .iter()
        .map(|p| PairExport {
            agent1: p.a.clone(),
            agent2: p.b.clone(),
            ttc: sanitize(p.ttc).max(0.0),
            risk: p.risk.as_str().to_owned(),
        })
        .collect();

    let grid_export = GridExport {
        intersections: grid
            .centers()
            .into_iter()
            .map(|(x, y)| PointExport { x: sanitize(x), y: sanitize(y) })
            .collect(),
        grid_spacing: sanitize(grid.spacing),
        demo_intersection: grid.demo_index(),
        cols: grid.cols,
        rows: grid.rows,
    };

    ExportedState {
        running,
        scenario: scenario.map(str::to_owned),
        tick,
        t: sanitize(t),
        agents: agent_exports,
        infrastructure,
        collision_pairs,
        grid: grid_export,
        stats: StatsExport {
            elapsed_time: sanitize(stats.elapsed_time),
            collisions_prevented: stats.collisions_prevented,
            cooperation_score: sanitize(cooperation_score).clamp(0.0, 100.0),
        },
    }
}

/// Flattened agent fields captured for export while the agent table is
/// borrowed.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub x: f64,
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub decision: String,
    pub reason: String,
    pub risk_level: String,
    pub is_emergency: bool,
    pub is_police: bool,
    pub is_drunk: bool,
    pub pulling_over: bool,
    pub inside_intersection: bool,
    pub background: bool,
    pub llm_calls: u64,
}

impl AgentSnapshot {
    pub fn of(agent: &VehicleAgent, v_max: f64) -> Self {
        Self {
            x: sanitize(agent.x),
            y: sanitize(agent.y),
            v: sanitize(agent.v).clamp(0.0, v_max),
            theta: sanitize(agent.theta).rem_euclid(360.0),
            decision: agent.last_decision.action.as_str().to_owned(),
            reason: agent.last_decision.reason.clone(),
            risk_level: agent.risk_level.as_str().to_owned(),
            is_emergency: agent.profile.is_emergency(),
            is_police: agent.profile.is_police(),
            is_drunk: agent.profile.is_drunk(),
            pulling_over: agent.pulling_over,
            inside_intersection: agent.inside_intersection,
            background: agent.background,
            llm_calls: agent.llm_calls,
        }
    }

    fn into_export(self) -> AgentExport {
        AgentExport {
            x: self.x,
            y: self.y,
            v: self.v,
            theta: self.theta,
            decision: self.decision,
            reason: self.reason,
            risk_level: self.risk_level,
            is_emergency: self.is_emergency,
            is_police: self.is_police,
            is_drunk: self.is_drunk,
            pulling_over: self.pulling_over,
            inside_intersection: self.inside_intersection,
            background: self.background,
            llm_calls: self.llm_calls,
        }
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
