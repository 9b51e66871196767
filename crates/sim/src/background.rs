// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background traffic driver: keeps a population of routed agents moving
//! across the grid. Background agents run the full decision pipeline; they
//! are only flagged so exports can de-emphasize them.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;

use crate::agent::{Intent, VehicleAgent};
use crate::intersection::grid::{lane_shift, LANE_OFFSET};
use crate::intersection::Grid;

/// How far past the grid edge an agent may travel before it is recycled.
const DESPAWN_MARGIN: f64 = 60.0;
/// Spawn distance outside the grid edge.
const SPAWN_MARGIN: f64 = 40.0;

#[derive(Debug)]
pub struct BackgroundDriver {
    target: usize,
    spawned: u64,
}

impl BackgroundDriver {
    pub fn new(target: usize) -> Self {
        Self { target, spawned: 0 }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Despawn background agents that left the map, then top the
    /// population back up. Returns ids removed this tick.
    pub fn maintain(
        &mut self,
        agents: &mut IndexMap<String, VehicleAgent>,
        grid: &Grid,
        speed_limit: f64,
        rng: &mut StdRng,
    ) -> Vec<String> {
        let max_x = (grid.cols - 1) as f64 * grid.spacing + DESPAWN_MARGIN;
        let max_y = (grid.rows - 1) as f64 * grid.spacing + DESPAWN_MARGIN;

        let departed: Vec<String> = agents
            .values()
            .filter(|a| {
                a.background
                    && (a.x < -DESPAWN_MARGIN
                        || a.x > max_x
                        || a.y < -DESPAWN_MARGIN
                        || a.y > max_y)
            })
            .map(|a| a.id.clone())
            .collect();
        for id in &departed {
            agents.shift_remove(id);
        }

        let population = agents.values().filter(|a| a.background).count();
        for _ in population..self.target {
            let agent = self.spawn(grid, speed_limit, rng);
            agents.insert(agent.id.clone(), agent);
        }

        // Extend routes for agents running out of waypoints.
        for agent in agents.values_mut().filter(|a| a.background) {
            if agent.waypoints.len() < 2 {
                extend_route(agent, grid, rng);
            }
        }
        departed
    }

    fn spawn(&mut self, grid: &Grid, speed_limit: f64, rng: &mut StdRng) -> VehicleAgent {
        self.spawned += 1;
        let entries = grid.entry_points(SPAWN_MARGIN);
        let ((x, y), heading) = entries[rng.random_range(0..entries.len())];
        // Sequential ids keep seeded runs reproducible.
        let id = format!("bg-{:04}", self.spawned);
        let mut agent =
            VehicleAgent::new(id, x, y, heading, speed_limit * 0.8).background();
        // First waypoint: the lane through the nearest intersection ahead.
        let cell = grid.nearest_cell((x, y));
        let shift = lane_shift(heading, LANE_OFFSET);
        let center = grid.center(cell.0, cell.1);
        agent.waypoints.push_back((center.0 + shift.0, center.1 + shift.1));
        extend_route(&mut agent, grid, rng);
        agent
    }
}

/// Draw the next intent and append the matching waypoint. At the grid edge
/// the route simply runs off the map and the agent recycles.
fn extend_route(agent: &mut VehicleAgent, grid: &Grid, rng: &mut StdRng) {
    let Some(&last) = agent.waypoints.back() else {
        return;
    };
    let cell = grid.nearest_cell(last);
    let inbound = match agent.waypoints.len() {
        0 | 1 => agent.theta,
        _ => {
            let prev = agent.waypoints[agent.waypoints.len() - 2];
            (last.1 - prev.1).atan2(last.0 - prev.0).to_degrees()
        }
    };

    let intent = draw_intent(rng);
    let heading = match intent {
        Intent::Through => inbound,
        Intent::Left => inbound + 90.0,
        Intent::Right => inbound - 90.0,
    };
    agent.intent = intent;

    let shift = lane_shift(heading, LANE_OFFSET);
    match grid.neighbor(cell, heading) {
        Some(next) => {
            let center = grid.center(next.0, next.1);
            agent.waypoints.push_back((center.0 + shift.0, center.1 + shift.1));
        }
        None => {
            // Off the edge: one exit waypoint well outside the grid.
            let rad = heading.to_radians();
            agent
                .waypoints
                .push_back((last.0 + rad.cos() * 200.0, last.1 + rad.sin() * 200.0));
        }
    }
}

/// Intent distribution at each approach.
fn draw_intent(rng: &mut StdRng) -> Intent {
    let roll: f64 = rng.random_range(0.0..1.0);
    if roll < 0.5 {
        Intent::Through
    } else if roll < 0.75 {
        Intent::Left
    } else {
        Intent::Right
    }
}

#[cfg(test)]
#[path = "background_tests.rs"]
mod tests;
