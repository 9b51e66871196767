// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named scenarios: fixed casts of agents around a single intersection.
//!
//! Scenario ids are stable; the test suite refers to them by name.

use std::collections::VecDeque;

use crate::agent::{BehaviorProfile, Intent, VehicleAgent};
use crate::config::SimConfig;
use crate::intersection::grid::{lane_shift, LANE_OFFSET};
use crate::intersection::{Grid, Intersection, TrafficLight};

/// Everything needed to start a run.
pub struct ScenarioSetup {
    pub name: String,
    pub agents: Vec<VehicleAgent>,
    pub intersections: Vec<Intersection>,
    pub grid: Grid,
}

/// All known scenario ids.
pub const SCENARIOS: [&str; 7] = [
    "right_of_way",
    "multi_vehicle",
    "multi_vehicle_traffic_light",
    "blind_intersection",
    "emergency_vehicle",
    "emergency_vehicle_no_lights",
    "drunk_driver",
];

/// Compass side a scenario vehicle approaches from.
#[derive(Debug, Clone, Copy)]
enum Side {
    North,
    South,
    East,
    West,
}

impl Side {
    /// Travel heading for a vehicle coming from this side toward the
    /// origin, degrees.
    fn heading(&self) -> f64 {
        match self {
            Self::North => 270.0,
            Self::South => 90.0,
            Self::East => 180.0,
            Self::West => 0.0,
        }
    }

    fn position(&self, dist: f64) -> (f64, f64) {
        match self {
            Self::North => (0.0, dist),
            Self::South => (0.0, -dist),
            Self::East => (dist, 0.0),
            Self::West => (-dist, 0.0),
        }
    }
}

/// A vehicle approaching the origin intersection: spawn `dist` meters out,
/// waypoints through the center and 120 m past it.
fn approach(id: &str, side: Side, dist: f64, speed: f64) -> VehicleAgent {
    turning(id, side, dist, speed, Intent::Through)
}

/// Like [`approach`], but exiting along the turn the intent implies.
/// Spawn and waypoints sit on the right-hand lane of each leg.
fn turning(id: &str, side: Side, dist: f64, speed: f64, intent: Intent) -> VehicleAgent {
    let entry_shift = lane_shift(side.heading(), LANE_OFFSET);
    let (x, y) = side.position(dist);

    let exit_heading = match intent {
        Intent::Through => side.heading(),
        Intent::Left => side.heading() + 90.0,
        Intent::Right => side.heading() - 90.0,
    };
    let exit_shift = lane_shift(exit_heading, LANE_OFFSET);
    let exit_rad = exit_heading.to_radians();
    let exit = (
        exit_rad.cos() * 120.0 + exit_shift.0,
        exit_rad.sin() * 120.0 + exit_shift.1,
    );

    let waypoints: VecDeque<(f64, f64)> = [entry_shift, exit].into_iter().collect();
    VehicleAgent::new(id, x + entry_shift.0, y + entry_shift.1, side.heading(), speed)
        .with_intent(intent)
        .with_waypoints(waypoints)
}

fn light(config: &SimConfig) -> TrafficLight {
    TrafficLight::new(
        config.ns_green_secs,
        config.ew_green_secs,
        config.all_red_secs,
        config.preempt_all_red_secs,
        config.starvation_credit_secs,
    )
}

fn single_intersection(config: &SimConfig, controlled: bool) -> Vec<Intersection> {
    let l = controlled.then(|| light(config));
    vec![Intersection::new("int-0", (0.0, 0.0), l)]
}

/// Build the named scenario, or `None` for an unknown id.
pub fn build(name: &str, config: &SimConfig) -> Option<ScenarioSetup> {
    let grid = Grid::new(1, 1, config.grid_spacing);
    let (agents, controlled) = match name {
        // Three vehicles converging on an uncontrolled intersection on
        // mutually conflicting paths; arrival order settles passage.
        "right_of_way" => (
            vec![
                approach("veh-north", Side::North, 62.0, 10.0),
                approach("veh-east", Side::East, 60.0, 10.0),
                turning("veh-south", Side::South, 64.0, 10.0, Intent::Left),
            ],
            false,
        ),
        "multi_vehicle" => (
            vec![
                approach("veh-north", Side::North, 65.0, 10.0),
                approach("veh-east", Side::East, 60.0, 10.0),
                approach("veh-south", Side::South, 70.0, 10.0),
                approach("veh-west", Side::West, 62.0, 10.0),
            ],
            false,
        ),
        "multi_vehicle_traffic_light" => (
            vec![
                approach("veh-north", Side::North, 65.0, 10.0),
                approach("veh-east", Side::East, 60.0, 10.0),
                approach("veh-south", Side::South, 70.0, 10.0),
                approach("veh-west", Side::West, 62.0, 10.0),
            ],
            true,
        ),
        // Two perpendicular vehicles timed to meet at the center.
        "blind_intersection" => (
            vec![
                approach("veh-west", Side::West, 80.0, 10.0),
                approach("veh-south", Side::South, 80.0, 10.0),
            ],
            false,
        ),
        "emergency_vehicle" => (emergency_cast(), true),
        "emergency_vehicle_no_lights" => (emergency_cast(), false),
        // One adversary, two cooperators crossing its path.
        "drunk_driver" => (
            vec![
                approach("drunk-1", Side::West, 70.0, 11.0)
                    .with_profile(BehaviorProfile::Drunk),
                approach("veh-north", Side::North, 60.0, 10.0),
                approach("veh-south", Side::South, 66.0, 10.0),
            ],
            false,
        ),
        _ => return None,
    };

    Some(ScenarioSetup {
        name: name.to_owned(),
        agents,
        intersections: single_intersection(config, controlled),
        grid,
    })
}

/// Ambulance gaining on two slower leads in the same lane. The gap to the
/// rear lead starts just outside detection range, so the pull-over is
/// observable as a transition.
fn emergency_cast() -> Vec<VehicleAgent> {
    vec![
        approach("amb-1", Side::South, 130.0, 15.0).with_profile(BehaviorProfile::Emergency),
        approach("veh-lead-a", Side::South, 45.0, 8.0),
        approach("veh-lead-b", Side::South, 60.0, 8.0),
    ]
}

/// City mode: every grid intersection gets a light.
pub fn build_city(config: &SimConfig) -> ScenarioSetup {
    let grid = Grid::new(config.grid_cols, config.grid_rows, config.grid_spacing);
    let intersections = grid
        .centers()
        .into_iter()
        .enumerate()
        .map(|(i, center)| Intersection::new(format!("int-{i}"), center, Some(light(config))))
        .collect();
    ScenarioSetup { name: "city".to_owned(), agents: Vec::new(), intersections, grid }
}

#[cfg(test)]
#[path = "scenario_tests.rs"]
mod tests;
