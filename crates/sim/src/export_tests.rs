// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{build, sanitize, AgentSnapshot};
use crate::agent::VehicleAgent;
use crate::collision::{CollisionPair, Risk};
use crate::intersection::{Grid, Intersection, TrafficLight};
use crate::stats::SimStats;

#[test]
fn sanitize_zeroes_non_finite() {
    assert_eq!(sanitize(1.5), 1.5);
    assert_eq!(sanitize(f64::NAN), 0.0);
    assert_eq!(sanitize(f64::INFINITY), 0.0);
    assert_eq!(sanitize(f64::NEG_INFINITY), 0.0);
}

#[test]
fn agent_snapshot_clamps_speed_and_wraps_heading() {
    let mut agent = VehicleAgent::new("veh-1", 1.0, 2.0, 0.0, 5.0);
    agent.v = 99.0;
    agent.theta = 720.5;
    let snap = AgentSnapshot::of(&agent, 25.0);
    assert_eq!(snap.v, 25.0);
    assert!((snap.theta - 0.5).abs() < 1e-9);
}

#[test]
fn agent_snapshot_scrubs_nan_position() {
    let mut agent = VehicleAgent::new("veh-1", f64::NAN, 2.0, 0.0, 5.0);
    agent.x = f64::NAN;
    let snap = AgentSnapshot::of(&agent, 25.0);
    assert_eq!(snap.x, 0.0);
}

fn sample_export() -> super::ExportedState {
    let light = TrafficLight::new(15.0, 15.0, 2.0, 1.0, 5.0);
    let intersections = vec![
        Intersection::new("int-0", (0.0, 0.0), Some(light)),
        Intersection::new("int-1", (80.0, 0.0), None),
    ];
    let pairs = vec![CollisionPair {
        a: "veh-a".to_owned(),
        b: "veh-b".to_owned(),
        ttc: 2.2,
        risk: Risk::High,
    }];
    let grid = Grid::new(2, 1, 80.0);
    let stats = SimStats { elapsed_time: 12.5, collisions_prevented: 3, ..SimStats::default() };

    let agents = vec![
        ("veh-b".to_owned(), AgentSnapshot::of(&VehicleAgent::new("veh-b", 1.0, 0.0, 0.0, 5.0), 25.0)),
        ("veh-a".to_owned(), AgentSnapshot::of(&VehicleAgent::new("veh-a", 2.0, 0.0, 0.0, 5.0), 25.0)),
    ];
    build(
        true,
        Some("right_of_way"),
        42,
        2.1,
        agents.into_iter(),
        &intersections,
        &pairs,
        &grid,
        &stats,
        97.5,
    )
}

#[test]
fn build_produces_a_complete_document() {
    let export = sample_export();
    assert!(export.running);
    assert_eq!(export.scenario.as_deref(), Some("right_of_way"));
    assert_eq!(export.tick, 42);
    assert_eq!(export.agents.len(), 2);
    assert_eq!(export.collision_pairs.len(), 1);
    assert_eq!(export.collision_pairs[0].agent1, "veh-a");
    assert_eq!(export.collision_pairs[0].risk, "high");
    assert_eq!(export.grid.cols, 2);
    assert_eq!(export.grid.intersections.len(), 2);
    assert_eq!(export.stats.collisions_prevented, 3);
    assert_eq!(export.stats.cooperation_score, 97.5);
}

#[test]
fn agents_are_exported_in_id_order() {
    let export = sample_export();
    let ids: Vec<_> = export.agents.keys().cloned().collect();
    assert_eq!(ids, vec!["veh-a".to_owned(), "veh-b".to_owned()]);
}

#[test]
fn only_lit_intersections_appear_in_infrastructure() {
    let export = sample_export();
    assert_eq!(export.infrastructure.len(), 1);
    let info = export.infrastructure.get("int-0").unwrap();
    assert_eq!(info.phase, "NS_GREEN");
    assert!((info.phase_remaining - 15.0).abs() < 1e-9);
}

#[test]
fn document_serializes_to_json() {
    let export = sample_export();
    let json = serde_json::to_string(&export).unwrap();
    assert!(json.contains("\"running\":true"));
    assert!(json.contains("\"NS_GREEN\""));
}
