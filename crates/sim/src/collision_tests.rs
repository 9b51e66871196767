// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::{detect, time_to_collision, Risk};
use crate::test_support::snapshot_of;

#[parameterized(
    at_band_edge_collision = { 1.5, Risk::Collision },
    just_inside_collision = { 0.2, Risk::Collision },
    high = { 2.9, Risk::High },
    high_edge = { 3.0, Risk::High },
    medium = { 4.0, Risk::Medium },
    medium_edge = { 5.0, Risk::Medium },
    low = { 5.1, Risk::Low },
    far = { 60.0, Risk::Low },
)]
fn risk_bands(ttc: f64, expected: Risk) {
    assert_eq!(Risk::from_ttc(ttc), expected);
}

#[test]
fn head_on_closing_pair() {
    // 40 m apart, closing at 20 m/s, 2.5 m radius: contact at 1.875 s.
    let ttc = time_to_collision((40.0, 0.0), (-20.0, 0.0), 2.5);
    assert!((ttc.unwrap() - 1.875).abs() < 1e-9);
}

#[test]
fn parallel_trajectories_never_collide() {
    // Same velocity: zero relative motion, 10 m apart.
    assert_eq!(time_to_collision((10.0, 0.0), (0.0, 0.0), 2.5), None);
}

#[test]
fn overlapping_hitboxes_collide_immediately() {
    // Inside the radius already, even with zero relative speed.
    assert_eq!(time_to_collision((1.0, 0.0), (0.0, 0.0), 2.5), Some(0.0));
}

#[test]
fn diverging_pair_never_collides() {
    assert_eq!(time_to_collision((40.0, 0.0), (20.0, 0.0), 2.5), None);
}

#[test]
fn near_miss_passes_outside_radius() {
    // Passing 5 m abeam of the other agent: never within 2.5 m.
    assert_eq!(time_to_collision((40.0, 5.0), (-20.0, 0.0), 2.5), None);
}

#[test]
fn detect_reports_ordered_pairs_once() {
    // Two vehicles on a perpendicular collision course, plus one far away.
    let snapshot = snapshot_of(&[
        ("veh-b", 0.0, -30.0, 10.0, 90.0, false),
        ("veh-a", -30.0, 0.0, 10.0, 0.0, false),
        ("veh-far", 500.0, 500.0, 10.0, 0.0, false),
    ]);
    let pairs = detect(&snapshot, 60.0, 2.5);
    assert_eq!(pairs.len(), 1);
    let pair = &pairs[0];
    assert_eq!(pair.a, "veh-a");
    assert_eq!(pair.b, "veh-b");
    assert!(pair.a < pair.b);
    assert!(pair.risk >= Risk::Medium);
    assert!(pair.ttc > 0.0);
}

#[test]
fn shared_agent_appears_in_both_pairs() {
    // veh-e closes head-on with veh-m; veh-w runs veh-m down from behind.
    let snapshot = snapshot_of(&[
        ("veh-m", 0.0, 0.0, 10.0, 0.0, false),
        ("veh-e", 25.0, 0.0, 10.0, 180.0, false),
        ("veh-w", -25.0, 0.0, 20.0, 0.0, false),
    ]);
    let pairs = detect(&snapshot, 60.0, 2.5);
    let involving_m = pairs.iter().filter(|p| p.involves("veh-m")).count();
    assert_eq!(involving_m, 2);
}

#[test]
fn prefilter_drops_distant_pairs() {
    // Closing fast but 200 m apart: outside the prefilter radius.
    let snapshot = snapshot_of(&[
        ("veh-a", 0.0, 0.0, 20.0, 0.0, false),
        ("veh-b", 200.0, 0.0, 20.0, 180.0, false),
    ]);
    assert!(detect(&snapshot, 60.0, 2.5).is_empty());
}

#[test]
fn low_risk_pairs_are_not_emitted() {
    // Closing at 2 m/s from 40 m out: TTC far beyond the medium band.
    let snapshot = snapshot_of(&[
        ("veh-a", 0.0, 0.0, 1.0, 0.0, false),
        ("veh-b", 40.0, 0.0, 1.0, 180.0, false),
    ]);
    assert!(detect(&snapshot, 60.0, 2.5).is_empty());
}
