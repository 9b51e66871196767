// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{arbitrate, Advisory};
use crate::intersection::{Coordinator, Intersection, TrafficLight};
use crate::test_support::snapshot_of;

fn uncontrolled() -> Coordinator {
    Coordinator::new(vec![Intersection::new("int-0", (0.0, 0.0), None)])
}

fn controlled() -> Coordinator {
    let light = TrafficLight::new(15.0, 15.0, 2.0, 1.0, 5.0);
    Coordinator::new(vec![Intersection::new("int-0", (0.0, 0.0), Some(light))])
}

#[test]
fn default_is_may_go() {
    let snapshot = snapshot_of(&[("veh-a", -100.0, 0.0, 10.0, 0.0, false)]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MayGo));
}

#[test]
fn vehicle_on_the_right_has_priority() {
    // veh-a east-bound, veh-b north-bound from the south = a's right.
    let snapshot = snapshot_of(&[
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
        ("veh-b", 0.0, -20.0, 10.0, 90.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MustYield));
    assert_eq!(advisories.get("veh-b"), Some(&Advisory::MayGo));
}

#[test]
fn mirror_of_right_hand_rule() {
    // Swap the geometry: now veh-b is on veh-a's left and must yield.
    let snapshot = snapshot_of(&[
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
        ("veh-b", 0.0, 20.0, 10.0, 270.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MayGo));
    assert_eq!(advisories.get("veh-b"), Some(&Advisory::MustYield));
}

#[test]
fn head_on_through_traffic_both_go() {
    let snapshot = snapshot_of(&[
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
        ("veh-b", 20.0, 0.0, 10.0, 180.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MayGo));
    assert_eq!(advisories.get("veh-b"), Some(&Advisory::MayGo));
}

#[test]
fn right_hand_rule_skips_controlled_intersections() {
    let snapshot = snapshot_of(&[
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
        ("veh-b", 0.0, -20.0, 10.0, 90.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &controlled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MayGo));
    assert_eq!(advisories.get("veh-b"), Some(&Advisory::MayGo));
}

#[test]
fn emergency_preempts_everyone_in_zone() {
    let snapshot = snapshot_of(&[
        ("amb-1", 0.0, -30.0, 15.0, 90.0, true),
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
        ("veh-far", -500.0, 0.0, 10.0, 0.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("amb-1"), Some(&Advisory::MayGo));
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MustYield));
    // Outside the preemption zone, nothing changes.
    assert_eq!(advisories.get("veh-far"), Some(&Advisory::MayGo));
}

#[test]
fn converging_emergencies_resolve_by_id() {
    let snapshot = snapshot_of(&[
        ("amb-b", 0.0, -30.0, 15.0, 90.0, true),
        ("amb-a", -30.0, 0.0, 15.0, 0.0, true),
    ]);
    let advisories = arbitrate(&snapshot, &uncontrolled(), 40.0, 25.0);
    assert_eq!(advisories.get("amb-a"), Some(&Advisory::MayGo));
    assert_eq!(advisories.get("amb-b"), Some(&Advisory::MustYield));
}

#[test]
fn emergency_preemption_applies_at_controlled_intersections_too() {
    let snapshot = snapshot_of(&[
        ("amb-1", 0.0, -30.0, 15.0, 90.0, true),
        ("veh-a", -20.0, 0.0, 10.0, 0.0, false),
    ]);
    let advisories = arbitrate(&snapshot, &controlled(), 40.0, 25.0);
    assert_eq!(advisories.get("veh-a"), Some(&Advisory::MustYield));
}
