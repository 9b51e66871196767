// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::SimStats;
use crate::config::SimConfig;

#[test]
fn perfect_run_scores_one_hundred() {
    let stats = SimStats::default();
    assert_eq!(stats.cooperation_score(&SimConfig::default()), 100.0);
}

#[test]
fn near_misses_and_late_yields_cost_points() {
    let stats = SimStats { near_misses: 3, late_yields: 2, ..SimStats::default() };
    // 100 - 2.0*3 - 1.0*2 = 92.
    assert_eq!(stats.cooperation_score(&SimConfig::default()), 92.0);
}

#[test]
fn preemptions_earn_points_but_cap_at_one_hundred() {
    let stats = SimStats { successful_preemptions: 10, ..SimStats::default() };
    assert_eq!(stats.cooperation_score(&SimConfig::default()), 100.0);

    let stats = SimStats { near_misses: 2, successful_preemptions: 4, ..SimStats::default() };
    // 100 - 4 + 2 = 98.
    assert_eq!(stats.cooperation_score(&SimConfig::default()), 98.0);
}

#[test]
fn score_floors_at_zero() {
    let stats = SimStats { near_misses: 1000, ..SimStats::default() };
    assert_eq!(stats.cooperation_score(&SimConfig::default()), 0.0);
}

#[test]
fn weights_come_from_configuration() {
    let config = SimConfig {
        near_miss_weight: 10.0,
        late_yield_weight: 5.0,
        preemption_weight: 1.0,
        ..SimConfig::default()
    };
    let stats = SimStats {
        near_misses: 1,
        late_yields: 1,
        successful_preemptions: 2,
        ..SimStats::default()
    };
    // 100 - 10 - 5 + 2 = 87.
    assert_eq!(stats.cooperation_score(&config), 87.0);
}
