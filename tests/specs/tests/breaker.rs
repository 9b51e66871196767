// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Breaker lifecycle specs, driven through whole-world ticks: failures are
//! induced at the advisor seam and observed at the breaker.

use std::sync::Arc;
use std::time::Duration;

use crossway::advisor::BreakerState;
use crossway::config::Mode;
use crossway::error::SimError;
use crossway::scenario;
use crossway::world::World;

use crossway_specs::{seeded_config, ScriptedAdvisor, DT};

fn world_with(advisor: ScriptedAdvisor, llm_timeout_ms: u64) -> World {
    let mut config = seeded_config();
    config.llm_timeout_ms = llm_timeout_ms;
    #[allow(clippy::expect_used)]
    let setup = scenario::build("right_of_way", &config).expect("known scenario");
    World::new(config, Mode::Scenario, setup, Some(Arc::new(advisor)))
}

async fn step_until_time(world: &mut World, time: f64) {
    while world.time < time {
        #[allow(clippy::expect_used)]
        world.step(DT).await.expect("tick must not be fatal");
    }
}

/// Malformed responses trip the breaker after five failures; the first
/// probe after the cooldown succeeds (the script is exhausted, so the
/// advisor answers normally) and closes it again.
#[tokio::test]
async fn breaker_opens_on_failures_and_closes_on_a_good_probe() {
    let advisor = ScriptedAdvisor::new(vec![Err(SimError::AdvisorMalformed); 6]);
    let mut world = world_with(advisor, 800);

    // Three agents per tick: two ticks cross the five-failure threshold.
    world.step(DT).await.unwrap();
    assert_eq!(world.breaker.state(), BreakerState::Closed);
    world.step(DT).await.unwrap();
    let opened_until = match world.breaker.state() {
        BreakerState::Open { until } => until,
        other => panic!("expected open breaker, got {other:?}"),
    };
    assert!((opened_until - (world.time + 30.0)).abs() < 1e-6);

    // Open for the whole cooldown: no advisor traffic, no state change.
    let calls_at_open = world.stats.llm_failures;
    step_until_time(&mut world, opened_until - 1.0).await;
    assert!(matches!(world.breaker.state(), BreakerState::Open { .. }));
    assert_eq!(world.stats.llm_failures, calls_at_open);

    // First tick past the cooldown probes; the probe succeeds and closes.
    step_until_time(&mut world, opened_until + 2.0 * DT).await;
    assert_eq!(world.breaker.state(), BreakerState::Closed);
    assert!(world.stats.llm_calls >= 1, "probe success should count as an llm call");
}

/// Timeouts are breaker failures too; a probe that also times out
/// re-opens the breaker for a fresh cooldown.
#[tokio::test]
async fn timing_out_probe_reopens_the_breaker() {
    // Every call sleeps past the 5 ms deadline, probes included.
    let advisor = ScriptedAdvisor::new(Vec::new()).with_delay(Duration::from_millis(50));
    let mut world = world_with(advisor, 5);

    world.step(DT).await.unwrap();
    world.step(DT).await.unwrap();
    let first_until = match world.breaker.state() {
        BreakerState::Open { until } => until,
        other => panic!("expected open breaker, got {other:?}"),
    };

    // Ride out the cooldown; the probe then fails and re-opens.
    step_until_time(&mut world, first_until + 2.0 * DT).await;
    let second_until = match world.breaker.state() {
        BreakerState::Open { until } => until,
        other => panic!("expected re-opened breaker, got {other:?}"),
    };
    assert!(second_until > first_until + 29.0, "cooldown was not restarted");
    assert_eq!(world.stats.llm_calls, 0, "no timed-out call may count as an llm call");
}
