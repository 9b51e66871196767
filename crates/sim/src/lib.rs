// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crossway: cooperative intersection-safety simulation kernel.
//!
//! A fixed-rate multi-agent tick loop over a signed V2X broadcast channel,
//! with rule-based safety overrides, a circuit-breaker-guarded advisor
//! seam, pairwise TTC collision prediction, right-of-way and emergency
//! preemption, adaptive traffic lights, and grid-scale background traffic.

pub mod advisor;
pub mod agent;
pub mod background;
pub mod collision;
pub mod config;
pub mod error;
pub mod export;
pub mod intersection;
pub mod manager;
pub mod priority;
pub mod scenario;
pub mod stats;
pub mod test_support;
pub mod v2x;
pub mod world;

use config::{Launch, Mode, SimConfig};
use manager::SimulationManager;

/// Run the headless kernel until the tick budget runs out or Ctrl-C.
pub async fn run(config: SimConfig, launch: Launch) -> anyhow::Result<()> {
    // The HTTP advisor rides on rustls; install the ring provider once.
    if config.advisor_url.is_some() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    let poll = config.tick_period() / 2;
    let manager = SimulationManager::new(config);
    manager.init(launch.mode).await;

    let scenario = match launch.mode {
        Mode::Scenario => {
            Some(launch.scenario.clone().ok_or_else(|| {
                anyhow::anyhow!("scenario mode requires --scenario (one of: {})",
                    scenario::SCENARIOS.join(", "))
            })?)
        }
        Mode::City => None,
    };
    manager.start(scenario.as_deref()).await?;

    let mut printed_tick = 0u64;
    let mut timer = tokio::time::interval(poll);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; shutting down");
                break;
            }
            _ = timer.tick() => {
                let Some(state) = manager.get_state().await else {
                    continue;
                };
                if launch.export_every > 0
                    && state.tick >= printed_tick + launch.export_every
                {
                    printed_tick = state.tick;
                    println!("{}", serde_json::to_string(state.as_ref())?);
                }
                if let Some(limit) = launch.ticks {
                    if state.tick >= limit {
                        break;
                    }
                }
            }
        }
    }

    let report = manager.telemetry_report().await;
    manager.stop().await;
    if let Ok(report) = report {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
