// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for end-to-end kernel spec tests.
//!
//! Drives the library directly: deterministic stepped ticks, seeded
//! worlds, and a scripted advisor instead of a live endpoint.

use std::sync::Once;

use crossway::config::{Mode, SimConfig};
use crossway::export::ExportedState;
use crossway::scenario;
use crossway::world::World;

pub use crossway::test_support::ScriptedAdvisor;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Nominal tick used by every spec run (20 Hz).
pub const DT: f64 = 0.05;

/// A seeded default configuration so every run is reproducible.
pub fn seeded_config() -> SimConfig {
    SimConfig { seed: Some(0xC0FFEE), ..SimConfig::default() }
}

/// Build a world for a named scenario.
pub fn scenario_world(name: &str, config: SimConfig) -> World {
    #[allow(clippy::expect_used)]
    let setup = scenario::build(name, &config).expect("known scenario");
    World::new(config, Mode::Scenario, setup, None)
}

/// Step `ticks` times, collecting every export. Panics on a fatal tick
/// error, which no spec run should produce.
pub async fn run_ticks(world: &mut World, ticks: u64) -> Vec<ExportedState> {
    let mut exports = Vec::with_capacity(ticks as usize);
    for _ in 0..ticks {
        #[allow(clippy::expect_used)]
        let export = world.step(DT).await.expect("tick must not be fatal");
        exports.push(export);
    }
    exports
}

/// Distance between two exported agents at one tick.
pub fn agent_distance(export: &ExportedState, a: &str, b: &str) -> Option<f64> {
    let a = export.agents.get(a)?;
    let b = export.agents.get(b)?;
    Some(((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt())
}
