// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulation lifecycle: start/stop/restart, agent spawning, and the state
//! export surface. The tick task owns the [`World`] exclusively; every
//! control operation goes over a command channel, and the latest export is
//! published on a watch channel. Stopping cancels in-flight advisor calls
//! and never externalizes a partial tick.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::advisor::{Advisor, HttpAdvisor};
use crate::config::{Mode, SimConfig};
use crate::export::ExportedState;
use crate::scenario;
use crate::stats::TelemetryReport;
use crate::world::{SpawnKind, World};

enum Command {
    Spawn(SpawnKind, oneshot::Sender<String>),
    ToggleBackground(oneshot::Sender<bool>),
    Telemetry(oneshot::Sender<TelemetryReport>),
}

struct RunningSim {
    cmd_tx: mpsc::Sender<Command>,
    export_rx: watch::Receiver<Option<Arc<ExportedState>>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ManagerState {
    mode: Mode,
    scenario: Option<String>,
    running: Option<RunningSim>,
}

/// Owns the simulation lifecycle. All methods are cancel-safe and cheap;
/// the heavy lifting happens on the tick task.
pub struct SimulationManager {
    config: SimConfig,
    state: Mutex<ManagerState>,
}

impl SimulationManager {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ManagerState {
                mode: Mode::City,
                scenario: None,
                running: None,
            }),
        }
    }

    /// Select the run mode for subsequent starts.
    pub async fn init(&self, mode: Mode) {
        let mut state = self.state.lock().await;
        state.mode = mode;
    }

    /// Start a run. A scenario id implies scenario mode; `None` starts the
    /// configured city grid. Restarts cleanly if already running.
    pub async fn start(&self, scenario_id: Option<&str>) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.running.take() {
            shutdown(running).await;
        }

        let mode = if scenario_id.is_some() { Mode::Scenario } else { state.mode };
        let setup = match scenario_id {
            Some(name) => scenario::build(name, &self.config)
                .ok_or_else(|| anyhow::anyhow!("unknown scenario: {name}"))?,
            None => scenario::build_city(&self.config),
        };
        state.mode = mode;
        state.scenario = scenario_id.map(str::to_owned);

        let advisor: Option<Arc<dyn Advisor>> = self
            .config
            .advisor_url
            .as_ref()
            .map(|url| Arc::new(HttpAdvisor::new(url.clone(), self.config.v_max)) as Arc<dyn Advisor>);
        let world = World::new(self.config.clone(), mode, setup, advisor);

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (export_tx, export_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(world, cmd_rx, export_tx, cancel.clone()));

        tracing::info!(mode = %mode, scenario = ?scenario_id, "simulation started");
        state.running = Some(RunningSim { cmd_tx, export_rx, cancel, handle });
        Ok(())
    }

    /// Stop the current run, if any.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.running.take() {
            shutdown(running).await;
            tracing::info!("simulation stopped");
        }
    }

    /// Stop and start again with the same mode and scenario.
    pub async fn restart(&self) -> anyhow::Result<()> {
        let scenario = {
            let state = self.state.lock().await;
            state.scenario.clone()
        };
        self.start(scenario.as_deref()).await
    }

    /// Spawn a special agent into the running simulation.
    pub async fn spawn(&self, kind: SpawnKind) -> anyhow::Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Spawn(kind, tx)).await?;
        Ok(rx.await?)
    }

    /// Flip background traffic on or off; returns the new setting.
    pub async fn toggle_background_traffic(&self) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ToggleBackground(tx)).await?;
        Ok(rx.await?)
    }

    /// The most recent sanitized export, if a run has produced one.
    pub async fn get_state(&self) -> Option<Arc<ExportedState>> {
        let state = self.state.lock().await;
        state.running.as_ref().and_then(|r| r.export_rx.borrow().clone())
    }

    /// Telemetry counters from the running world.
    pub async fn telemetry_report(&self) -> anyhow::Result<TelemetryReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Telemetry(tx)).await?;
        Ok(rx.await?)
    }

    pub async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.running.is_some()
    }

    async fn send(&self, cmd: Command) -> anyhow::Result<()> {
        let state = self.state.lock().await;
        let running =
            state.running.as_ref().ok_or_else(|| anyhow::anyhow!("simulation not running"))?;
        running.cmd_tx.send(cmd).await.map_err(|_| anyhow::anyhow!("simulation shut down"))?;
        Ok(())
    }
}

async fn shutdown(running: RunningSim) {
    running.cancel.cancel();
    if let Err(err) = running.handle.await {
        tracing::warn!(err = %err, "tick task did not shut down cleanly");
    }
}

/// The tick task: fixed cadence, wall-clock `dt` capped to prevent position
/// jumps, commands interleaved between ticks.
async fn run_loop(
    mut world: World,
    mut cmd_rx: mpsc::Receiver<Command>,
    export_tx: watch::Sender<Option<Arc<ExportedState>>>,
    cancel: CancellationToken,
) {
    let nominal = world.config.nominal_dt();
    let mut timer = tokio::time::interval(world.config.tick_period());
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(cmd) = cmd_rx.recv() => handle_command(&mut world, cmd),
            _ = timer.tick() => {
                let now = tokio::time::Instant::now();
                // Wall-clock delta, capped at twice the nominal period so a
                // stalled tick cannot cause position jumps. No lower bound:
                // the interval's immediate first fire simply advances the
                // simulation by (almost) nothing.
                let dt = (now - last).as_secs_f64().min(nominal * 2.0);
                last = now;

                let started = std::time::Instant::now();
                // Cancellation here drops the step mid-flight, which
                // cancels any in-flight advisor calls; nothing from the
                // aborted tick is externalized.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = world.step(dt) => match result {
                        Ok(export) => {
                            let _ = export_tx.send(Some(Arc::new(export)));
                        }
                        Err(err) => {
                            tracing::error!(err = %err, "fatal tick error; restart required");
                            break;
                        }
                    }
                }
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed > nominal {
                    tracing::warn!(
                        tick = world.tick,
                        elapsed_ms = (elapsed * 1000.0) as u64,
                        "tick exceeded budget"
                    );
                }
            }
        }
    }

    // Final document marks the run as stopped.
    let _ = export_tx.send(Some(Arc::new(world.export(false))));
}

fn handle_command(world: &mut World, cmd: Command) {
    match cmd {
        Command::Spawn(kind, reply) => {
            let id = world.spawn(kind);
            tracing::info!(agent = %id, kind = ?kind, "spawned agent");
            let _ = reply.send(id);
        }
        Command::ToggleBackground(reply) => {
            let enabled = world.toggle_background();
            tracing::info!(enabled, "background traffic toggled");
            let _ = reply.send(enabled);
        }
        Command::Telemetry(reply) => {
            let report = world.telemetry();
            report.emit();
            let _ = reply.send(report);
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
