// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tick engine.
//!
//! One `step` executes the seven phases in strict order: broadcasts into
//! the channel, infrastructure, collision/priority computation over the
//! frozen snapshot, parallel decisions, the single-writer apply phase,
//! kinematic integration, and the sanitized export. Every agent observes
//! the same snapshot; all shared-state mutation happens on this thread.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::advisor::{Advisor, BreakerGate, CircuitBreaker};
use crate::agent::decision::{decide, AgentView, DecisionInput, DecisionOutcome, DrunkDraws};
use crate::agent::{BehaviorProfile, Decision, Intent, MemoryEntry, VehicleAgent};
use crate::background::BackgroundDriver;
use crate::collision::{self, CollisionPair, Risk};
use crate::config::{Mode, SimConfig};
use crate::error::SimError;
use crate::export::{self, AgentSnapshot, ExportedState};
use crate::intersection::coordinator::{Approach, ApproachDir};
use crate::intersection::grid::{lane_shift, LANE_OFFSET};
use crate::intersection::light::EmergencyDemand;
use crate::intersection::{Coordinator, Grid};
use crate::priority::{self, Advisory};
use crate::scenario::ScenarioSetup;
use crate::stats::{SimStats, TelemetryReport};
use crate::v2x::{Snapshot, V2xChannel};

/// Kinds of agents spawnable through the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnKind {
    Drunk,
    Police,
    Ambulance,
}

/// All simulation state. Owned by the tick task; agents hold ids only.
pub struct World {
    pub config: Arc<SimConfig>,
    pub mode: Mode,
    pub scenario: Option<String>,
    pub tick: u64,
    pub time: f64,
    pub agents: IndexMap<String, VehicleAgent>,
    pub channel: V2xChannel,
    pub coordinator: Coordinator,
    pub grid: Grid,
    pub breaker: CircuitBreaker,
    pub advisor: Option<Arc<dyn Advisor>>,
    pub stats: SimStats,
    pub background: BackgroundDriver,
    pub background_enabled: bool,
    rng: StdRng,
    /// Worst risk seen per active pair, for near-miss and prevention
    /// accounting.
    episodes: HashMap<(String, String), Risk>,
    last_pairs: Vec<CollisionPair>,
}

impl World {
    pub fn new(
        config: SimConfig,
        mode: Mode,
        setup: ScenarioSetup,
        advisor: Option<Arc<dyn Advisor>>,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let channel = V2xChannel::new(
            &config.hmac_key,
            config.v_max,
            config.msg_rate,
            config.stale_after(),
            config.liveness_timeout(),
            config.history_cap,
        );
        let breaker = CircuitBreaker::new(
            config.breaker_threshold,
            config.breaker_window_secs,
            config.breaker_cooldown_secs,
        );
        let background = BackgroundDriver::new(config.population);
        let background_enabled = mode == Mode::City;
        let agents: IndexMap<String, VehicleAgent> =
            setup.agents.into_iter().map(|a| (a.id.clone(), a)).collect();

        Self {
            config: Arc::new(config),
            mode,
            scenario: (mode == Mode::Scenario).then(|| setup.name.clone()),
            tick: 0,
            time: 0.0,
            agents,
            channel,
            coordinator: Coordinator::new(setup.intersections),
            grid: setup.grid,
            breaker,
            advisor,
            stats: SimStats::default(),
            background,
            background_enabled,
            rng: StdRng::seed_from_u64(seed),
            episodes: HashMap::new(),
            last_pairs: Vec::new(),
        }
    }

    /// Run one tick. `dt` is the wall-clock delta, already capped by the
    /// scheduler. Only a coordinator invariant violation is fatal.
    pub async fn step(&mut self, dt: f64) -> Result<ExportedState, SimError> {
        self.tick += 1;
        self.time += dt;
        let tick = self.tick;
        let now = self.time;

        if self.background_enabled {
            let departed = self.background.maintain(
                &mut self.agents,
                &self.grid,
                self.config.speed_limit,
                &mut self.rng,
            );
            for id in &departed {
                self.channel.remove(id);
            }
        }

        // Phase 1: collect broadcasts and freeze the snapshot.
        let key = self.channel.signing_key().clone();
        for agent in self.agents.values_mut() {
            let mut msg = agent.broadcast(now);
            msg.sign(&key);
            if let Err(err) = self.channel.publish(msg, now) {
                tracing::debug!(agent = %agent.id, err = %err, "broadcast rejected");
            }
        }
        let snapshot = self.channel.capture_snapshot(tick, now);

        // Phase 2: infrastructure.
        self.step_lights(dt, &snapshot);
        let approaches: Vec<Approach> = self
            .agents
            .values()
            .map(|a| Approach {
                agent_id: a.id.clone(),
                position: a.position(),
                heading: a.theta,
                intent: a.intent,
                is_emergency: a.profile.is_emergency(),
            })
            .collect();
        let grants = self.coordinator.update(
            &approaches,
            tick,
            self.config.d_arrive,
            self.config.box_half,
        )?;

        // Phase 3: collision pairs and priority over the frozen snapshot.
        let pairs = Arc::new(collision::detect(
            &snapshot,
            self.config.prefilter_radius,
            self.config.collision_radius,
        ));
        let advisories =
            priority::arbitrate(&snapshot, &self.coordinator, self.config.d_pre, self.config.d_arrive);
        let newly_high = self.track_episodes(&pairs);

        // Phase 4: decisions in parallel over the immutable inputs.
        let gate = self.breaker.gate(now);
        let probe: Option<String> = match gate {
            BreakerGate::Probe => self
                .agents
                .values()
                .find(|a| !a.profile.is_drunk())
                .map(|a| a.id.clone()),
            _ => None,
        };

        let mut draws_map: HashMap<String, DrunkDraws> = HashMap::new();
        let mut inputs = Vec::with_capacity(self.agents.len());
        for agent in self.agents.values() {
            let drunk = if agent.profile.is_drunk() {
                let draws = DrunkDraws {
                    ignore_signals: self.rng.random_bool(0.7),
                    heading_noise: self.rng.random_range(-8.0..8.0),
                    speed_jitter: if self.rng.random_bool(0.1) {
                        Some(self.rng.random_range(-0.3..0.3))
                    } else {
                        None
                    },
                };
                draws_map.insert(agent.id.clone(), draws);
                draws
            } else {
                DrunkDraws::default()
            };

            inputs.push(DecisionInput {
                view: AgentView {
                    id: agent.id.clone(),
                    x: agent.x,
                    y: agent.y,
                    theta: agent.theta,
                    v: agent.v,
                    intent: agent.intent,
                    profile: agent.profile,
                    inside_intersection: agent.inside_intersection,
                    pulling_over: agent.pulling_over,
                    risk_level: agent.risk_level,
                },
                snapshot: Arc::clone(&snapshot),
                pairs: Arc::clone(&pairs),
                advisory: advisories.get(&agent.id).copied().unwrap_or(Advisory::MayGo),
                admitted: grants.get(&agent.id).copied(),
                at_red_light: self.at_red_light(agent),
                gate,
                is_probe: probe.as_deref() == Some(agent.id.as_str()),
                advisor: self.advisor.clone(),
                llm_timeout: self.config.llm_timeout(),
                memory_digest: agent.memory.digest(5),
                damper_active: tick < agent.damper_until,
                drunk,
                speed_limit: self.config.speed_limit,
                v_max: self.config.v_max,
                obs_radius: self.config.obs_radius,
                emergency_detect_range: self.config.emergency_detect_range,
            });
        }

        let workers = self.config.worker_count(inputs.len());
        let mut outcomes: Vec<DecisionOutcome> = stream::iter(inputs.into_iter().map(|input| {
            async move {
                let id = input.view.id.clone();
                // A panic inside one agent's decision is that agent's
                // fault, never the tick's.
                match tokio::spawn(decide(input)).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        tracing::warn!(agent = %id, err = %err, "agent decision fault");
                        DecisionOutcome {
                            agent_id: id,
                            decision: Decision::stop("decision fault"),
                            pulling_over: false,
                            advisor_result: None,
                            llm_success: false,
                            context_summary: "decision fault".to_owned(),
                            late_yield: false,
                            fault: true,
                        }
                    }
                }
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;
        // The pool completes in arbitrary order; apply deterministically.
        outcomes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        // Phase 5: single-writer apply. The breaker's open-to-half-open
        // transition implied by this tick's gate is committed here, before
        // the probe's outcome (if any) is recorded.
        self.breaker.advance(now);
        let mut despawn = Vec::new();
        for outcome in outcomes {
            let Some(agent) = self.agents.get_mut(&outcome.agent_id) else {
                continue;
            };

            if outcome.fault {
                agent.consecutive_faults += 1;
                self.stats.decision_faults += 1;
                if agent.consecutive_faults >= self.config.max_consecutive_faults {
                    despawn.push(agent.id.clone());
                }
            } else {
                agent.consecutive_faults = 0;
            }

            match &outcome.advisor_result {
                Some(Ok(())) => self.breaker.record_success(now),
                Some(Err(err)) => {
                    if err.is_breaker_failure() {
                        self.breaker.record_failure(now);
                    }
                    self.stats.llm_failures += 1;
                    tracing::debug!(agent = %outcome.agent_id, err = %err, "advisor failure");
                }
                None => {}
            }
            if outcome.llm_success {
                agent.llm_calls += 1;
                self.stats.llm_calls += 1;
            }
            if outcome.late_yield {
                self.stats.late_yields += 1;
            }

            agent.last_decision = outcome.decision.clone();
            agent.pulling_over = outcome.pulling_over;
            agent.push_action(outcome.decision.action);
            if !agent.profile.is_drunk() && tick >= agent.damper_until && agent.is_oscillating() {
                agent.damper_until = tick + 2;
            }
            agent.memory.record(
                MemoryEntry {
                    context: outcome.context_summary,
                    decision: outcome.decision.action,
                    reason: outcome.decision.reason,
                    outcome: "committed".to_owned(),
                },
                tick,
            );
        }

        // Risk levels for the next broadcast, plus near-miss memory.
        for agent in self.agents.values_mut() {
            agent.risk_level = Risk::Low;
        }
        for pair in pairs.iter() {
            for id in [&pair.a, &pair.b] {
                if let Some(agent) = self.agents.get_mut(id.as_str()) {
                    if pair.risk > agent.risk_level {
                        agent.risk_level = pair.risk;
                    }
                }
            }
        }
        for pair in &newly_high {
            let location = self.pair_location(pair);
            if let Some(agent) = self.agents.get_mut(&pair.a) {
                agent.memory.record_near_miss(&pair.b, pair.ttc, location, tick);
            }
            if let Some(agent) = self.agents.get_mut(&pair.b) {
                agent.memory.record_near_miss(&pair.a, pair.ttc, location, tick);
            }
        }

        for id in &despawn {
            tracing::warn!(agent = %id, "despawning after repeated decision faults");
            self.despawn(id);
        }

        // Phase 6: integrate kinematics and refresh intersection flags.
        for agent in self.agents.values_mut() {
            let noise = draws_map.get(&agent.id).map(|d| d.heading_noise).unwrap_or(0.0);
            agent.integrate(dt, noise);
        }
        let box_half = self.config.box_half;
        for agent in self.agents.values_mut() {
            agent.inside_intersection = self
                .coordinator
                .intersections
                .iter()
                .any(|i| i.contains((agent.x, agent.y), box_half));
        }
        self.stats.successful_preemptions = self
            .coordinator
            .intersections
            .iter()
            .filter_map(|i| i.light.as_ref())
            .map(|l| l.preemptions)
            .sum();

        // Phase 7: export.
        self.stats.elapsed_time = now;
        self.last_pairs = pairs.as_ref().clone();
        Ok(self.export(true))
    }

    /// Build the sanitized export document for the current state.
    pub fn export(&self, running: bool) -> ExportedState {
        let score = self.stats.cooperation_score(&self.config);
        let agents = self
            .agents
            .iter()
            .map(|(id, a)| (id.clone(), AgentSnapshot::of(a, self.config.v_max)));
        let pairs = self.current_pairs();
        export::build(
            running,
            self.scenario.as_deref(),
            self.tick,
            self.time,
            agents,
            &self.coordinator.intersections,
            &pairs,
            &self.grid,
            &self.stats,
            score,
        )
    }

    /// Pairs from the most recent tick, for exports outside `step`.
    fn current_pairs(&self) -> Vec<CollisionPair> {
        self.last_pairs.clone()
    }

    fn step_lights(&mut self, dt: f64, snapshot: &Snapshot) {
        let d_pre = self.config.d_pre;
        let box_half = self.config.box_half;
        for intersection in &mut self.coordinator.intersections {
            let Some(light) = intersection.light.as_mut() else {
                continue;
            };
            let center = intersection.center;
            let demand = snapshot
                .messages()
                .filter(|m| m.is_emergency)
                .filter(|m| {
                    let dx = m.x - center.0;
                    let dy = m.y - center.1;
                    let dist = (dx * dx + dy * dy).sqrt();
                    let inside = dx.abs() <= box_half && dy.abs() <= box_half;
                    let rad = m.theta.to_radians();
                    let toward = rad.cos() * -dx + rad.sin() * -dy > 0.0;
                    inside || (dist <= d_pre && toward)
                })
                .min_by(|a, b| a.agent_id.cmp(&b.agent_id))
                .map(|m| EmergencyDemand { axis: ApproachDir::from_heading(m.theta).axis() });
            light.step(dt, demand);
        }
    }

    fn at_red_light(&self, agent: &VehicleAgent) -> bool {
        if agent.inside_intersection {
            return false;
        }
        let reach = self.config.d_arrive + self.config.box_half;
        for intersection in &self.coordinator.intersections {
            let Some(light) = &intersection.light else {
                continue;
            };
            let center = intersection.center;
            if agent.distance_to(center) > reach {
                continue;
            }
            let rad = agent.theta.to_radians();
            let toward = rad.cos() * (center.0 - agent.x) + rad.sin() * (center.1 - agent.y) > 0.0;
            if !toward {
                continue;
            }
            let axis = ApproachDir::from_heading(agent.theta).axis();
            return !light.is_green(axis);
        }
        false
    }

    /// Track pair risk transitions. Returns pairs that just crossed into
    /// `high` (or worse); finalizes episodes for pairs that cleared.
    fn track_episodes(&mut self, pairs: &[CollisionPair]) -> Vec<CollisionPair> {
        let mut newly_high = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for pair in pairs {
            let pair_key = (pair.a.clone(), pair.b.clone());
            seen.insert(pair_key.clone());
            let entry = self.episodes.entry(pair_key).or_insert(Risk::Low);
            if pair.risk >= Risk::High && *entry < Risk::High {
                self.stats.near_misses += 1;
                newly_high.push(pair.clone());
            }
            if pair.risk > *entry {
                *entry = pair.risk;
            }
        }

        // Episodes whose pair vanished: the conflict resolved.
        let resolved: Vec<_> =
            self.episodes.keys().filter(|k| !seen.contains(*k)).cloned().collect();
        for key in resolved {
            if let Some(max_risk) = self.episodes.remove(&key) {
                if max_risk >= Risk::High {
                    self.stats.collisions_prevented += 1;
                }
            }
        }
        newly_high
    }

    fn pair_location(&self, pair: &CollisionPair) -> (f64, f64) {
        let a = self.agents.get(&pair.a).map(VehicleAgent::position);
        let b = self.agents.get(&pair.b).map(VehicleAgent::position);
        match (a, b) {
            (Some(a), Some(b)) => ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0),
            (Some(p), None) | (None, Some(p)) => p,
            (None, None) => (0.0, 0.0),
        }
    }

    /// Spawn a special agent near the demo intersection, heading through it.
    pub fn spawn(&mut self, kind: SpawnKind) -> String {
        let center = self.grid.centers()[self.grid.demo_index()];
        let side = self.rng.random_range(0..4u8);
        let (offset, heading): ((f64, f64), f64) = match side {
            0 => ((0.0, 70.0), 270.0),
            1 => ((0.0, -70.0), 90.0),
            2 => ((70.0, 0.0), 180.0),
            _ => ((-70.0, 0.0), 0.0),
        };
        let (prefix, profile, speed) = match kind {
            SpawnKind::Drunk => ("drunk", BehaviorProfile::Drunk, self.config.speed_limit),
            SpawnKind::Police => ("police", BehaviorProfile::Police, self.config.speed_limit),
            SpawnKind::Ambulance => {
                ("amb", BehaviorProfile::Emergency, self.config.speed_limit * 1.4)
            }
        };
        let id = format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let rad = heading.to_radians();
        let shift = lane_shift(heading, LANE_OFFSET);
        let through = (center.0 + shift.0, center.1 + shift.1);
        let exit = (through.0 + rad.cos() * 150.0, through.1 + rad.sin() * 150.0);
        let agent = VehicleAgent::new(
            id.clone(),
            center.0 + offset.0 + shift.0,
            center.1 + offset.1 + shift.1,
            heading,
            speed,
        )
        .with_profile(profile)
        .with_intent(Intent::Through)
        .with_waypoints([through, exit]);
        self.agents.insert(id.clone(), agent);
        id
    }

    /// Remove an agent and everything it owns.
    pub fn despawn(&mut self, id: &str) {
        if self.agents.shift_remove(id).is_some() {
            self.channel.remove(id);
            self.stats.despawns += 1;
        }
    }

    pub fn toggle_background(&mut self) -> bool {
        self.background_enabled = !self.background_enabled;
        self.background_enabled
    }

    pub fn telemetry(&self) -> TelemetryReport {
        TelemetryReport {
            tick: self.tick,
            elapsed_time: self.stats.elapsed_time,
            agents: self.agents.len(),
            security: self.channel.stats,
            breaker: self.breaker.state(),
            breaker_window_failures: self.breaker.failure_count(),
            near_misses: self.stats.near_misses,
            late_yields: self.stats.late_yields,
            successful_preemptions: self.stats.successful_preemptions,
            collisions_prevented: self.stats.collisions_prevented,
            llm_calls: self.stats.llm_calls,
            llm_failures: self.stats.llm_failures,
            decision_faults: self.stats.decision_faults,
            despawns: self.stats.despawns,
            cooperation_score: self.stats.cooperation_score(&self.config),
        }
    }
}

#[cfg(test)]
#[path = "world_tests.rs"]
mod tests;
