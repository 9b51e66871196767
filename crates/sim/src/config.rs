// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Configuration for the simulation kernel.
#[derive(Debug, Clone, clap::Args)]
pub struct SimConfig {
    /// Tick rate in Hz.
    #[arg(long, default_value_t = 20.0, env = "CROSSWAY_TICK_HZ")]
    pub tick_hz: f64,

    /// Hard ceiling on any broadcast speed value, in m/s.
    #[arg(long, default_value_t = 25.0, env = "CROSSWAY_V_MAX")]
    pub v_max: f64,

    /// Cruising speed limit for cooperative agents, in m/s.
    #[arg(long, default_value_t = 12.0, env = "CROSSWAY_SPEED_LIMIT")]
    pub speed_limit: f64,

    /// Per-agent broadcast budget in messages per second.
    #[arg(long, default_value_t = 20.0, env = "CROSSWAY_MSG_RATE")]
    pub msg_rate: f64,

    /// Reject messages older than this, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "CROSSWAY_STALE_AFTER_MS")]
    pub stale_after_ms: u64,

    /// Prune agents with no accepted message for this long, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "CROSSWAY_LIVENESS_TIMEOUT_MS")]
    pub liveness_timeout_ms: u64,

    /// Accepted-message history capacity.
    #[arg(long, default_value_t = 512, env = "CROSSWAY_HISTORY_CAP")]
    pub history_cap: usize,

    /// Spatial prefilter radius for the collision detector, in meters.
    #[arg(long, default_value_t = 60.0, env = "CROSSWAY_PREFILTER_RADIUS")]
    pub prefilter_radius: f64,

    /// Hitbox distance below which two agents count as colliding, in meters.
    #[arg(long, default_value_t = 2.5, env = "CROSSWAY_COLLISION_RADIUS")]
    pub collision_radius: f64,

    /// Perception radius for neighbor features, in meters.
    #[arg(long, default_value_t = 50.0, env = "CROSSWAY_OBS_RADIUS")]
    pub obs_radius: f64,

    /// Emergency preemption distance, in meters.
    #[arg(long, default_value_t = 40.0, env = "CROSSWAY_D_PRE")]
    pub d_pre: f64,

    /// Distance from the stop line at which an agent joins the arrival queue, in meters.
    #[arg(long, default_value_t = 25.0, env = "CROSSWAY_D_ARRIVE")]
    pub d_arrive: f64,

    /// Half-width of the intersection center box, in meters.
    #[arg(long, default_value_t = 8.0, env = "CROSSWAY_BOX_HALF")]
    pub box_half: f64,

    /// Distance behind which a trailing emergency triggers a pull-over, in meters.
    #[arg(long, default_value_t = 60.0, env = "CROSSWAY_EMERGENCY_DETECT_RANGE")]
    pub emergency_detect_range: f64,

    /// North-south green duration, in seconds.
    #[arg(long, default_value_t = 15.0, env = "CROSSWAY_NS_GREEN_SECS")]
    pub ns_green_secs: f64,

    /// East-west green duration, in seconds.
    #[arg(long, default_value_t = 15.0, env = "CROSSWAY_EW_GREEN_SECS")]
    pub ew_green_secs: f64,

    /// All-red interlock between greens, in seconds.
    #[arg(long, default_value_t = 2.0, env = "CROSSWAY_ALL_RED_SECS")]
    pub all_red_secs: f64,

    /// Emergency all-red hold before greening the emergency axis, in seconds.
    #[arg(long, default_value_t = 1.0, env = "CROSSWAY_PREEMPT_ALL_RED_SECS")]
    pub preempt_all_red_secs: f64,

    /// Extra green granted to a phase suppressed by preemption, in seconds.
    #[arg(long, default_value_t = 5.0, env = "CROSSWAY_STARVATION_CREDIT_SECS")]
    pub starvation_credit_secs: f64,

    /// Advisor call deadline, in milliseconds.
    #[arg(long, default_value_t = 800, env = "CROSSWAY_LLM_TIMEOUT_MS")]
    pub llm_timeout_ms: u64,

    /// Advisor failures within the window that open the breaker.
    #[arg(long, default_value_t = 5, env = "CROSSWAY_BREAKER_THRESHOLD")]
    pub breaker_threshold: u32,

    /// Breaker failure-counting window, in seconds.
    #[arg(long, default_value_t = 30.0, env = "CROSSWAY_BREAKER_WINDOW_SECS")]
    pub breaker_window_secs: f64,

    /// Breaker open-state cooldown, in seconds.
    #[arg(long, default_value_t = 30.0, env = "CROSSWAY_BREAKER_COOLDOWN_SECS")]
    pub breaker_cooldown_secs: f64,

    /// Decision worker pool size. 0 selects min(hardware parallelism, agent count).
    #[arg(long, default_value_t = 0, env = "CROSSWAY_WORKERS")]
    pub workers: usize,

    /// Background traffic population target.
    #[arg(long, default_value_t = 25, env = "CROSSWAY_POPULATION")]
    pub population: usize,

    /// Grid columns (city mode).
    #[arg(long, default_value_t = 5, env = "CROSSWAY_GRID_COLS")]
    pub grid_cols: usize,

    /// Grid rows (city mode).
    #[arg(long, default_value_t = 5, env = "CROSSWAY_GRID_ROWS")]
    pub grid_rows: usize,

    /// Grid spacing between intersections, in meters.
    #[arg(long, default_value_t = 80.0, env = "CROSSWAY_GRID_SPACING")]
    pub grid_spacing: f64,

    /// Consecutive decision faults before an agent is despawned.
    #[arg(long, default_value_t = 5, env = "CROSSWAY_MAX_CONSECUTIVE_FAULTS")]
    pub max_consecutive_faults: u32,

    /// RNG seed. Same seed plus same scenario reproduces the export stream.
    #[arg(long, env = "CROSSWAY_SEED")]
    pub seed: Option<u64>,

    /// Shared HMAC key for V2X message signing.
    #[arg(long, default_value = "crossway-dev-key", env = "CROSSWAY_HMAC_KEY")]
    pub hmac_key: String,

    /// LLM advisor endpoint URL. If unset, agents run on the adaptive rule alone.
    #[arg(long, env = "CROSSWAY_ADVISOR_URL")]
    pub advisor_url: Option<String>,

    /// Cooperation score weight per near miss.
    #[arg(long, default_value_t = 2.0, env = "CROSSWAY_NEAR_MISS_WEIGHT")]
    pub near_miss_weight: f64,

    /// Cooperation score weight per late yield.
    #[arg(long, default_value_t = 1.0, env = "CROSSWAY_LATE_YIELD_WEIGHT")]
    pub late_yield_weight: f64,

    /// Cooperation score bonus per successful preemption.
    #[arg(long, default_value_t = 0.5, env = "CROSSWAY_PREEMPTION_WEIGHT")]
    pub preemption_weight: f64,
}

impl SimConfig {
    /// Nominal tick period derived from the configured rate.
    pub fn nominal_dt(&self) -> f64 {
        1.0 / self.tick_hz.max(1.0)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.nominal_dt())
    }

    pub fn stale_after(&self) -> f64 {
        self.stale_after_ms as f64 / 1000.0
    }

    pub fn liveness_timeout(&self) -> f64 {
        self.liveness_timeout_ms as f64 / 1000.0
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    /// Effective worker pool size for `n` agents.
    pub fn worker_count(&self, agents: usize) -> usize {
        let hw = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        let cap = if self.workers == 0 { hw } else { self.workers };
        cap.min(agents).max(1)
    }
}

impl Default for SimConfig {
    // Kept in lockstep with the clap defaults above; used by tests and
    // embedded callers that never go through argument parsing.
    fn default() -> Self {
        Self {
            tick_hz: 20.0,
            v_max: 25.0,
            speed_limit: 12.0,
            msg_rate: 20.0,
            stale_after_ms: 5000,
            liveness_timeout_ms: 5000,
            history_cap: 512,
            prefilter_radius: 60.0,
            collision_radius: 2.5,
            obs_radius: 50.0,
            d_pre: 40.0,
            d_arrive: 25.0,
            box_half: 8.0,
            emergency_detect_range: 60.0,
            ns_green_secs: 15.0,
            ew_green_secs: 15.0,
            all_red_secs: 2.0,
            preempt_all_red_secs: 1.0,
            starvation_credit_secs: 5.0,
            llm_timeout_ms: 800,
            breaker_threshold: 5,
            breaker_window_secs: 30.0,
            breaker_cooldown_secs: 30.0,
            workers: 0,
            population: 25,
            grid_cols: 5,
            grid_rows: 5,
            grid_spacing: 80.0,
            max_consecutive_faults: 5,
            seed: None,
            hmac_key: "crossway-dev-key".into(),
            advisor_url: None,
            near_miss_weight: 2.0,
            late_yield_weight: 1.0,
            preemption_weight: 0.5,
        }
    }
}

/// Run mode selected at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// 5x5 grid with background traffic.
    City,
    /// Named scenario with a fixed cast of agents.
    Scenario,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::City => f.write_str("city"),
            Self::Scenario => f.write_str("scenario"),
        }
    }
}

/// Launch options for the headless binary.
#[derive(Debug, Clone, clap::Args)]
pub struct Launch {
    /// Run mode.
    #[arg(long, value_enum, default_value_t = Mode::City, env = "CROSSWAY_MODE")]
    pub mode: Mode,

    /// Scenario id (scenario mode).
    #[arg(long, env = "CROSSWAY_SCENARIO")]
    pub scenario: Option<String>,

    /// Stop after this many ticks. Unset runs until Ctrl-C.
    #[arg(long, env = "CROSSWAY_TICKS")]
    pub ticks: Option<u64>,

    /// Print an export document every N ticks (0 disables).
    #[arg(long, default_value_t = 20, env = "CROSSWAY_EXPORT_EVERY")]
    pub export_every: u64,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
