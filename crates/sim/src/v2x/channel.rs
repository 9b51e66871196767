// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated broadcast channel.
//!
//! `publish` runs the full security filter (MAC, ranges, staleness, rate
//! limit) and keeps only the latest accepted message per agent. Readers
//! never see the live slots; they get an immutable [`Snapshot`] captured at
//! the tick boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use ring::hmac;

use crate::error::SimError;
use crate::v2x::limiter::TokenBucket;
use crate::v2x::message::{channel_key, V2xMessage};

/// Rejection and acceptance counters surfaced in telemetry.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SecurityStats {
    pub accepted: u64,
    pub invalid_mac: u64,
    pub invalid_range: u64,
    pub stale: u64,
    pub rate_limited: u64,
}

impl SecurityStats {
    pub fn rejected(&self) -> u64 {
        self.invalid_mac + self.invalid_range + self.stale + self.rate_limited
    }

    fn record(&mut self, err: SimError) {
        match err {
            SimError::InvalidMac => self.invalid_mac += 1,
            SimError::InvalidRange => self.invalid_range += 1,
            SimError::StaleMessage => self.stale += 1,
            SimError::RateLimited => self.rate_limited += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    msg: V2xMessage,
    /// Sim time the last message from this agent was accepted.
    accepted_at: f64,
}

/// Immutable per-tick view of the channel, shared by every reader.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f64,
    agents: IndexMap<String, V2xMessage>,
}

impl Snapshot {
    pub fn get(&self, agent_id: &str) -> Option<&V2xMessage> {
        self.agents.get(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V2xMessage)> {
        self.agents.iter()
    }

    pub fn messages(&self) -> impl Iterator<Item = &V2xMessage> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// The signed broadcast bus.
pub struct V2xChannel {
    key: hmac::Key,
    v_max: f64,
    msg_rate: f64,
    stale_after: f64,
    liveness_timeout: f64,
    history_cap: usize,
    slots: IndexMap<String, Slot>,
    buckets: HashMap<String, TokenBucket>,
    history: VecDeque<V2xMessage>,
    pub stats: SecurityStats,
}

impl V2xChannel {
    pub fn new(
        secret: &str,
        v_max: f64,
        msg_rate: f64,
        stale_after: f64,
        liveness_timeout: f64,
        history_cap: usize,
    ) -> Self {
        Self {
            key: channel_key(secret),
            v_max,
            msg_rate,
            stale_after,
            liveness_timeout,
            history_cap,
            slots: IndexMap::new(),
            buckets: HashMap::new(),
            history: VecDeque::new(),
            stats: SecurityStats::default(),
        }
    }

    /// The channel's signing key, for producers sharing the process-global
    /// secret.
    pub fn signing_key(&self) -> &hmac::Key {
        &self.key
    }

    /// Validate and accept a message. On success the sender's liveness stamp
    /// updates and the message replaces any prior one from the same agent.
    pub fn publish(&mut self, msg: V2xMessage, now: f64) -> Result<(), SimError> {
        let result = self.admit(&msg, now);
        match result {
            Ok(()) => {
                self.stats.accepted += 1;
                if self.history.len() == self.history_cap {
                    self.history.pop_front();
                }
                self.history.push_back(msg.clone());
                self.slots.insert(msg.agent_id.clone(), Slot { msg, accepted_at: now });
                Ok(())
            }
            Err(err) => {
                debug_assert!(err.is_publish_rejection());
                self.stats.record(err);
                Err(err)
            }
        }
    }

    fn admit(&mut self, msg: &V2xMessage, now: f64) -> Result<(), SimError> {
        if !msg.verify(&self.key) {
            return Err(SimError::InvalidMac);
        }
        msg.validate_ranges(self.v_max)?;

        // Timestamps must strictly advance within an agent and stay fresh.
        if let Some(slot) = self.slots.get(&msg.agent_id) {
            if msg.timestamp <= slot.msg.timestamp {
                return Err(SimError::StaleMessage);
            }
        }
        if now - msg.timestamp > self.stale_after {
            return Err(SimError::StaleMessage);
        }

        let bucket = self
            .buckets
            .entry(msg.agent_id.clone())
            .or_insert_with(|| TokenBucket::new(self.msg_rate, now));
        if !bucket.try_take(now) {
            return Err(SimError::RateLimited);
        }
        Ok(())
    }

    /// Capture the tick-boundary snapshot: prune silent agents, then freeze
    /// the latest message per agent in key order (publish order within the
    /// tick is irrelevant to readers).
    pub fn capture_snapshot(&mut self, tick: u64, time: f64) -> Arc<Snapshot> {
        let deadline = time - self.liveness_timeout;
        self.slots.retain(|_, slot| slot.accepted_at >= deadline);

        let mut agents: Vec<(String, V2xMessage)> =
            self.slots.iter().map(|(id, slot)| (id.clone(), slot.msg.clone())).collect();
        agents.sort_by(|a, b| a.0.cmp(&b.0));
        Arc::new(Snapshot { tick, time, agents: agents.into_iter().collect() })
    }

    /// The last `n` accepted messages, oldest first.
    pub fn history(&self, n: usize) -> Vec<V2xMessage> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Drop all channel state for a despawned agent.
    pub fn remove(&mut self, agent_id: &str) {
        self.slots.shift_remove(agent_id);
        self.buckets.remove(agent_id);
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
