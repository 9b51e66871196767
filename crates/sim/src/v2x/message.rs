// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! V2X wire format and message authentication.
//!
//! The MAC covers the canonical serialization of the payload: every field
//! except `mac`, serialized as key-sorted UTF-8 JSON. Both sides must agree
//! on that byte string exactly, so canonicalization goes through a
//! `serde_json::Value` (whose object map is ordered by key) rather than the
//! struct's declaration order.

use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::agent::{Action, Intent};
use crate::collision::Risk;
use crate::error::SimError;

/// A single broadcast state message from one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V2xMessage {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub v: f64,
    pub theta: f64,
    pub intent: Intent,
    pub decision: Action,
    pub risk_level: Risk,
    pub is_emergency: bool,
    pub timestamp: f64,
    /// Hex HMAC-SHA256 over the canonical payload. Empty until signed.
    #[serde(default)]
    pub mac: String,
}

impl V2xMessage {
    /// Canonical payload bytes the MAC is computed over.
    pub fn canonical_payload(&self) -> Vec<u8> {
        let mut value = match serde_json::to_value(self) {
            Ok(v) => v,
            // Serialization of a plain struct with no map keys cannot fail;
            // fall back to an empty payload that will never verify.
            Err(_) => return Vec::new(),
        };
        if let Some(obj) = value.as_object_mut() {
            obj.remove("mac");
        }
        value.to_string().into_bytes()
    }

    /// Compute and attach the MAC.
    pub fn sign(&mut self, key: &hmac::Key) {
        let tag = hmac::sign(key, &self.canonical_payload());
        self.mac = hex_encode(tag.as_ref());
    }

    /// Verify the attached MAC against the canonical payload.
    pub fn verify(&self, key: &hmac::Key) -> bool {
        let Some(mac) = hex_decode(&self.mac) else {
            return false;
        };
        hmac::verify(key, &self.canonical_payload(), &mac).is_ok()
    }

    /// Validate numeric fields: finiteness plus the wire-contract ranges
    /// (`v ∈ [0, v_max]`, `theta ∈ [0, 360)`).
    pub fn validate_ranges(&self, v_max: f64) -> Result<(), SimError> {
        for field in [self.x, self.y, self.v, self.theta, self.timestamp] {
            if !field.is_finite() {
                return Err(SimError::InvalidRange);
            }
        }
        if self.v < 0.0 || self.v > v_max {
            return Err(SimError::InvalidRange);
        }
        if self.theta < 0.0 || self.theta >= 360.0 {
            return Err(SimError::InvalidRange);
        }
        Ok(())
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Velocity vector from heading and scalar speed.
    pub fn velocity(&self) -> (f64, f64) {
        let rad = self.theta.to_radians();
        (self.v * rad.cos(), self.v * rad.sin())
    }
}

/// Build an HMAC-SHA256 key from the shared secret.
pub fn channel_key(secret: &str) -> hmac::Key {
    hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
