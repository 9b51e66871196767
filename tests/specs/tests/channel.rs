// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel and wire-format properties: HMAC integrity under arbitrary
//! payloads and bit flips, snapshot determinism under publish reordering,
//! and the exact boundary behaviors of the security filter.

use proptest::prelude::*;

use crossway::error::SimError;
use crossway::test_support::{base_message, test_channel};
use crossway::v2x::message::channel_key;

fn arb_payload() -> impl Strategy<Value = (String, f64, f64, f64, f64, f64)> {
    (
        "[a-z]{1,8}-[0-9]{1,4}",
        -1000.0..1000.0f64,
        -1000.0..1000.0f64,
        0.0..25.0f64,
        0.0..360.0f64,
        0.0..1.0e6f64,
    )
        .prop_map(|(id, x, y, v, theta, ts)| {
            // theta = 360.0 is out of range by contract; nudge inside.
            (id, x, y, v, theta.min(359.999), ts)
        })
}

proptest! {
    /// `verify(sign(payload, k), k)` holds for arbitrary payloads.
    #[test]
    fn sign_verify_round_trips((id, x, y, v, theta, ts) in arb_payload()) {
        let key = channel_key("prop-key");
        let mut msg = base_message(&id);
        msg.x = x;
        msg.y = y;
        msg.v = v;
        msg.theta = theta;
        msg.timestamp = ts;
        msg.sign(&key);
        prop_assert!(msg.verify(&key));
    }

    /// Any perturbation of a numeric payload field breaks the MAC.
    #[test]
    fn payload_perturbation_breaks_the_mac(
        (id, x, y, v, theta, ts) in arb_payload(),
        field in 0usize..5,
        delta in prop::sample::select(vec![1.0e-6, 0.5, -0.25, 1000.0]),
    ) {
        let key = channel_key("prop-key");
        let mut msg = base_message(&id);
        msg.x = x;
        msg.y = y;
        msg.v = v;
        msg.theta = theta;
        msg.timestamp = ts;
        msg.sign(&key);

        match field {
            0 => msg.x += delta,
            1 => msg.y += delta,
            2 => msg.v += delta,
            3 => msg.theta += delta,
            _ => msg.timestamp += delta,
        }
        prop_assert!(!msg.verify(&key));
    }

    /// Flipping any single bit of any MAC nibble breaks verification.
    #[test]
    fn mac_bit_flip_breaks_verification(
        (id, x, y, v, theta, ts) in arb_payload(),
        nibble in 0usize..64,
        bit in 0u8..4,
    ) {
        let key = channel_key("prop-key");
        let mut msg = base_message(&id);
        msg.x = x;
        msg.y = y;
        msg.v = v;
        msg.theta = theta;
        msg.timestamp = ts;
        msg.sign(&key);

        let mut chars: Vec<char> = msg.mac.chars().collect();
        prop_assume!(nibble < chars.len());
        let value = chars[nibble].to_digit(16).unwrap() ^ (1 << bit);
        chars[nibble] = char::from_digit(value, 16).unwrap();
        msg.mac = chars.into_iter().collect();
        prop_assert!(!msg.verify(&key));
    }

    /// Snapshot content is independent of publish order within a tick.
    #[test]
    fn snapshot_is_publish_order_independent(
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let agents = ["veh-a", "veh-b", "veh-c", "veh-d", "veh-e", "veh-f"];

        let snapshot_for = |sequence: &[usize]| {
            let mut channel = test_channel();
            let key = channel.signing_key().clone();
            for &idx in sequence {
                let mut msg = base_message(agents[idx]);
                msg.x = idx as f64 * 10.0;
                msg.sign(&key);
                channel.publish(msg, 1.0).unwrap();
            }
            let snapshot = channel.capture_snapshot(1, 1.0);
            snapshot
                .iter()
                .map(|(id, m)| (id.clone(), m.x))
                .collect::<Vec<_>>()
        };

        let baseline: Vec<usize> = (0..6).collect();
        prop_assert_eq!(snapshot_for(&baseline), snapshot_for(&order));
    }
}

#[test]
fn timestamp_epsilon_boundary() {
    let mut channel = test_channel();
    let key = channel.signing_key().clone();

    let mut first = base_message("veh-1");
    first.timestamp = 2.0;
    first.sign(&key);
    assert_eq!(channel.publish(first, 2.0), Ok(()));

    // Exactly the previous timestamp: rejected.
    let mut same = base_message("veh-1");
    same.timestamp = 2.0;
    same.sign(&key);
    assert_eq!(channel.publish(same, 2.0), Err(SimError::StaleMessage));

    // The smallest representable step forward: accepted.
    let mut next = base_message("veh-1");
    next.timestamp = 2.0 + f64::EPSILON * 2.0;
    next.sign(&key);
    assert_eq!(channel.publish(next, 2.0), Ok(()));
}

#[test]
fn age_boundary_is_exactly_five_seconds() {
    let mut channel = test_channel();
    let key = channel.signing_key().clone();

    // Exactly 5 s old: still fresh.
    let mut edge = base_message("veh-1");
    edge.timestamp = 1.0;
    edge.sign(&key);
    assert_eq!(channel.publish(edge, 6.0), Ok(()));

    // Just past 5 s: stale.
    let mut old = base_message("veh-2");
    old.timestamp = 1.0;
    old.sign(&key);
    assert_eq!(channel.publish(old, 6.0 + 1e-9), Err(SimError::StaleMessage));
}
