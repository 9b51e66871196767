// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed V2X broadcast channel: message wire format, per-agent rate
//! limiting, and the validated per-tick snapshot every reader shares.

pub mod channel;
pub mod limiter;
pub mod message;

pub use channel::{SecurityStats, Snapshot, V2xChannel};
pub use message::V2xMessage;
