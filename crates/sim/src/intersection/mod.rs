// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Infrastructure: traffic lights, per-intersection coordination, and the
//! city grid layout.

pub mod coordinator;
pub mod grid;
pub mod light;

pub use coordinator::{Approach, Coordinator, Intersection};
pub use grid::Grid;
pub use light::{Axis, TrafficLight, TrafficPhase};
