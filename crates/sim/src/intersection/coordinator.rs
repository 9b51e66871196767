// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-intersection occupancy tracking and one-at-a-time passage
//! arbitration.
//!
//! Agents join an arrival queue when they close within the arrival distance
//! of the stop line. Uncontrolled intersections grant passage to the
//! maximal non-conflicting prefix-respecting set; controlled intersections
//! defer to their light. Occupancy is recomputed from positions each tick,
//! so leaving the center box clears an agent automatically.

use std::collections::{BTreeSet, HashMap};

use crate::agent::Intent;
use crate::error::SimError;
use crate::intersection::light::{Axis, TrafficLight};

/// Compass side an agent approaches from, derived from its travel heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachDir {
    North,
    South,
    East,
    West,
}

impl ApproachDir {
    /// Bucket a travel heading (degrees, 0 = +x = east) into the side the
    /// vehicle comes from.
    pub fn from_heading(theta: f64) -> Self {
        let theta = theta.rem_euclid(360.0);
        if (45.0..135.0).contains(&theta) {
            Self::South // north-bound
        } else if (135.0..225.0).contains(&theta) {
            Self::East // west-bound
        } else if (225.0..315.0).contains(&theta) {
            Self::North // south-bound
        } else {
            Self::West // east-bound
        }
    }

    pub fn axis(&self) -> Axis {
        match self {
            Self::North | Self::South => Axis::Ns,
            Self::East | Self::West => Axis::Ew,
        }
    }

    fn opposite(&self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }
}

/// Whether two planned paths through the center box cross.
///
/// Followers from the same side never conflict. Opposite sides conflict
/// only when a left turn crosses oncoming through traffic. Perpendicular
/// sides conflict unless both vehicles turn right.
pub fn paths_conflict(a: (ApproachDir, Intent), b: (ApproachDir, Intent)) -> bool {
    let (dir_a, intent_a) = a;
    let (dir_b, intent_b) = b;
    if dir_a == dir_b {
        return false;
    }
    if dir_a == dir_b.opposite() {
        return matches!(
            (intent_a, intent_b),
            (Intent::Left, Intent::Through) | (Intent::Through, Intent::Left)
        );
    }
    !(intent_a == Intent::Right && intent_b == Intent::Right)
}

/// One tick's view of an agent, built by the tick loop from live state.
#[derive(Debug, Clone)]
pub struct Approach {
    pub agent_id: String,
    pub position: (f64, f64),
    pub heading: f64,
    pub intent: Intent,
    pub is_emergency: bool,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    agent_id: String,
    arrival_tick: u64,
    dir: ApproachDir,
    intent: Intent,
}

/// A single intersection with its queue, occupancy, and optional light.
#[derive(Debug)]
pub struct Intersection {
    pub id: String,
    pub center: (f64, f64),
    pub controlled: bool,
    pub light: Option<TrafficLight>,
    pub occupancy: BTreeSet<String>,
    queue: Vec<QueueEntry>,
    /// Agents currently granted passage (queued or already inside).
    grants: BTreeSet<String>,
    /// Last observed path (side, intent) of agents near this intersection.
    paths: HashMap<String, (ApproachDir, Intent)>,
}

impl Intersection {
    pub fn new(id: impl Into<String>, center: (f64, f64), light: Option<TrafficLight>) -> Self {
        Self {
            id: id.into(),
            controlled: light.is_some(),
            center,
            light,
            occupancy: BTreeSet::new(),
            queue: Vec::new(),
            grants: BTreeSet::new(),
            paths: HashMap::new(),
        }
    }

    pub fn contains(&self, position: (f64, f64), box_half: f64) -> bool {
        (position.0 - self.center.0).abs() <= box_half
            && (position.1 - self.center.1).abs() <= box_half
    }

    pub fn is_queued(&self, agent_id: &str) -> bool {
        self.queue.iter().any(|e| e.agent_id == agent_id)
    }

    pub fn is_granted(&self, agent_id: &str) -> bool {
        self.grants.contains(agent_id)
    }

    /// Queue order: arrival tick, then agent id.
    pub fn queue_order(&self) -> Vec<String> {
        self.queue.iter().map(|e| e.agent_id.clone()).collect()
    }

    fn known_path(&self, agent_id: &str) -> Option<(ApproachDir, Intent)> {
        self.queue
            .iter()
            .find(|e| e.agent_id == agent_id)
            .map(|e| (e.dir, e.intent))
            .or_else(|| self.paths.get(agent_id).copied())
    }

    fn update(
        &mut self,
        approaches: &HashMap<String, Approach>,
        tick: u64,
        d_arrive: f64,
        box_half: f64,
    ) -> Result<(), SimError> {
        // Remember paths of everyone near this intersection; occupants may
        // no longer be queued when we check the crossing invariant.
        self.paths.retain(|id, _| approaches.contains_key(id));
        for a in approaches.values() {
            let dist = distance(a.position, self.center);
            if dist <= d_arrive + box_half {
                self.paths
                    .insert(a.agent_id.clone(), (ApproachDir::from_heading(a.heading), a.intent));
            }
        }

        // Occupancy is a pure function of positions.
        self.occupancy = approaches
            .values()
            .filter(|a| self.contains(a.position, box_half))
            .map(|a| a.agent_id.clone())
            .collect();

        // Drop queue entries for agents now inside, despawned, out of
        // range, or heading away.
        self.queue.retain(|e| {
            let Some(a) = approaches.get(&e.agent_id) else {
                return false;
            };
            if self.occupancy.contains(&e.agent_id) {
                return false;
            }
            let dist = distance(a.position, self.center);
            dist <= d_arrive + box_half && heading_toward(a, self.center)
        });

        // Grants persist while the holder is queued or inside the box.
        self.grants
            .retain(|id| self.occupancy.contains(id) || self.queue.iter().any(|e| &e.agent_id == id));

        // New arrivals join the queue.
        for a in approaches.values() {
            if self.occupancy.contains(&a.agent_id) || self.is_queued(&a.agent_id) {
                continue;
            }
            let dist = distance(a.position, self.center);
            if dist <= d_arrive + box_half && dist > box_half && heading_toward(a, self.center) {
                self.queue.push(QueueEntry {
                    agent_id: a.agent_id.clone(),
                    arrival_tick: tick,
                    dir: ApproachDir::from_heading(a.heading),
                    intent: a.intent,
                });
            }
        }
        self.queue.sort_by(|a, b| {
            a.arrival_tick.cmp(&b.arrival_tick).then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        if self.controlled {
            self.grant_by_light();
        } else {
            self.grant_uncontrolled()?;
        }
        Ok(())
    }

    fn grant_by_light(&mut self) {
        let Some(light) = &self.light else {
            return;
        };
        for entry in &self.queue {
            if light.is_green(entry.dir.axis()) {
                self.grants.insert(entry.agent_id.clone());
            } else {
                self.grants.remove(&entry.agent_id);
            }
        }
    }

    fn grant_uncontrolled(&mut self) -> Result<(), SimError> {
        // Paths of everything currently inside the box.
        let occupant_paths: Vec<(ApproachDir, Intent)> =
            self.occupancy.iter().filter_map(|id| self.known_path(id)).collect();

        // Crossing invariant: no two granted occupants on conflicting
        // paths. Rogue entrants (never granted) are an adversary's doing,
        // not a coordinator fault.
        let granted_occupants: Vec<(ApproachDir, Intent)> = self
            .occupancy
            .iter()
            .filter(|id| self.grants.contains(*id))
            .filter_map(|id| self.known_path(id))
            .collect();
        for (i, a) in granted_occupants.iter().enumerate() {
            for b in granted_occupants.iter().skip(i + 1) {
                if paths_conflict(*a, *b) {
                    return Err(SimError::CoordinatorInvariantViolation);
                }
            }
        }

        // Grant the maximal set that respects queue order: an entry is
        // admitted when it conflicts with no occupant, no granted entry,
        // and no still-waiting entry ahead of it.
        let mut granted_paths: Vec<(ApproachDir, Intent)> = self
            .queue
            .iter()
            .filter(|e| self.grants.contains(&e.agent_id))
            .map(|e| (e.dir, e.intent))
            .collect();
        let mut blocked_ahead: Vec<(ApproachDir, Intent)> = Vec::new();
        let mut newly_granted = Vec::new();

        for entry in &self.queue {
            if self.grants.contains(&entry.agent_id) {
                continue;
            }
            let path = (entry.dir, entry.intent);
            let conflicts = occupant_paths.iter().any(|p| paths_conflict(*p, path))
                || granted_paths.iter().any(|p| paths_conflict(*p, path))
                || blocked_ahead.iter().any(|p| paths_conflict(*p, path));
            if conflicts {
                blocked_ahead.push(path);
            } else {
                granted_paths.push(path);
                newly_granted.push(entry.agent_id.clone());
            }
        }
        self.grants.extend(newly_granted);
        Ok(())
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn heading_toward(a: &Approach, center: (f64, f64)) -> bool {
    let rad = a.heading.to_radians();
    let to_center = (center.0 - a.position.0, center.1 - a.position.1);
    rad.cos() * to_center.0 + rad.sin() * to_center.1 > 0.0
}

/// All intersections on the map, stepped together each tick.
#[derive(Debug, Default)]
pub struct Coordinator {
    pub intersections: Vec<Intersection>,
}

impl Coordinator {
    pub fn new(intersections: Vec<Intersection>) -> Self {
        Self { intersections }
    }

    /// Update queues, occupancy, and grants for every intersection.
    ///
    /// Returns the per-agent grant map (present only for agents currently
    /// queued at, or inside, some intersection).
    pub fn update(
        &mut self,
        approaches: &[Approach],
        tick: u64,
        d_arrive: f64,
        box_half: f64,
    ) -> Result<HashMap<String, bool>, SimError> {
        let by_id: HashMap<String, Approach> =
            approaches.iter().map(|a| (a.agent_id.clone(), a.clone())).collect();

        let mut grants = HashMap::new();
        for intersection in &mut self.intersections {
            intersection.update(&by_id, tick, d_arrive, box_half)?;
            for entry in &intersection.queue {
                grants.insert(
                    entry.agent_id.clone(),
                    intersection.grants.contains(&entry.agent_id),
                );
            }
            for id in &intersection.occupancy {
                grants.insert(id.clone(), true);
            }
        }
        Ok(grants)
    }

    /// The intersection nearest to a point, if any.
    pub fn nearest(&self, position: (f64, f64)) -> Option<&Intersection> {
        self.intersections.iter().min_by(|a, b| {
            distance(position, a.center)
                .partial_cmp(&distance(position, b.center))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn nearest_mut(&mut self, position: (f64, f64)) -> Option<&mut Intersection> {
        self.intersections.iter_mut().min_by(|a, b| {
            distance(position, a.center)
                .partial_cmp(&distance(position, b.center))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
