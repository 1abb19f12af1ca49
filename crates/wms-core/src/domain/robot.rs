//! Robot position state machine.
//!
//! The warehouse has a single robot that carries items between the receiving
//! area and the three storage shelves.  This module only tracks *where* the
//! robot is and *whether it is busy*; the time a move takes is returned as a
//! [`MovePlan`] and waited out by the caller (the server does this with an
//! async sleep so no lock is held while the robot travels).
//!
//! ```text
//!          begin_move            arrive                finish
//!   IDLE ─────────────► MOVING ─────────► OPERATING ─────────► IDLE
//!                          │
//!                          └── arrive at RECEIVING ──────────► IDLE
//! ```
//!
//! The robot leaves MOVING for OPERATING under a single lock, so a move is
//! never observable as IDLE between travel and the stow/retrieve step.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::sector::SectorId;

/// What the robot is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    Moving,
    /// Stowing or retrieving an item at a storage shelf.
    Operating,
}

/// Result of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Success,
    AlreadyThere,
    /// Another move is in progress.  Moves are never queued.
    Busy,
    /// The robot cannot reach this sector (SHIPPING).
    InvalidTarget,
    /// The robot was released while this move was still travelling, so the
    /// arrival was not applied.
    Failure,
}

impl MoveOutcome {
    /// `Success` and `AlreadyThere` both count as success on the wire.
    pub fn is_success(self) -> bool {
        matches!(self, MoveOutcome::Success | MoveOutcome::AlreadyThere)
    }
}

/// Durations used to simulate motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotTimings {
    /// Time per distance unit in the travel table.
    pub move_unit: Duration,
    /// Travel time for pairs missing from the table.
    pub default_move: Duration,
    /// Time spent stowing/retrieving at a storage shelf.
    pub operate: Duration,
}

impl Default for RobotTimings {
    fn default() -> Self {
        Self {
            move_unit: Duration::from_millis(500),
            default_move: Duration::from_millis(1000),
            operate: Duration::from_millis(300),
        }
    }
}

/// An accepted move, returned by [`Robot::begin_move`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePlan {
    pub from: SectorId,
    pub to: SectorId,
    pub travel: Duration,
    /// `Some` when the robot must stow/retrieve after arriving.
    pub operate: Option<Duration>,
}

/// Symmetric distance table, in move units.
const DISTANCES: [(SectorId, SectorId, u32); 6] = [
    (SectorId::Receiving, SectorId::RedStorage, 1),
    (SectorId::Receiving, SectorId::GreenStorage, 2),
    (SectorId::Receiving, SectorId::YellowStorage, 3),
    (SectorId::RedStorage, SectorId::GreenStorage, 1),
    (SectorId::GreenStorage, SectorId::YellowStorage, 1),
    (SectorId::RedStorage, SectorId::YellowStorage, 2),
];

/// Distance between two sectors in move units, regardless of direction.
pub fn distance_units(a: SectorId, b: SectorId) -> Option<u32> {
    DISTANCES
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|&(_, _, d)| d)
}

#[derive(Debug, Clone, Copy)]
struct RobotState {
    status: RobotStatus,
    location: SectorId,
}

/// The singleton robot.  Starts IDLE at RECEIVING.
#[derive(Debug)]
pub struct Robot {
    state: Mutex<RobotState>,
    timings: RobotTimings,
}

impl Robot {
    pub fn new(timings: RobotTimings) -> Self {
        Self {
            state: Mutex::new(RobotState {
                status: RobotStatus::Idle,
                location: SectorId::Receiving,
            }),
            timings,
        }
    }

    // Two `Copy` fields cannot be left torn by a panicking holder, so a
    // poisoned lock is recovered rather than reported.
    fn lock(&self) -> MutexGuard<'_, RobotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timings(&self) -> RobotTimings {
        self.timings
    }

    pub fn status(&self) -> RobotStatus {
        self.lock().status
    }

    pub fn location(&self) -> SectorId {
        self.lock().location
    }

    /// Travel time between two sectors.
    pub fn travel_time(&self, from: SectorId, to: SectorId) -> Duration {
        match distance_units(from, to) {
            Some(units) => self.timings.move_unit * units,
            None => self.timings.default_move,
        }
    }

    /// Starts a move toward `target`.
    ///
    /// On success the robot is MOVING and the caller must wait out
    /// [`MovePlan::travel`] and then call [`Robot::arrive`].
    ///
    /// # Errors
    ///
    /// - [`MoveOutcome::Busy`] while MOVING or OPERATING (no state change).
    /// - [`MoveOutcome::InvalidTarget`] for SHIPPING.
    /// - [`MoveOutcome::AlreadyThere`] if the robot is already at `target`.
    pub fn begin_move(&self, target: SectorId) -> Result<MovePlan, MoveOutcome> {
        let mut state = self.lock();
        if state.status != RobotStatus::Idle {
            return Err(MoveOutcome::Busy);
        }
        if target == SectorId::Shipping {
            return Err(MoveOutcome::InvalidTarget);
        }
        if target == state.location {
            return Err(MoveOutcome::AlreadyThere);
        }

        let plan = MovePlan {
            from: state.location,
            to: target,
            travel: self.travel_time(state.location, target),
            operate: (target != SectorId::Receiving).then_some(self.timings.operate),
        };
        state.status = RobotStatus::Moving;
        Ok(plan)
    }

    /// Completes the travel part of `plan`.
    ///
    /// The robot is at `plan.to` and goes straight to OPERATING when the plan
    /// has a stow/retrieve step, IDLE otherwise.  Returns
    /// [`MoveOutcome::Failure`] without touching the state if the robot is no
    /// longer MOVING.
    pub fn arrive(&self, plan: &MovePlan) -> MoveOutcome {
        let mut state = self.lock();
        if state.status != RobotStatus::Moving {
            return MoveOutcome::Failure;
        }
        state.location = plan.to;
        state.status = if plan.operate.is_some() {
            RobotStatus::Operating
        } else {
            RobotStatus::Idle
        };
        MoveOutcome::Success
    }

    /// Returns the robot to IDLE without moving it.
    pub fn finish(&self) {
        self.lock().status = RobotStatus::Idle;
    }
}

impl Default for Robot {
    fn default() -> Self {
        Self::new(RobotTimings::default())
    }
}
