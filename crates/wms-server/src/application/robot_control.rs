//! RobotController: runs robot moves and actuator self-tests in simulated time.
//!
//! The core [`Robot`] only flips states.  This controller adds the waiting:
//! it sleeps for the planned travel and stow/retrieve durations *without*
//! holding the robot's lock, so status queries and other connections never
//! wait on a moving robot.  A second move arriving meanwhile sees MOVING or
//! OPERATING and is rejected as busy.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use wms_core::{ItemColor, MoveOutcome, Robot, RobotTimings, SectorId};

/// Hardware that can be exercised by a self-test command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Conveyor,
    AgvServo,
    StorageServo(ItemColor),
}

/// Releases the robot if a move does not run to completion.
///
/// Dropping the move future (client gone, task aborted) or a panic between
/// `begin_move` and the final `finish` would otherwise leave the robot stuck
/// in MOVING or OPERATING.
struct MotionGuard<'a> {
    robot: &'a Robot,
    completed: bool,
}

impl<'a> MotionGuard<'a> {
    fn new(robot: &'a Robot) -> Self {
        Self {
            robot,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for MotionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.robot.finish();
            warn!(
                location = %self.robot.location(),
                "robot motion interrupted; robot released"
            );
        }
    }
}

/// Owns the warehouse robot and the timing of everything it does.
#[derive(Debug)]
pub struct RobotController {
    robot: Robot,
    actuator_test: Duration,
}

impl RobotController {
    pub fn new(timings: RobotTimings, actuator_test: Duration) -> Self {
        Self {
            robot: Robot::new(timings),
            actuator_test,
        }
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    /// Moves the robot to `target` and, for storage shelves, performs the
    /// stow/retrieve step.
    ///
    /// Returns immediately with `Busy`, `InvalidTarget` or `AlreadyThere`
    /// when the move is not started.  The robot is IDLE whenever this future
    /// completes or is dropped.
    pub async fn move_to(&self, target: SectorId) -> MoveOutcome {
        let plan = match self.robot.begin_move(target) {
            Ok(plan) => plan,
            Err(outcome) => {
                debug!(%target, ?outcome, "robot move not started");
                return outcome;
            }
        };
        let guard = MotionGuard::new(&self.robot);

        info!(from = %plan.from, to = %plan.to, travel_ms = plan.travel.as_millis() as u64, "robot moving");
        sleep(plan.travel).await;
        if self.robot.arrive(&plan) == MoveOutcome::Failure {
            guard.complete();
            warn!(to = %plan.to, "robot released during travel; arrival dropped");
            return MoveOutcome::Failure;
        }

        // Already OPERATING here when the plan has a stow/retrieve step.
        if let Some(operate) = plan.operate {
            sleep(operate).await;
            self.robot.finish();
        }

        guard.complete();
        info!(location = %plan.to, "robot arrived");
        MoveOutcome::Success
    }

    /// Sends the robot back to RECEIVING.
    pub async fn return_home(&self) -> MoveOutcome {
        self.move_to(SectorId::Receiving).await
    }

    /// Simulated self-test: waits the configured test duration.
    pub async fn run_actuator_test(&self, actuator: Actuator) {
        info!(?actuator, "actuator self-test started");
        sleep(self.actuator_test).await;
        info!(?actuator, "actuator self-test passed");
    }
}
