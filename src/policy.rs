//! Action selection and reward monitoring seams.
//!
//! The scheduler drives whatever policy is plugged in through
//! [`ActionSelector`]; between trainer round trips that policy is expected to
//! act on locally-held model state. [`RandomActionSelector`] is the built-in
//! baseline used before any trained model exists.

use crate::record::TimestepSnapshot;
use rand::Rng;

/// One action pair chosen for the upcoming timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub motion: i32,
    pub communication: i32,
}

/// Local policy consulted once per tick.
pub trait ActionSelector: Send {
    /// Chooses the next action from the just-published timestep.
    fn forward(&mut self, snapshot: &TimestepSnapshot) -> Action;

    /// True when the policy wants the current episode closed early.
    fn episode_done(&self) -> bool {
        false
    }

    /// True when the policy wants the whole trial terminated.
    fn trial_done(&self) -> bool {
        false
    }
}

/// Signals episode termination from observed sensor data, independently of
/// the policy. An aversive event (hard bump, tilt limit) typically ends the
/// episode so the trainer sees it promptly.
pub trait RewardMonitor: Send {
    fn episode_done(&mut self, snapshot: &TimestepSnapshot) -> bool;
}

/// Uniform random policy over small discrete action sets.
pub struct RandomActionSelector {
    motion_actions: i32,
    comm_actions: i32,
}

impl RandomActionSelector {
    pub fn new(motion_actions: i32, comm_actions: i32) -> Self {
        Self {
            motion_actions: motion_actions.max(1),
            comm_actions: comm_actions.max(1),
        }
    }
}

impl Default for RandomActionSelector {
    /// Five motion actions (stop, forward, back, left, right) and two
    /// communication actions (silent, beep).
    fn default() -> Self {
        Self::new(5, 2)
    }
}

impl ActionSelector for RandomActionSelector {
    fn forward(&mut self, _snapshot: &TimestepSnapshot) -> Action {
        let mut rng = rand::thread_rng();
        Action {
            motion: rng.gen_range(0..self.motion_actions),
            communication: rng.gen_range(0..self.comm_actions),
        }
    }
}

/// Ends the episode when measured tilt exceeds a fixed threshold. A tipped
/// robot cannot recover on its own, so keeping the episode open only delays
/// the trainer's view of the failure.
pub struct TiltMonitor {
    max_tilt_rad: f64,
}

impl TiltMonitor {
    pub fn new(max_tilt_rad: f64) -> Self {
        Self { max_tilt_rad }
    }
}

impl RewardMonitor for TiltMonitor {
    fn episode_done(&mut self, snapshot: &TimestepSnapshot) -> bool {
        snapshot
            .orientation
            .iter()
            .any(|s| s.tilt_rad.abs() > self.max_tilt_rad)
    }
}
