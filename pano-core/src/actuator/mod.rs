//! Hardware-facing actuators and the vocabulary they share.
//!
//! Each actuator owns a link (shared state plus a request channel and an
//! outcome barrier) and a driver. The sequencer only ever talks to the link;
//! the actuator task turns requests into driver calls, verifies the hardware
//! reports, and retries within a [`RetryBudget`].

pub mod aircraft;
pub mod camera;
pub mod gimbal;

use core::fmt;
use core::time::Duration;

/// Extra attempts allowed after the first one for every actuator command.
pub const MAX_RETRIES: u8 = 5;

/// Per-actuator control status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerStatus {
    Normal,
    /// Hardware reported a fault. Already surfaced; in-flight work exits silently.
    Error,
    /// Stop requested. Consumed by the next delay or verify step.
    Stopping,
}

impl ControllerStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ControllerStatus::Normal => "normal",
            ControllerStatus::Error => "error",
            ControllerStatus::Stopping => "stopping",
        }
    }

    /// Marks a normal status as stopping; errors are left untouched.
    #[must_use]
    pub const fn stop_requested(self) -> Self {
        match self {
            ControllerStatus::Normal => ControllerStatus::Stopping,
            other => other,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an in-flight command stopped early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Interruption {
    /// A stop was requested; the actuator reports "stopped".
    Stopped,
    /// A fault is already reported; the actuator exits without an outcome.
    Silent,
}

/// Checks the status at a cancellation point.
pub(crate) const fn interruption(status: ControllerStatus) -> Option<Interruption> {
    match status {
        ControllerStatus::Normal => None,
        ControllerStatus::Stopping => Some(Interruption::Stopped),
        ControllerStatus::Error => Some(Interruption::Silent),
    }
}

/// Rotation axes of a gimbal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Axis {
    Pitch,
    Yaw,
    Roll,
}

impl Axis {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Axis::Pitch => "Pitch",
            Axis::Yaw => "Yaw",
            Axis::Roll => "Roll",
        }
    }
}

/// Movement range reported by the hardware for one axis.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AxisCapability {
    pub adjustable: bool,
    pub min: i16,
    pub max: i16,
}

impl AxisCapability {
    #[must_use]
    pub const fn range(min: i16, max: i16) -> Self {
        Self {
            adjustable: true,
            min,
            max,
        }
    }

    /// An axis the hardware cannot move. Every request is in range and converged.
    #[must_use]
    pub const fn fixed() -> Self {
        Self {
            adjustable: false,
            min: 0,
            max: 0,
        }
    }

    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        !self.adjustable || (f32::from(self.min)..=f32::from(self.max)).contains(&value)
    }

    /// Returns `true` when `observed` is within `tolerance` of `target`.
    #[must_use]
    pub fn converged(&self, target: f32, observed: f32, tolerance: f32) -> bool {
        if !self.adjustable {
            return true;
        }
        let offset = crate::angles::shortest_angular_distance(target, observed);
        (-tolerance..=tolerance).contains(&offset)
    }
}

/// Capability report for the three gimbal axes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GimbalCapabilities {
    pub pitch: AxisCapability,
    pub yaw: AxisCapability,
    pub roll: AxisCapability,
}

impl GimbalCapabilities {
    #[must_use]
    pub const fn axis(&self, axis: Axis) -> AxisCapability {
        match axis {
            Axis::Pitch => self.pitch,
            Axis::Yaw => self.yaw,
            Axis::Roll => self.roll,
        }
    }
}

/// Gimbal orientation in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Attitude {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Attitude {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    #[must_use]
    pub const fn axis(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Pitch => self.pitch,
            Axis::Yaw => self.yaw,
            Axis::Roll => self.roll,
        }
    }

    #[must_use]
    pub const fn with_axis(mut self, axis: Axis, value: f32) -> Self {
        match axis {
            Axis::Pitch => self.pitch = value,
            Axis::Yaw => self.yaw = value,
            Axis::Roll => self.roll = value,
        }
        self
    }
}

/// Bounded retry counter for one command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryBudget {
    retries: u8,
    max_retries: u8,
}

impl RetryBudget {
    #[must_use]
    pub const fn new(max_retries: u8) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    /// Retries consumed so far, always within `0..=max_retries`.
    #[must_use]
    pub const fn retries(&self) -> u8 {
        self.retries
    }

    /// Consumes one retry; returns `false` once the budget is exhausted.
    pub fn try_retry(&mut self) -> bool {
        if self.retries >= self.max_retries {
            return false;
        }
        self.retries += 1;
        true
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(MAX_RETRIES)
    }
}

/// Extra settle time added to the driver's reported completion time.
pub const SETTLE_MARGIN: Duration = Duration::from_millis(500);
