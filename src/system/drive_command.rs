//! Drive Command Module
//!
//! Motion requests for a drive task running elsewhere. Commands go through an
//! embassy-sync Signal, so a newer request replaces one the drive task has not
//! picked up yet. Completion of each command is reported back on a second
//! Signal.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::drive::DEFAULT_MAX_EFFORT;

/// Enum representing drive commands
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveCommand {
    /// Drive `distance` cm holding the current heading
    Straight {
        distance: f32,
        max_effort: f32,
        timeout: Option<Duration>,
    },
    /// Turn `degrees` counterclockwise in place
    Turn {
        degrees: f32,
        max_effort: f32,
        timeout: Option<Duration>,
        use_attitude: bool,
    },
    /// Raw wheel efforts
    Effort { left: f32, right: f32 },
    /// Forward and turn components mixed into wheel efforts
    Arcade { straight: f32, turn: f32 },
    /// Hold wheel surface speeds in cm/s until the next command
    Speed { left: f32, right: f32 },
    /// Zero both wheels
    Stop,
}

impl DriveCommand {
    /// Straight drive at the default effort, without timeout.
    pub fn straight(distance: f32) -> Self {
        DriveCommand::Straight {
            distance,
            max_effort: DEFAULT_MAX_EFFORT,
            timeout: None,
        }
    }

    /// Turn at the default effort on the attitude heading, without timeout.
    pub fn turn(degrees: f32) -> Self {
        DriveCommand::Turn {
            degrees,
            max_effort: DEFAULT_MAX_EFFORT,
            timeout: None,
            use_attitude: true,
        }
    }

    /// Give up a straight or turn after `timeout`. Other commands are
    /// returned unchanged.
    pub fn with_timeout(self, limit: Duration) -> Self {
        match self {
            DriveCommand::Straight {
                distance, max_effort, ..
            } => DriveCommand::Straight {
                distance,
                max_effort,
                timeout: Some(limit),
            },
            DriveCommand::Turn {
                degrees,
                max_effort,
                use_attitude,
                ..
            } => DriveCommand::Turn {
                degrees,
                max_effort,
                timeout: Some(limit),
                use_attitude,
            },
            other => other,
        }
    }
}

/// Request and completion signals of a drive task
pub struct DriveControl<M: RawMutex = CriticalSectionRawMutex> {
    commands: Signal<M, DriveCommand>,
    done: Signal<M, bool>,
}

impl<M: RawMutex> DriveControl<M> {
    pub const fn new() -> Self {
        Self {
            commands: Signal::new(),
            done: Signal::new(),
        }
    }

    /// Sends a new drive command without waiting for it.
    pub fn request(&self, command: DriveCommand) {
        self.commands.signal(command);
    }

    /// Waits for the next drive command
    pub async fn wait(&self) -> DriveCommand {
        self.commands.wait().await
    }

    /// Report the outcome of the last command, `true` if it converged.
    pub fn complete(&self, converged: bool) {
        self.done.signal(converged);
    }

    /// Waits for the outcome of the last command
    pub async fn wait_done(&self) -> bool {
        self.done.wait().await
    }

    /// Sends a command and waits for its outcome.
    pub async fn execute(&self, command: DriveCommand) -> bool {
        self.done.reset();
        self.request(command);
        self.wait_done().await
    }
}

impl<M: RawMutex> Default for DriveControl<M> {
    fn default() -> Self {
        Self::new()
    }
}
