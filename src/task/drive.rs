//! Drive Task Module
//!
//! Runs a [`DifferentialDrive`] on behalf of other tasks. Each command from
//! the [`DriveControl`] is executed to completion, then its outcome is
//! reported and the next command is awaited. Commands that arrive while a
//! motion is running are picked up afterwards; only the newest is kept.
//!
//! While a speed target is held the task also wakes every speed period to run
//! one regulation step, until the next command arrives.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::control::Controller;
use crate::drive::{DifferentialDrive, EncodedMotor};
use crate::system::clock::Clock;
use crate::system::drive_command::{DriveCommand, DriveControl};

/// Execute drive commands forever.
pub async fn run_drive<L, R, C, M, S, N>(drive: &mut DifferentialDrive<'_, L, R, C, M, S>, control: &DriveControl<N>)
where
    L: EncodedMotor,
    R: EncodedMotor,
    C: Clock,
    M: RawMutex,
    S: Controller,
    N: RawMutex,
{
    loop {
        let command = if drive.holding_speed() {
            hold_speed(drive, control).await
        } else {
            control.wait().await
        };
        debug!("Drive command: {:?}", command);

        let converged = match command {
            DriveCommand::Straight {
                distance,
                max_effort,
                timeout,
            } => drive.straight(distance, max_effort, timeout).await,
            DriveCommand::Turn {
                degrees,
                max_effort,
                timeout,
                use_attitude,
            } => drive.turn(degrees, max_effort, timeout, use_attitude).await,
            DriveCommand::Effort { left, right } => {
                drive.set_effort(left, right);
                true
            }
            DriveCommand::Arcade { straight, turn } => {
                drive.arcade(straight, turn);
                true
            }
            DriveCommand::Speed { left, right } => {
                drive.set_speed(left, right);
                true
            }
            DriveCommand::Stop => {
                drive.stop();
                true
            }
        };

        control.complete(converged);
    }
}

/// Regulate wheel speeds every speed period until a command arrives.
async fn hold_speed<L, R, C, M, S, N>(
    drive: &mut DifferentialDrive<'_, L, R, C, M, S>,
    control: &DriveControl<N>,
) -> DriveCommand
where
    L: EncodedMotor,
    R: EncodedMotor,
    C: Clock,
    M: RawMutex,
    S: Controller,
    N: RawMutex,
{
    let period = drive.config().speed_period;
    let mut next = drive.clock().now() + period;

    loop {
        let event = select(control.wait(), drive.clock().sleep_until(next)).await;
        match event {
            Either::First(command) => return command,
            Either::Second(()) => {
                next += period;
                // Don't burst to catch up after a stall
                let now = drive.clock().now();
                if next < now {
                    next = now;
                }
                drive.update_speed();
            }
        }
    }
}
