//! Shared state and plumbing between the motion tasks
pub mod attitude;
pub mod clock;
pub mod drive_command;
pub mod units;
