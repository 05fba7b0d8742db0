//! Long-running tasks. Board code spawns them from its executor.
pub mod drive;
pub mod imu_read;
