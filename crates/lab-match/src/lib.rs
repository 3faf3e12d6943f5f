//! Allocation of school class lab requests to university lab time slots.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
