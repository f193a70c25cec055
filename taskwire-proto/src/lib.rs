//! Shared protocol definitions for the Taskwire wire format.

pub mod message;
pub mod task;
