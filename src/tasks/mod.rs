//! Background Tasks Module
//!
//! Tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: removes expired cache entries at a configured interval

mod sweeper;

pub use sweeper::spawn_sweeper_task;
