//! Foundation module - core utilities shared by every layer
//!
//! - Logging bootstrap
//! - Time measurement

pub mod logging;
pub mod time;
