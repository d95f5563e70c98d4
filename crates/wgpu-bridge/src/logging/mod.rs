//! Logging utilities.
//!
//! Centralizes logger initialization for hosts that load the bridge as a
//! library. Everything else in the crate only talks to the `log` facade.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
