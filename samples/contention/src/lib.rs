//! Contention scenarios for the `fibrous` mutex.
//!
//! The binary runs these scenarios from the command line; the library exposes
//! them so the integration tests can drive them on a paused clock.

pub mod config;
pub mod scenario;
pub mod timeline;
