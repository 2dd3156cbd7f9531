//! Harness configuration.
//!
//! Every knob can be given on the command line or through an environment
//! variable; the command line wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use clap::Parser;
//! use contention::config::ContentionConfig;
//!
//! let config = ContentionConfig::parse().validate()?;
//! println!("workers: {}", config.workers);
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A setting has an unusable value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The name of the setting.
        key: &'static str,
        /// Description of why the value is invalid.
        message: String,
    },
}

/// Which scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Workers take turns holding the mutex for a fixed time.
    Serialized,
    /// Busy workers, some of them interrupted mid-flight.
    Interruption,
    /// Releases racing with interruption of the promoted waiter.
    HandoffRace,
    /// All of the above, in order.
    All,
}

/// Settings for the contention scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "contention")]
#[command(about = "Drives the fibrous mutex through contention and interruption scenarios")]
pub struct ContentionConfig {
    /// Scenario to run.
    #[arg(value_enum, default_value_t = ScenarioKind::All)]
    pub scenario: ScenarioKind,

    /// Workers in the serialized scenario.
    #[arg(long, env = "CONTENTION_WORKERS", default_value_t = 10)]
    pub workers: usize,

    /// How long each worker holds the lock, in milliseconds.
    #[arg(long, env = "CONTENTION_HOLD_MILLIS", default_value_t = 100)]
    pub hold_millis: u64,

    /// Workers in the interruption scenario.
    #[arg(long, env = "CONTENTION_STRESS_WORKERS", default_value_t = 32)]
    pub stress_workers: usize,

    /// Lock rounds per stress worker, and rounds of the hand-off race.
    #[arg(long, env = "CONTENTION_STRESS_ROUNDS", default_value_t = 20)]
    pub stress_rounds: usize,

    /// Every n-th stress worker gets interrupted.
    #[arg(long, env = "CONTENTION_INTERRUPT_EVERY", default_value_t = 3)]
    pub interrupt_every: usize,
}

impl ContentionConfig {
    /// Checks that every count is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero worker, round or
    /// interruption count.
    pub fn validate(self) -> Result<Self, ConfigError> {
        require_positive("CONTENTION_WORKERS", self.workers)?;
        require_positive("CONTENTION_STRESS_WORKERS", self.stress_workers)?;
        require_positive("CONTENTION_STRESS_ROUNDS", self.stress_rounds)?;
        require_positive("CONTENTION_INTERRUPT_EVERY", self.interrupt_every)?;
        Ok(self)
    }

    /// The hold time as a `Duration`.
    pub const fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_millis)
    }
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioKind::All,
            workers: 10,
            hold_millis: 100,
            stress_workers: 32,
            stress_rounds: 20,
            interrupt_every: 3,
        }
    }
}

fn require_positive(key: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}
