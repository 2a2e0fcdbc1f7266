//! Rate budget and quantum.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Direction of travel relative to the caller of a throttled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Caller writes toward the wrapped connection.
    Outbound,
    /// Wrapped connection delivers toward the caller's reads.
    Inbound,
}

impl Direction {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for settings that cannot drive a pacing loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("quantum must be greater than zero")]
    ZeroQuantum,

    #[error("{0} rate budget must be greater than zero")]
    ZeroRateBudget(Direction),
}

/// Bytes permitted per quantum in each direction.
///
/// Fixed for the lifetime of a throttled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Bytes per quantum from the caller to the wrapped connection.
    pub outbound_budget: u64,
    /// Bytes per quantum from the wrapped connection to the caller.
    pub inbound_budget: u64,
    /// Pacing period.
    pub quantum: Duration,
}

impl ThrottleSettings {
    /// Same budget in both directions.
    pub fn symmetric(rate_budget: u64, quantum: Duration) -> Self {
        Self {
            outbound_budget: rate_budget,
            inbound_budget: rate_budget,
            quantum,
        }
    }

    pub fn budget(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Outbound => self.outbound_budget,
            Direction::Inbound => self.inbound_budget,
        }
    }

    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.quantum.is_zero() {
            return Err(ThrottleError::ZeroQuantum);
        }
        for direction in [Direction::Outbound, Direction::Inbound] {
            if self.budget(direction) == 0 {
                return Err(ThrottleError::ZeroRateBudget(direction));
            }
        }
        Ok(())
    }

    /// Steady-state throughput in one direction, in bytes per second.
    pub fn bytes_per_second(&self, direction: Direction) -> f64 {
        self.budget(direction) as f64 / self.quantum.as_secs_f64()
    }
}
