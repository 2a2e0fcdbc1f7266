//! Bandwidth throttling subsystem.
//!
//! # Data Flow
//! ```text
//! ThrottledConn::new(settings, conn)
//!     → budget.rs (validate rate budget and quantum)
//!     → conduit pipes (one per direction)
//!     → pacing.rs (one spawned pacer per direction)
//!     → conn.rs (caller-facing AsyncRead/AsyncWrite + Connection)
//!
//! ThrottledConn::close()
//!     → close both pipes (four ends)
//!     → stop pacers, shut down and drop the wrapped connection
//!     → first teardown error wins
//! ```
//!
//! # Design Decisions
//! - Fixed quota per quantum, no burst credit carried between quanta
//! - Missed ticks are dropped, not replayed
//! - Directions are independent; a failure ends only its own direction

pub mod budget;
pub mod conn;
pub mod pacing;

pub use budget::{Direction, ThrottleError, ThrottleSettings};
pub use conn::ThrottledConn;
pub use pacing::{Pacer, PacingOutcome};
