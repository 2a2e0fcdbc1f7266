//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking)
//!     → hand off to the relay
//!
//! Outgoing TCP connection
//!     → dialer.rs (connect with timeout)
//!     → deadline.rs (read/write deadlines)
//!     → ThrottledConn (paced reads and writes)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Anything implementing `Connection` can be throttled, including a
//!   connection that is already throttled

pub mod connection;
pub mod deadline;
pub mod dialer;
pub mod listener;

pub use connection::{Connection, ConnectionGuard, ConnectionId, ConnectionTracker};
pub use deadline::DeadlineStream;
pub use dialer::{ThrottledDialer, ThrottledTcp};
pub use listener::{ConnectionPermit, Listener, ListenerError};
