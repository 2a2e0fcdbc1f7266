//! Throttled link: wrap any byte-stream connection so that it behaves like
//! one running over a constrained link.
//!
//! Each direction of a [`ThrottledConn`] is paced by its own loop that moves
//! at most a fixed byte budget per time quantum, handing bytes across an
//! unbuffered in-memory conduit.

pub mod conduit;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod throttle;

pub use config::LinkConfig;
pub use lifecycle::Shutdown;
pub use net::{Connection, DeadlineStream, ThrottledDialer};
pub use proxy::RelayServer;
pub use throttle::{Direction, ThrottleError, ThrottleSettings, ThrottledConn};
