//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! client TCP connection
//!     → net::Listener (connection limit)
//!     → ThrottledDialer (dial upstream, wrap in ThrottledConn)
//!     → copy_bidirectional(client, throttled upstream)
//!     → close upstream, release slot
//! ```
//!
//! # Design Decisions
//! - Each connection takes a snapshot of the config when accepted
//! - Reloads only affect connections accepted afterwards
//! - Shutdown closes every open link, then drains with a timeout

pub mod relay;

pub use relay::{RelayError, RelayServer};
