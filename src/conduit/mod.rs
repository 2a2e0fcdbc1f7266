//! Relay conduits.
//!
//! # Data Flow
//! ```text
//! caller write ─▶ PipeWriter ══▶ PipeReader ─▶ outbound pacer ─▶ wrapped conn
//! caller read  ◀─ PipeReader ◀══ PipeWriter ◀─ inbound pacer  ◀─ wrapped conn
//! ```
//!
//! # Design Decisions
//! - Unbuffered handoff: a write waits for a parked read and hands over at
//!   most what that read asked for
//! - A write that returns pending has taken nothing, so cancelling it is safe
//! - Closing one end with an error hands that error to the other end
//! - Dropping an end closes it

pub mod pipe;

pub use pipe::{pipe, PipeCloser, PipeReader, PipeWriter};
