//! Async runtime layer for the trial game clock: push-channel supervision,
//! state pulling over HTTP, and the drift-corrected tick service.
//!
//! The pure clock/timer machinery lives in `gameclock-core`; this crate owns
//! the sockets, the timers, and the single event loop that serializes every
//! state transition.

pub mod channel;
pub mod service;
pub mod source;
