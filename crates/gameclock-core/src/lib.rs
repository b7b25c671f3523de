//! Pure state machines for the trial game clock.
//!
//! Everything in this crate is deterministic and IO-free: the current time is
//! always an explicit parameter, so every component can be driven from tests
//! without a runtime. The async wiring (push channel, HTTP state pulls, the
//! tick loop) lives in `gameclock-daemon`.

pub mod cadence;
pub mod error;
pub mod format;
pub mod schedule;
pub mod timer;
pub mod types;
pub mod wire;
