//! Netron Task Model - cooperative cancelable/suspendable tasks
//!
//! Named async functions are registered with a [`TaskManager`] and run
//! through a small state machine:
//!
//! ```text
//! IDLE -> RUNNING -> {COMPLETED, FAILED, CANCELLED}
//!         RUNNING <-> SUSPENDED
//!         RUNNING -> CANCELLING -> CANCELLED
//! ```
//!
//! Cancellation and suspension are cooperative: the running task checks
//! its [`TaskSignal`] at safe points and acknowledges; nothing is ever
//! interrupted mid-instruction.

pub mod manager;
pub mod observer;
pub mod signal;
pub mod state;

pub use manager::*;
pub use observer::*;
pub use signal::*;
pub use state::*;
