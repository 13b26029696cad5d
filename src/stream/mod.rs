//! Stream-side lifecycle and admission control
//!
//! Each stream owns a [`StreamAccessGate`] and takes a slot in it before
//! calling into its port, so a frame or property call never races the
//! stream being stopped or closed.

pub mod gate;
pub mod id;
pub mod state;

pub use gate::{FunctionCategory, GateGuard, StreamAccessGate};
pub use id::StreamId;
pub use state::StreamLocalState;
