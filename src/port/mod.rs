//! Component port
//!
//! A port fans one component output out to every stream attached to it and
//! tracks each frame until all destinations are done with it.
//!
//! # Architecture
//!
//! ```text
//!                         [Component]
//!               open/close/start/stop_port ▲   │ send_frames()
//!               release_port_frame()       │   ▼
//!                     ┌─────────────────────────────────┐
//!                     │ ComponentPort                   │
//!                     │   opened:  [stream#1, stream#2] │
//!                     │   started: [stream#1, stream#2] │
//!                     │   sent_frames: seq → {          │
//!                     │     stream → delivery state,    │
//!                     │     referenced channel ids }    │
//!                     │   locker: PropertyLockManager   │
//!                     │   history: PropertyHistoryBook  │
//!                     └───────────────┬─────────────────┘
//!                                     │
//!                  ┌──────────────────┴──────────────────┐
//!                  ▼                                     ▼
//!             [stream#1]                            [stream#2]
//!          send_frames()                          send_frames()
//!                  │                                     │
//!                  └──► port.release_frame() ◄───────────┘
//! ```
//!
//! The component is asked to open, close, start and stop only on the first
//! and last transition of the respective list. A frame is reclaimed exactly
//! once, when its last destination is done and at least one of them
//! released it rather than rejecting it.
//!
//! # Zero-Copy Design
//!
//! Channel payloads and property snapshots are `bytes::Bytes`, so every
//! destination shares the producer's allocation.

pub mod accessor;
pub mod component;
pub mod core;
pub mod frame;
pub mod stream;

pub use accessor::PropertyAccessor;
pub use component::{Component, PortArgs};
pub use self::core::ComponentPort;
pub use frame::{ChannelData, DeliveryState, Dropped, FrameInfo};
pub use stream::{EventArgument, PortStream, StreamArguments, StreamSetting, EVENT_ANY};
