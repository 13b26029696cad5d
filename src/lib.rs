//! # frame-port
//!
//! Frame and property distribution core for sensor stream middleware.
//!
//! A single data producer (a [`Component`]) is fanned out to any number of
//! concurrent consumers ([`PortStream`]s) through a [`ComponentPort`]. The
//! crate covers:
//!
//! - **Ports**: fan-out delivery, per-destination release tracking and
//!   first-opener/last-closer lifecycle
//! - **Property locks**: exclusive multi-key locks with wait and timeout,
//!   coexisting with ordinary get/set access
//! - **Stream access gates**: admission control that keeps frame and
//!   property calls from racing a stream's state transitions
//! - **Property history**: versioned, reference-counted property snapshots
//!   shared without copying
//!
//! All work runs on the calling thread; there is no runtime and no
//! background task.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use frame_port::{Component, ComponentPort, FrameInfo, PortStream, PropertyHistoryBook};
//!
//! fn run(component: Arc<dyn Component>, stream: Arc<dyn PortStream>) -> frame_port::Result<()> {
//!     let port = ComponentPort::new(component, "camera", "image", 0, Arc::new(PropertyHistoryBook::new()));
//!
//!     let id = stream.id();
//!     port.open(stream)?;
//!     port.start(id)?;
//!
//!     let frame = FrameInfo::new(1).with_channel(0, Bytes::from_static(b"pixels"));
//!     port.send_frames(std::slice::from_ref(&frame))?;
//!     port.release_frame(id, &frame, None)?;
//!
//!     port.stop(id)?;
//!     port.close(id)
//! }
//! ```

pub mod config;
pub mod error;
pub mod port;
pub mod property;
pub mod stream;

pub use config::PortConfig;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use port::{
    ChannelData, Component, ComponentPort, DeliveryState, Dropped, EventArgument, FrameInfo, PortArgs,
    PortStream, PropertyAccessor, StreamSetting,
};
pub use property::{
    HistoryId, LockHandle, LockInfo, PropertyHistoryBook, PropertyKey, PropertyLockManager,
};
pub use stream::{FunctionCategory, StreamAccessGate, StreamId, StreamLocalState};
