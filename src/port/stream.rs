//! Contract a consumer stream fulfils toward its port

use std::collections::BTreeMap;

use bytes::Bytes;

use super::frame::{Dropped, FrameInfo};
use crate::error::Result;
use crate::stream::StreamId;

/// Wildcard event type; streams may subscribe to it but ports never send it
pub const EVENT_ANY: &str = "EventAny";

/// Open arguments of a stream, compared field-wise between openers
pub type StreamArguments = BTreeMap<String, String>;

/// Named event payload values
pub type EventArgument = BTreeMap<String, Bytes>;

/// Settings a stream was opened with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSetting {
    pub arguments: StreamArguments,
}

impl StreamSetting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an open argument
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Consumer attached to a port
///
/// Calls may arrive from any producer thread.
pub trait PortStream: Send + Sync {
    /// Identity used for all per-stream bookkeeping
    fn id(&self) -> StreamId;

    /// Stream key the stream was opened with
    fn key(&self) -> &str;

    /// Settings the stream was opened with
    fn initial_setting(&self) -> &StreamSetting;

    /// Accept a batch of frames
    ///
    /// Frames the stream cannot take are reported in the returned `Dropped`;
    /// the port releases them on the stream's behalf.
    fn send_frames(&self, frames: &[FrameInfo], timestamp: u64) -> std::result::Result<(), Dropped>;

    /// Deliver an event
    fn send_event(&self, event: &str, args: &EventArgument) -> Result<()>;

    /// Replace the user data attached to subsequent frames
    fn set_user_data(&self, data: &Bytes) -> Result<()>;

    /// Release every frame still queued in the stream
    fn clear_frames(&self);
}
