//! Frame types and per-destination delivery bookkeeping

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bytes::Bytes;

use crate::error::Error;
use crate::stream::StreamId;

/// One channel of a frame
///
/// The payload is reference-counted, so every destination stream shares the
/// same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    pub channel_id: u32,
    pub data: Bytes,
}

/// Unit of data sent through a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Monotonically increasing per port
    pub sequence_number: u64,
    pub channels: Vec<ChannelData>,
}

impl FrameInfo {
    /// Create a frame without channels
    pub fn new(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            channels: Vec::new(),
        }
    }

    /// Append a channel
    pub fn with_channel(mut self, channel_id: u32, data: impl Into<Bytes>) -> Self {
        self.channels.push(ChannelData {
            channel_id,
            data: data.into(),
        });
        self
    }

    /// Ids of all channels in the frame
    pub fn channel_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.iter().map(|channel| channel.channel_id)
    }
}

/// Delivery state of a frame toward one destination stream
///
/// Moves from `NotSentYet` to one of the terminal states and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Handed to the stream, not yet given back
    NotSentYet,
    /// Released by the stream after use
    Released,
    /// Rejected by the stream
    SendFailed,
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeliveryState::NotSentYet)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryState::NotSentYet => "unreleased",
            DeliveryState::Released => "released",
            DeliveryState::SendFailed => "send-failed",
        };
        f.write_str(name)
    }
}

/// Delivery entry of one sequence number
#[derive(Debug, Default)]
pub(crate) struct SentFrame {
    pub(crate) delivery: BTreeMap<StreamId, DeliveryState>,
    pub(crate) referenced_channel_ids: BTreeSet<u32>,
}

impl SentFrame {
    pub(crate) fn is_settled(&self) -> bool {
        self.delivery.values().all(|state| state.is_terminal())
    }

    pub(crate) fn any_released(&self) -> bool {
        self.delivery
            .values()
            .any(|state| *state == DeliveryState::Released)
    }
}

/// Frames a destination (or the whole port) did not accept
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct Dropped {
    /// Sequence numbers of the dropped frames, in input order
    pub sequence_numbers: Vec<u64>,
    /// Reason the frames were dropped
    pub error: Error,
}

impl Dropped {
    pub fn new(sequence_numbers: Vec<u64>, error: Error) -> Self {
        Self {
            sequence_numbers,
            error,
        }
    }

    /// Drop every frame of a batch
    pub fn all(frames: &[FrameInfo], error: Error) -> Self {
        Self::new(frames.iter().map(|f| f.sequence_number).collect(), error)
    }
}

impl From<Dropped> for Error {
    fn from(dropped: Dropped) -> Self {
        dropped.error
    }
}
