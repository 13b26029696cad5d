//! Callbacks a port makes into its component

use super::frame::FrameInfo;
use super::stream::StreamArguments;
use crate::error::Result;

/// Arguments captured from the first stream that opened a port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortArgs {
    pub stream_key: String,
    pub arguments: StreamArguments,
}

/// Data producer behind one or more ports
///
/// The open/close and start/stop pairs are called once per physical
/// transition, on the first opener or starter and the last closer or
/// stopper. They run under the port's state-change lock, so they must not
/// call back into `open`, `close`, `start` or `stop` of the same port.
///
/// `release_port_frame` may run under the port's stream list locks: a send
/// releases rejected frames under the started list, and `stop` clears the
/// stopping stream's queue under it too. It must not open, close, start or
/// stop streams of the same port.
pub trait Component: Send + Sync {
    fn open_port(&self, port_type: &str, port_id: i32, args: &PortArgs) -> Result<()>;

    fn close_port(&self, port_type: &str, port_id: i32) -> Result<()>;

    fn start_port(&self, port_type: &str, port_id: i32) -> Result<()>;

    fn stop_port(&self, port_type: &str, port_id: i32) -> Result<()>;

    /// Reclaim a frame every destination is done with
    ///
    /// `referenced_channel_ids` lists the channels streams kept a reference
    /// to; `None` means no filter.
    fn release_port_frame(
        &self,
        port_type: &str,
        port_id: i32,
        frame: &FrameInfo,
        referenced_channel_ids: Option<&[u32]>,
    ) -> Result<()>;
}
