//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use frame_port::{
    Component, Dropped, Error, EventArgument, FrameInfo, PortArgs, PortStream, Result, StreamId,
    StreamSetting,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Component that checks open/close and start/stop strictly alternate
#[derive(Default)]
pub struct CountingComponent {
    pub opened: AtomicBool,
    pub started: AtomicBool,
    pub open_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub reclaims: Mutex<HashMap<u64, usize>>,
}

impl CountingComponent {
    pub fn reclaim_count(&self, seq: u64) -> usize {
        self.reclaims.lock().get(&seq).copied().unwrap_or(0)
    }
}

impl Component for CountingComponent {
    fn open_port(&self, _: &str, _: i32, _: &PortArgs) -> Result<()> {
        assert!(!self.opened.swap(true, Ordering::SeqCst), "port opened twice");
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close_port(&self, _: &str, _: i32) -> Result<()> {
        assert!(self.opened.swap(false, Ordering::SeqCst), "port closed while closed");
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn start_port(&self, _: &str, _: i32) -> Result<()> {
        assert!(!self.started.swap(true, Ordering::SeqCst), "port started twice");
        Ok(())
    }

    fn stop_port(&self, _: &str, _: i32) -> Result<()> {
        assert!(self.started.swap(false, Ordering::SeqCst), "port stopped while stopped");
        Ok(())
    }

    fn release_port_frame(&self, _: &str, _: i32, frame: &FrameInfo, _: Option<&[u32]>) -> Result<()> {
        *self.reclaims.lock().entry(frame.sequence_number).or_insert(0) += 1;
        Ok(())
    }
}

/// Stream that accepts everything except a configurable set of frames
pub struct TestStream {
    id: StreamId,
    setting: StreamSetting,
    rejects: Mutex<BTreeSet<u64>>,
}

impl TestStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: StreamId::next(),
            setting: StreamSetting::new().argument("mode", "test"),
            rejects: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn reject(&self, seqs: impl IntoIterator<Item = u64>) {
        *self.rejects.lock() = seqs.into_iter().collect();
    }
}

impl PortStream for TestStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn key(&self) -> &str {
        "pseudo.image"
    }

    fn initial_setting(&self) -> &StreamSetting {
        &self.setting
    }

    fn send_frames(&self, frames: &[FrameInfo], _: u64) -> std::result::Result<(), Dropped> {
        let rejects = self.rejects.lock();
        let rejected: Vec<u64> = frames
            .iter()
            .map(|f| f.sequence_number)
            .filter(|seq| rejects.contains(seq))
            .collect();
        if rejected.is_empty() {
            return Ok(());
        }
        Err(Dropped::new(rejected, Error::busy("frame queue full")))
    }

    fn send_event(&self, _: &str, _: &EventArgument) -> Result<()> {
        Ok(())
    }

    fn set_user_data(&self, _: &Bytes) -> Result<()> {
        Ok(())
    }

    fn clear_frames(&self) {}
}

pub fn frame(seq: u64) -> FrameInfo {
    FrameInfo::new(seq).with_channel(0, Bytes::from(seq.to_le_bytes().to_vec()))
}
