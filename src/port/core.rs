//! Component port
//!
//! The fan-out node between one component output and the streams attached
//! to it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::accessor::PropertyAccessor;
use super::component::{Component, PortArgs};
use super::frame::{DeliveryState, Dropped, FrameInfo, SentFrame};
use super::stream::{EventArgument, PortStream, StreamArguments, EVENT_ANY};
use crate::config::PortConfig;
use crate::error::{Error, Result, ResultExt};
use crate::property::{
    HistoryId, LockHandle, LockPropertyArgs, PropertyHistoryBook, PropertyKey, PropertyLockManager,
    PropertyLockResource,
};
use crate::stream::StreamId;

type StreamList = Vec<Arc<dyn PortStream>>;

/// Fan-out port between a component and its streams
///
/// Lock order: state change, then opened or started list, then sent frames.
/// The property lock table may consult the opened list but never the
/// reverse.
pub struct ComponentPort {
    component: Arc<dyn Component>,
    instance_name: String,
    port_type: String,
    port_id: i32,
    /// `instance(type.id)`, prefixed to messages and logs
    label: String,
    config: PortConfig,

    /// Serializes open/close/start/stop against each other
    state_change: Mutex<()>,
    port_args: Mutex<PortArgs>,
    opened: Mutex<StreamList>,
    started: Mutex<StreamList>,
    sent_frames: Mutex<BTreeMap<u64, SentFrame>>,

    accessors: RwLock<BTreeMap<String, Arc<dyn PropertyAccessor>>>,
    locker: PropertyLockManager,
    history_book: Arc<PropertyHistoryBook>,
}

impl ComponentPort {
    /// Create a port with default configuration
    pub fn new(
        component: Arc<dyn Component>,
        instance_name: impl Into<String>,
        port_type: impl Into<String>,
        port_id: i32,
        history_book: Arc<PropertyHistoryBook>,
    ) -> Self {
        Self::with_config(
            component,
            instance_name,
            port_type,
            port_id,
            history_book,
            PortConfig::default(),
        )
    }

    /// Create a port with custom configuration
    pub fn with_config(
        component: Arc<dyn Component>,
        instance_name: impl Into<String>,
        port_type: impl Into<String>,
        port_id: i32,
        history_book: Arc<PropertyHistoryBook>,
        config: PortConfig,
    ) -> Self {
        let instance_name = instance_name.into();
        let port_type = port_type.into();
        let label = format!("{}({}.{})", instance_name, port_type, port_id);

        Self {
            component,
            locker: PropertyLockManager::new(label.clone()),
            instance_name,
            port_type,
            port_id,
            label,
            config,
            state_change: Mutex::new(()),
            port_args: Mutex::new(PortArgs::default()),
            opened: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            sent_frames: Mutex::new(BTreeMap::new()),
            accessors: RwLock::new(BTreeMap::new()),
            history_book,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn port_type(&self) -> &str {
        &self.port_type
    }

    pub fn port_id(&self) -> i32 {
        self.port_id
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Arguments captured from the first opener
    pub fn port_args(&self) -> PortArgs {
        self.port_args.lock().clone()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Attach a stream
    ///
    /// The first opener's key and arguments are handed to the component;
    /// later openers must carry identical arguments.
    pub fn open(&self, stream: Arc<dyn PortStream>) -> Result<()> {
        let _state = self.state_change.lock();
        let id = stream.id();

        {
            let mut opened = self.opened.lock();
            if contains(&opened, id) {
                return Err(Error::invalid_operation(format!(
                    "{}: already connected with same stream: {}",
                    self.label, id
                )));
            }
            opened.push(Arc::clone(&stream));

            if opened.len() > 1 {
                if let Err(e) = self.check_same_arguments(stream.as_ref()) {
                    remove(&mut opened, id);
                    self.history_book.remove_updated_property_list(id);
                    return Err(e.trace());
                }
                tracing::debug!(port = %self.label, stream = %id, streams = opened.len(), "Stream joined port");
                return Ok(());
            }
        }

        let args = PortArgs {
            stream_key: stream.key().to_string(),
            arguments: stream.initial_setting().arguments.clone(),
        };
        *self.port_args.lock() = args.clone();

        if let Err(e) = self.component.open_port(&self.port_type, self.port_id, &args) {
            let e = self.component_failure(e, "OpenPort failed");
            remove(&mut self.opened.lock(), id);
            self.history_book.remove_updated_property_list(id);
            return Err(e);
        }

        tracing::info!(port = %self.label, stream = %id, key = %args.stream_key, "Port opened");
        Ok(())
    }

    fn check_same_arguments(&self, stream: &dyn PortStream) -> Result<()> {
        let current = self.port_args.lock();
        let arrival = &stream.initial_setting().arguments;
        if current.arguments == *arrival {
            return Ok(());
        }

        let dump = if self.config.status_messages {
            format!(
                "[current]: {} [arrival]: {}",
                dump_arguments(&current.arguments),
                dump_arguments(arrival)
            )
        } else {
            String::new()
        };
        Err(Error::invalid_argument(format!(
            "unmatched stream arguments: stream={}, {}",
            stream.id(),
            dump
        )))
    }

    /// Detach a stream
    ///
    /// A started stream must be stopped first. Property locks the stream
    /// still holds are released. The last closer closes the component port;
    /// if that fails the stream stays attached.
    pub fn close(&self, id: StreamId) -> Result<()> {
        let _state = self.state_change.lock();

        if contains(&self.started.lock(), id) {
            return Err(Error::invalid_operation(format!(
                "{}: stream is started: {}",
                self.label, id
            )));
        }

        let stream = remove(&mut self.opened.lock(), id).ok_or_else(|| {
            tracing::error!(port = %self.label, stream = %id, "Close of unconnected stream");
            Error::not_found(format!("{}: not connected stream: {}", self.label, id))
        })?;

        self.locker.force_unlock_property(id);

        if !self.opened.lock().is_empty() {
            self.history_book.remove_updated_property_list(id);
            tracing::debug!(port = %self.label, stream = %id, "Stream left port");
            return Ok(());
        }

        if let Err(e) = self.component.close_port(&self.port_type, self.port_id) {
            let e = self.component_failure(e, "ClosePort failed");
            self.opened.lock().push(stream);
            return Err(e);
        }
        self.history_book.remove_updated_property_list(id);

        tracing::info!(port = %self.label, stream = %id, "Port closed");
        Ok(())
    }

    /// Begin delivering frames to an opened stream
    ///
    /// The first starter starts the component port and is refused with
    /// `Busy` while frames from a previous run are still unreleased.
    pub fn start(&self, id: StreamId) -> Result<()> {
        let _state = self.state_change.lock();

        let stream = find(&self.opened.lock(), id).ok_or_else(|| {
            Error::invalid_operation(format!("{}: not connected stream: {}", self.label, id))
        })?;

        {
            let mut started = self.started.lock();
            if started.is_empty() {
                let sent_frames = self.sent_frames.lock();
                if !sent_frames.is_empty() {
                    let message = if self.config.status_messages {
                        format!(
                            "{}: unreleased frames exist: stream={}, {}",
                            self.label,
                            id,
                            sending_state(&sent_frames)
                        )
                    } else {
                        String::new()
                    };
                    return Err(Error::busy(message));
                }
            } else if contains(&started, id) {
                return Err(Error::invalid_operation(format!(
                    "{}: already started stream: {}",
                    self.label, id
                )));
            }

            started.push(stream);
            if started.len() > 1 {
                tracing::debug!(port = %self.label, stream = %id, streams = started.len(), "Stream started");
                return Ok(());
            }
        }

        if let Err(e) = self.component.start_port(&self.port_type, self.port_id) {
            let e = self.component_failure(e, "StartPort failed");
            let mut started = self.started.lock();
            if let Some(stream) = remove(&mut started, id) {
                stream.clear_frames();
            }
            return Err(e);
        }

        tracing::info!(port = %self.label, stream = %id, "Port started");
        Ok(())
    }

    /// Stop delivering frames to a stream
    ///
    /// Frames still queued in the stream are released first. The last
    /// stopper stops the component port; if that fails the stream stays
    /// started.
    pub fn stop(&self, id: StreamId) -> Result<()> {
        let _state = self.state_change.lock();

        let stream = {
            let mut started = self.started.lock();
            let stream = remove(&mut started, id).ok_or_else(|| {
                tracing::error!(port = %self.label, stream = %id, "Stop of unstarted stream");
                Error::not_found(format!("{}: not started stream: {}", self.label, id))
            })?;
            stream.clear_frames();

            if !started.is_empty() {
                tracing::debug!(port = %self.label, stream = %id, "Stream stopped");
                return Ok(());
            }
            stream
        };

        if let Err(e) = self.component.stop_port(&self.port_type, self.port_id) {
            let e = self.component_failure(e, "StopPort failed");
            self.started.lock().push(stream);
            return Err(e);
        }

        tracing::info!(port = %self.label, stream = %id, "Port stopped");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.opened.lock().is_empty()
    }

    pub fn opened_stream_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn is_opened_stream(&self, id: StreamId) -> bool {
        contains(&self.opened.lock(), id)
    }

    pub fn is_started_stream(&self, id: StreamId) -> bool {
        contains(&self.started.lock(), id)
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Send a batch of frames to every started stream
    ///
    /// A frame counts as dropped only when every destination rejected it.
    /// Frames a destination rejected are released for that destination
    /// immediately. Fails `Busy` with the dropped sequence numbers when any
    /// frame was dropped, including when no stream is started.
    pub fn send_frames(&self, frames: &[FrameInfo]) -> std::result::Result<(), Dropped> {
        if frames.is_empty() {
            return Ok(());
        }

        let timestamp = if self.config.stamp_frames {
            now_nanos()
        } else {
            0
        };

        let mut dropped: Vec<u64> = Vec::new();
        {
            let started = self.started.lock();
            if started.is_empty() {
                dropped = frames.iter().map(|f| f.sequence_number).collect();
            } else {
                self.register_destinations(frames, &started);

                for (index, stream) in started.iter().enumerate() {
                    let Err(rejected) = stream.send_frames(frames, timestamp) else {
                        dropped.clear();
                        continue;
                    };

                    self.release_rejected(stream.id(), frames, &rejected.sequence_numbers);

                    if index == 0 {
                        dropped = rejected.sequence_numbers;
                    } else if !dropped.is_empty() {
                        dropped.retain(|seq| rejected.sequence_numbers.contains(seq));
                    }
                }
            }
        }

        if dropped.is_empty() {
            return Ok(());
        }

        let scope = if dropped.len() == frames.len() { "all" } else { "some" };
        tracing::debug!(port = %self.label, dropped = dropped.len(), "Frames dropped");
        Err(Dropped::new(
            dropped,
            Error::busy(format!("{}: {} frames dropped.", self.label, scope)),
        ))
    }

    fn register_destinations(&self, frames: &[FrameInfo], started: &StreamList) {
        let mut sent_frames = self.sent_frames.lock();
        for frame in frames {
            let entry = sent_frames.entry(frame.sequence_number).or_default();
            for stream in started {
                entry
                    .delivery
                    .entry(stream.id())
                    .or_insert(DeliveryState::NotSentYet);
            }
        }
    }

    fn release_rejected(&self, stream: StreamId, frames: &[FrameInfo], rejected: &[u64]) {
        for frame in frames
            .iter()
            .filter(|f| rejected.contains(&f.sequence_number))
        {
            if let Err(e) = self.settle_frame(stream, frame, None, DeliveryState::SendFailed) {
                tracing::warn!(
                    port = %self.label,
                    stream = %stream,
                    seq = frame.sequence_number,
                    error = %e,
                    "Failed to release rejected frame"
                );
            }
        }
    }

    /// Give a frame back after a stream is done with it
    ///
    /// `referenced_channel_ids` accumulates across destinations. Once every
    /// destination is done the entry is dropped, and the component reclaims
    /// the frame if at least one destination released it.
    pub fn release_frame(
        &self,
        stream: StreamId,
        frame: &FrameInfo,
        referenced_channel_ids: Option<&[u32]>,
    ) -> Result<()> {
        self.settle_frame(stream, frame, referenced_channel_ids, DeliveryState::Released)
            .traced()
    }

    fn settle_frame(
        &self,
        stream: StreamId,
        frame: &FrameInfo,
        referenced_channel_ids: Option<&[u32]>,
        state: DeliveryState,
    ) -> Result<()> {
        let seq = frame.sequence_number;

        let channel_ids: Vec<u32> = {
            let mut sent_frames = self.sent_frames.lock();
            let entry = sent_frames.get_mut(&seq).ok_or_else(|| {
                Error::not_found(format!("{}: unknown frame: num={}", self.label, seq))
            })?;
            let current = entry.delivery.get_mut(&stream).ok_or_else(|| {
                Error::not_found(format!(
                    "{}: release from no sending stream: num={}, stream={}",
                    self.label, seq, stream
                ))
            })?;
            if current.is_terminal() {
                return Err(Error::invalid_operation(format!(
                    "{}: frame already {}: num={}, stream={}",
                    self.label, current, seq, stream
                )));
            }
            *current = state;
            if let Some(ids) = referenced_channel_ids {
                entry.referenced_channel_ids.extend(ids.iter().copied());
            }

            if !entry.is_settled() {
                return Ok(());
            }
            let reclaim = entry.any_released();
            let Some(entry) = sent_frames.remove(&seq) else {
                return Ok(());
            };
            if !reclaim {
                tracing::debug!(port = %self.label, seq = seq, "Frame rejected by every stream");
                return Ok(());
            }
            entry.referenced_channel_ids.into_iter().collect()
        };

        let filter = (!channel_ids.is_empty()).then_some(channel_ids.as_slice());
        self.component
            .release_port_frame(&self.port_type, self.port_id, frame, filter)
            .map_err(|e| self.component_failure(e, "ReleasePortFrame failed"))
    }

    /// Number of frames with at least one destination not yet done
    pub fn pending_frame_count(&self) -> usize {
        self.sent_frames.lock().len()
    }

    /// Delivery state of every pending frame, for diagnostics
    ///
    /// `{seq_num:N, stream#1:unreleased, stream#2:released}, ...`
    pub fn frame_sending_state(&self) -> String {
        sending_state(&self.sent_frames.lock())
    }

    // ------------------------------------------------------------------
    // Events and user data
    // ------------------------------------------------------------------

    /// Deliver an event to every opened stream
    ///
    /// Succeeds when at least one stream accepted it.
    pub fn send_event(&self, event: &str, args: &EventArgument) -> Result<()> {
        if event == EVENT_ANY {
            return Err(Error::invalid_argument(format!(
                "{}: unsupported event type: {}",
                self.label, event
            )));
        }

        let delivered = self.fan_out(|stream| stream.send_event(event, args));
        if delivered {
            return Ok(());
        }
        Err(Error::busy(format!(
            "{}: failed to all sending event: event={}",
            self.label, event
        )))
    }

    /// Replace the user data of every opened stream
    ///
    /// Succeeds when at least one stream accepted it.
    pub fn set_user_data(&self, data: &Bytes) -> Result<()> {
        if self.fan_out(|stream| stream.set_user_data(data)) {
            return Ok(());
        }
        Err(Error::busy(format!(
            "{}: failed to user data updating: size={}",
            self.label,
            data.len()
        )))
    }

    fn fan_out<F>(&self, deliver: F) -> bool
    where
        F: Fn(&dyn PortStream) -> Result<()>,
    {
        let opened = self.opened.lock();
        let mut delivered = false;
        for stream in opened.iter() {
            match deliver(stream.as_ref()) {
                Ok(()) => delivered = true,
                Err(e) => {
                    tracing::debug!(port = %self.label, stream = %stream.id(), error = %e, "Stream refused delivery");
                }
            }
        }
        delivered
    }

    // ------------------------------------------------------------------
    // Property accessors
    // ------------------------------------------------------------------

    pub fn register_property_accessor(&self, accessor: Arc<dyn PropertyAccessor>) -> Result<()> {
        let key = accessor.key().to_string();
        if key.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{}: property key is none",
                self.label
            )));
        }

        let mut accessors = self.accessors.write();
        if accessors.contains_key(&key) {
            return Err(Error::already_exists(format!(
                "{}: already registered key: key={}",
                self.label, key
            )));
        }
        accessors.insert(key, accessor);
        Ok(())
    }

    /// Remove an accessor, returning it
    pub fn unregister_property_accessor(&self, key: &str) -> Result<Arc<dyn PropertyAccessor>> {
        self.accessors.write().remove(key).ok_or_else(|| {
            Error::invalid_operation(format!(
                "{}: not registered key: key={}",
                self.label, key
            ))
        })
    }

    pub fn get_property_accessor(&self, key: &str) -> Option<Arc<dyn PropertyAccessor>> {
        self.accessors.read().get(key).cloned()
    }

    /// Keys of every registered accessor, sorted
    pub fn supported_property_list(&self) -> BTreeSet<String> {
        self.accessors.read().keys().cloned().collect()
    }

    /// Read a property through its accessor on behalf of `stream`
    pub fn get_property(&self, stream: StreamId, key: &str, input: Bytes) -> Result<Bytes> {
        let (key, accessor) = self.resolve_accessor(stream, key)?;
        let _access = self.locker.start_property_access(stream, &key, false)?;

        accessor
            .get(key.full_key(), input)
            .map_err(|e| self.accessor_failure(e, stream, &key, "Get property failed"))
    }

    /// Write a property through its accessor on behalf of `stream`
    ///
    /// Fails `Busy` while another stream holds the key locked.
    pub fn set_property(&self, stream: StreamId, key: &str, value: Bytes) -> Result<()> {
        let (key, accessor) = self.resolve_accessor(stream, key)?;
        let _access = self
            .locker
            .start_property_access(stream, &key, true)
            .traced()?;

        accessor
            .set(key.full_key(), value)
            .map_err(|e| self.accessor_failure(e, stream, &key, "Set property failed"))
    }

    fn resolve_accessor(
        &self,
        stream: StreamId,
        key: &str,
    ) -> Result<(PropertyKey, Arc<dyn PropertyAccessor>)> {
        if !self.is_opened_stream(stream) {
            return Err(Error::invalid_operation(format!(
                "{}: not connected stream: {}",
                self.label, stream
            )));
        }
        let key = PropertyKey::parse(key)?;
        let accessor = self.get_property_accessor(key.property_key()).ok_or_else(|| {
            Error::not_found(format!("{}: unsupported property: key={}", self.label, key))
        })?;
        Ok((key, accessor))
    }

    fn accessor_failure(&self, e: Error, stream: StreamId, key: &PropertyKey, what: &str) -> Error {
        let e = e.trace().with_block(self.instance_name.as_str());
        tracing::warn!(port = %self.label, stream = %stream, key = %key, error = %e, "{}", what);
        e
    }

    // ------------------------------------------------------------------
    // Property locks
    // ------------------------------------------------------------------

    /// Lock a set of property keys for `stream`
    ///
    /// See [`PropertyLockManager::lock_property`] for the timeout rules.
    pub fn lock_property<I, S>(&self, stream: StreamId, keys: I, timeout_msec: i32) -> Result<LockHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|key| PropertyKey::parse(key.as_ref()))
            .collect::<Result<BTreeSet<_>>>()?;
        if keys.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{}: no property keys to lock",
                self.label
            )));
        }

        self.locker
            .lock_property(stream, &keys, timeout_msec, |id| self.is_opened_stream(id))
    }

    pub fn unlock_property(&self, stream: StreamId, handle: LockHandle) -> Result<()> {
        self.locker.unlock_property(stream, handle)
    }

    pub fn register_lock_callback<F>(&self, callback: F)
    where
        F: Fn(&LockPropertyArgs) -> Result<()> + Send + Sync + 'static,
    {
        self.locker.register_lock_callback(callback);
    }

    pub fn register_unlock_callback<F>(&self, callback: F)
    where
        F: Fn(LockHandle, &PropertyLockResource) -> Result<()> + Send + Sync + 'static,
    {
        self.locker.register_unlock_callback(callback);
    }

    pub fn property_locker(&self) -> &PropertyLockManager {
        &self.locker
    }

    // ------------------------------------------------------------------
    // Property history
    // ------------------------------------------------------------------

    /// Publish a new snapshot of a frame property on a channel
    pub fn update_frame_property(&self, channel_id: u32, key: &str, data: Bytes) -> Result<HistoryId> {
        if !self.is_connected() {
            return Err(Error::invalid_operation("port is not connected"));
        }
        Ok(self.history_book.set_property(channel_id, key, data))
    }

    pub fn property_history_book(&self) -> &Arc<PropertyHistoryBook> {
        &self.history_book
    }

    fn component_failure(&self, e: Error, what: &str) -> Error {
        let e = e.trace().with_block(self.instance_name.as_str());
        tracing::error!(port = %self.label, error = %e, "{}", what);
        e
    }
}

impl std::fmt::Debug for ComponentPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentPort")
            .field("label", &self.label)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn contains(list: &StreamList, id: StreamId) -> bool {
    list.iter().any(|stream| stream.id() == id)
}

fn find(list: &StreamList, id: StreamId) -> Option<Arc<dyn PortStream>> {
    list.iter().find(|stream| stream.id() == id).cloned()
}

fn remove(list: &mut StreamList, id: StreamId) -> Option<Arc<dyn PortStream>> {
    let pos = list.iter().position(|stream| stream.id() == id)?;
    Some(list.remove(pos))
}

fn dump_arguments(arguments: &StreamArguments) -> String {
    arguments.iter().fold(String::new(), |mut dump, (name, value)| {
        let _ = write!(dump, "{{{},{}}},", name, value);
        dump
    })
}

fn sending_state(sent_frames: &BTreeMap<u64, SentFrame>) -> String {
    let mut dump = String::new();
    for (seq, entry) in sent_frames {
        if !dump.is_empty() {
            dump.push_str(", ");
        }
        let _ = write!(dump, "{{seq_num:{}", seq);
        for (stream, state) in &entry.delivery {
            let _ = write!(dump, ", {}:{}", stream, state);
        }
        dump.push('}');
    }
    dump
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
