//! Versioned property snapshots
//!
//! Components push property updates per channel; streams check out a
//! consistent view of a channel's properties when a frame is emitted and give
//! it back when the frame is released. Snapshots are immutable `Bytes`, so a
//! checked-out view never copies payloads.
//!
//! Each `(channel, key)` keeps an ordered map of history entries. The current
//! entry holds one reference of its own; every checkout adds one more. An
//! entry is dropped the moment its count reaches zero.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::stream::StreamId;

/// Identifier of one version of a property, starting at 1 per key
pub type HistoryId = u32;

/// Property keys mapped to the history ids a stream has checked out
pub type PropertyReferences = BTreeMap<String, HistoryId>;

/// One stored version of a property
#[derive(Debug)]
struct History {
    data: Bytes,
    referenced: u32,
}

/// All versions of a single property key
#[derive(Debug)]
struct PropertyHistories {
    current_history_id: HistoryId,
    histories: BTreeMap<HistoryId, History>,
    /// Last history id each stream has been told about
    last_access_id: HashMap<StreamId, HistoryId>,
}

impl PropertyHistories {
    fn new(data: Bytes) -> Self {
        let mut histories = BTreeMap::new();
        histories.insert(
            1,
            History {
                data,
                referenced: 1,
            },
        );
        Self {
            current_history_id: 1,
            histories,
            last_access_id: HashMap::new(),
        }
    }

    /// Drop one reference to `history_id`, deleting the entry on zero.
    fn release(&mut self, key: &str, history_id: HistoryId) {
        let Some(history) = self.histories.get_mut(&history_id) else {
            return;
        };
        if history_id == self.current_history_id && history.referenced == 1 {
            // the current entry keeps its own reference until superseded
            tracing::debug!(
                key = key,
                history_id = history_id,
                "Ignoring release of current property history"
            );
            return;
        }
        history.referenced -= 1;
        tracing::debug!(
            key = key,
            history_id = history_id,
            referenced = history.referenced,
            "Property history released"
        );
        if history.referenced == 0 {
            self.histories.remove(&history_id);
        }
    }
}

type ChannelProperties = BTreeMap<String, PropertyHistories>;

/// Reference-counted store of property snapshots per channel
#[derive(Debug, Default)]
pub struct PropertyHistoryBook {
    channels: Mutex<BTreeMap<u32, ChannelProperties>>,
}

impl PropertyHistoryBook {
    /// Create an empty history book
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new version of a property and make it current
    ///
    /// The previous current version loses the reference it held as current.
    /// Returns the id of the new version.
    pub fn set_property(&self, channel_id: u32, key: &str, data: Bytes) -> HistoryId {
        let mut channels = self.channels.lock();
        let channel = channels.entry(channel_id).or_default();

        let Some(histories) = channel.get_mut(key) else {
            channel.insert(key.to_string(), PropertyHistories::new(data));
            tracing::debug!(
                channel_id = channel_id,
                key = key,
                history_id = 1,
                "Property history added"
            );
            return 1;
        };

        let previous = histories.current_history_id;
        let next = previous.wrapping_add(1);
        // supersede first so the old entry may drop to zero
        histories.current_history_id = next;
        histories.histories.insert(
            next,
            History {
                data,
                referenced: 1,
            },
        );
        histories.release(key, previous);

        tracing::debug!(
            channel_id = channel_id,
            key = key,
            history_id = next,
            "Property history added"
        );
        next
    }

    /// Check out the current version of every property on a channel
    ///
    /// Each returned version gains one reference and stays readable until it
    /// is handed back with [`release_properties`](Self::release_properties).
    pub fn reference_current_properties(&self, channel_id: u32) -> PropertyReferences {
        let mut channels = self.channels.lock();
        let mut current = PropertyReferences::new();

        if let Some(channel) = channels.get_mut(&channel_id) {
            for (key, histories) in channel.iter_mut() {
                let id = histories.current_history_id;
                if let Some(history) = histories.histories.get_mut(&id) {
                    history.referenced += 1;
                    tracing::debug!(
                        channel_id = channel_id,
                        key = %key,
                        history_id = id,
                        referenced = history.referenced,
                        "Property history referenced"
                    );
                    current.insert(key.clone(), id);
                }
            }
        }

        current
    }

    /// Hand back versions checked out by `reference_current_properties`
    ///
    /// Unknown channels, keys or ids are ignored.
    pub fn release_properties(&self, channel_id: u32, properties: &PropertyReferences) {
        let mut channels = self.channels.lock();
        let Some(channel) = channels.get_mut(&channel_id) else {
            return;
        };

        for (key, history_id) in properties {
            if let Some(histories) = channel.get_mut(key) {
                histories.release(key, *history_id);
            }
        }
    }

    /// Read a specific version of a property
    pub fn get_property(&self, channel_id: u32, key: &str, history_id: HistoryId) -> Result<Bytes> {
        let channels = self.channels.lock();
        channels
            .get(&channel_id)
            .and_then(|channel| channel.get(key))
            .and_then(|histories| histories.histories.get(&history_id))
            .map(|history| history.data.clone())
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "unknown history: ch={}, key={}, id={}",
                    channel_id, key, history_id
                ))
            })
    }

    /// Keys on a channel that changed since `stream` last asked
    ///
    /// A key never reported to the stream counts as updated. The stream's
    /// recorded position advances to the current version of every key.
    pub fn get_updated_property_list(&self, stream: StreamId, channel_id: u32) -> Vec<String> {
        let mut channels = self.channels.lock();
        let mut updated = Vec::new();

        if let Some(channel) = channels.get_mut(&channel_id) {
            for (key, histories) in channel.iter_mut() {
                let current = histories.current_history_id;
                let last = histories.last_access_id.entry(stream).or_insert(0);
                if *last < current {
                    *last = current;
                    updated.push(key.clone());
                }
            }
        }

        updated
    }

    /// Forget everything recorded about a stream's observed versions
    pub fn remove_updated_property_list(&self, stream: StreamId) {
        let mut channels = self.channels.lock();
        for channel in channels.values_mut() {
            for histories in channel.values_mut() {
                histories.last_access_id.remove(&stream);
            }
        }
    }

    /// Current history id of a property, if the property exists
    pub fn current_history_id(&self, channel_id: u32, key: &str) -> Option<HistoryId> {
        let channels = self.channels.lock();
        channels
            .get(&channel_id)
            .and_then(|channel| channel.get(key))
            .map(|histories| histories.current_history_id)
    }

    /// Reference count of a stored version, `None` once it was dropped
    pub fn referenced_count(&self, channel_id: u32, key: &str, history_id: HistoryId) -> Option<u32> {
        let channels = self.channels.lock();
        channels
            .get(&channel_id)
            .and_then(|channel| channel.get(key))
            .and_then(|histories| histories.histories.get(&history_id))
            .map(|history| history.referenced)
    }

    /// Drop every channel and all of its history
    pub fn clear_all(&self) {
        self.channels.lock().clear();
    }
}
