//! Property lock manager
//!
//! Arbitrates access to a port's properties between streams. Two access
//! modes share one lock table:
//!
//! - **Explicit locks** (`lock_property`/`unlock_property`) give one stream
//!   exclusive ownership of a set of keys until it unlocks or closes.
//! - **Transient access** (`start_property_access`) brackets a single get/set
//!   call. A set is refused while another stream holds the key; the lock
//!   owner's own sets go through.
//!
//! An explicit lock is granted only when nobody holds the key and no
//! transient access is in flight, so a blocked locker waits on the shared
//! condition variable until accesses drain or the holder unlocks.
//!
//! Keys may be partitioned by append information (`key[ch=1]`). A lock on
//! the bare key covers every partition; a partition conflicts with the bare
//! key and with itself only.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result, ResultExt};
use crate::property::key::PropertyKey;
use crate::stream::StreamId;

/// Handle to a granted explicit lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockHandle(u64);

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// Lock state of one key partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockInfo {
    /// Stream holding an explicit lock, if any
    pub locked_stream: Option<StreamId>,
    /// Number of in-flight transient accesses
    pub accessing_streams: u32,
}

impl LockInfo {
    fn is_lockable(&self) -> bool {
        self.locked_stream.is_none() && self.accessing_streams == 0
    }

    fn is_locked_by_other(&self, stream: StreamId) -> bool {
        matches!(self.locked_stream, Some(owner) if owner != stream)
    }
}

/// Keys held by one explicit lock
#[derive(Debug, Clone)]
pub struct PropertyLockResource {
    stream: StreamId,
    keys: BTreeSet<PropertyKey>,
}

impl PropertyLockResource {
    /// Stream owning the lock
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Locked keys
    pub fn keys(&self) -> &BTreeSet<PropertyKey> {
        &self.keys
    }
}

/// Arguments handed to the lock callback
#[derive(Debug, Clone)]
pub struct LockPropertyArgs {
    /// Full keys being locked
    pub keys: BTreeSet<String>,
    /// Handle the lock will be returned under
    pub handle: LockHandle,
    /// Remaining wait budget (0 = poll, negative = forever)
    pub timeout_msec: i32,
}

/// Invoked after all keys are acquired; a failure rolls the lock back
pub type OnLockProperty = dyn Fn(&LockPropertyArgs) -> Result<()> + Send + Sync;

/// Invoked before keys are released; a failure keeps the lock
pub type OnUnlockProperty = dyn Fn(LockHandle, &PropertyLockResource) -> Result<()> + Send + Sync;

/// Partition (append info) → lock state, for one base key
type KeyInfo = BTreeMap<String, LockInfo>;

#[derive(Default)]
struct LockTable {
    lock_info_map: HashMap<String, KeyInfo>,
    resources: HashMap<LockHandle, PropertyLockResource>,
    next_handle: u64,
    on_lock: Option<Arc<OnLockProperty>>,
    on_unlock: Option<Arc<OnUnlockProperty>>,
}

impl LockTable {
    fn lock_info(&self, key: &PropertyKey) -> Option<&LockInfo> {
        self.lock_info_map
            .get(key.property_key())
            .and_then(|key_info| key_info.get(key.append_info()))
    }

    fn check_double_lock(
        &self,
        label: &str,
        stream: StreamId,
        keys: &BTreeSet<PropertyKey>,
    ) -> Result<()> {
        for key in keys {
            let Some(key_info) = self.lock_info_map.get(key.property_key()) else {
                continue;
            };
            let locked_by = |append: &str| {
                key_info
                    .get(append)
                    .is_some_and(|info| info.locked_stream == Some(stream))
            };
            let double = if key.append_info().is_empty() {
                key_info
                    .values()
                    .any(|info| info.locked_stream == Some(stream))
            } else {
                locked_by(key.append_info()) || locked_by("")
            };
            if double {
                return Err(Error::invalid_operation(format!(
                    "{}: double locking: {}",
                    label,
                    key.full_key()
                )));
            }
        }
        Ok(())
    }

    /// Partitions of `key` that a lock or set on `key` must respect
    fn related<'a>(&'a self, key: &'a PropertyKey) -> impl Iterator<Item = &'a LockInfo> + 'a {
        let key_info = self.lock_info_map.get(key.property_key());
        let append = key.append_info();
        key_info
            .into_iter()
            .flat_map(move |key_info| {
                key_info
                    .iter()
                    .filter(move |(partition, _)| {
                        append.is_empty() || partition.is_empty() || partition.as_str() == append
                    })
                    .map(|(_, info)| info)
            })
    }

    fn acquire_lock(&mut self, label: &str, stream: StreamId, key: &PropertyKey) -> Result<()> {
        if let Some(info) = self.related(key).find(|info| !info.is_lockable()) {
            return Err(Error::invalid_operation(format!(
                "{}: locked other stream: {:?}, accessing: {}",
                label, info.locked_stream, info.accessing_streams
            )));
        }
        self.lock_info_map
            .entry(key.property_key().to_string())
            .or_default()
            .entry(key.append_info().to_string())
            .or_default()
            .locked_stream = Some(stream);
        Ok(())
    }

    fn acquire_set_access(&mut self, label: &str, stream: StreamId, key: &PropertyKey) -> Result<()> {
        if let Some(info) = self.related(key).find(|info| info.is_locked_by_other(stream)) {
            return Err(Error::busy(format!(
                "{}: property accessing is locked by other stream: {:?}",
                label, info.locked_stream
            )));
        }
        self.lock_info_map
            .entry(key.property_key().to_string())
            .or_default()
            .entry(key.append_info().to_string())
            .or_default()
            .accessing_streams += 1;
        Ok(())
    }

    /// Clear the explicit lock on `key`, pruning entries nobody uses
    fn release_lock_info(&mut self, key: &PropertyKey) {
        let Some(key_info) = self.lock_info_map.get_mut(key.property_key()) else {
            return;
        };
        if let Some(info) = key_info.get_mut(key.append_info()) {
            info.locked_stream = None;
            tracing::debug!(
                key = key.property_key(),
                append = key.append_info(),
                accessing = info.accessing_streams,
                "Lock info released"
            );
            if info.accessing_streams == 0 {
                key_info.remove(key.append_info());
            }
        }
        if key_info.is_empty() {
            self.lock_info_map.remove(key.property_key());
        }
    }

    fn end_access(&mut self, key: &PropertyKey) {
        let Some(key_info) = self.lock_info_map.get_mut(key.property_key()) else {
            return;
        };
        if let Some(info) = key_info.get_mut(key.append_info()) {
            info.accessing_streams = info.accessing_streams.saturating_sub(1);
            if info.accessing_streams == 0 && info.locked_stream.is_none() {
                key_info.remove(key.append_info());
            }
        }
        if key_info.is_empty() {
            self.lock_info_map.remove(key.property_key());
        }
    }
}

/// Per-port property lock table
pub struct PropertyLockManager {
    label: String,
    table: Mutex<LockTable>,
    cond: Condvar,
}

impl fmt::Debug for PropertyLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyLockManager")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl PropertyLockManager {
    /// Create a lock manager; `label` identifies the owning port in messages
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            table: Mutex::new(LockTable::default()),
            cond: Condvar::new(),
        }
    }

    /// Lock a set of keys for exclusive use by `stream`
    ///
    /// Keys are acquired one by one. When a key is busy the call waits:
    /// `timeout_msec == 0` fails immediately, a negative value waits forever,
    /// a positive value waits up to that many milliseconds. `is_attached` is
    /// consulted on every attempt; a stream that has left the port fails with
    /// `InvalidOperation`. Any failure releases the keys acquired so far.
    pub fn lock_property<F>(
        &self,
        stream: StreamId,
        keys: &BTreeSet<PropertyKey>,
        timeout_msec: i32,
        is_attached: F,
    ) -> Result<LockHandle>
    where
        F: Fn(StreamId) -> bool,
    {
        let mut table = self.table.lock();
        table.check_double_lock(&self.label, stream, keys)?;

        let deadline = (timeout_msec > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_msec as u64));

        let mut locked: Vec<&PropertyKey> = Vec::with_capacity(keys.len());
        let mut result = Ok(());

        'keys: for key in keys {
            loop {
                if !is_attached(stream) {
                    result = Err(Error::invalid_operation(format!(
                        "{}: {} is not attached",
                        self.label, stream
                    )));
                    break 'keys;
                }
                let conflict = match table.acquire_lock(&self.label, stream, key) {
                    Ok(()) => {
                        locked.push(key);
                        break;
                    }
                    Err(e) => e,
                };

                let timed_out = match deadline {
                    _ if timeout_msec == 0 => true,
                    Some(deadline) => self.cond.wait_until(&mut table, deadline).timed_out(),
                    None => {
                        self.cond.wait(&mut table);
                        false
                    }
                };
                if timed_out {
                    tracing::error!(
                        lock = %self.label,
                        stream = %stream,
                        key = %key,
                        error = %conflict,
                        "Property lock wait expired"
                    );
                    result = Err(Error::timeout(conflict.message()));
                    break 'keys;
                }
            }
        }

        let handle = LockHandle(table.next_handle);
        if result.is_ok() {
            table.next_handle += 1;
            let on_lock = table.on_lock.clone();
            if let Some(callback) = on_lock {
                result = self.invoke_lock_callback(&mut table, callback, keys, handle, timeout_msec, deadline);
                // a close while unlocked has already force-released this stream
                if result.is_ok() && !is_attached(stream) {
                    result = Err(Error::invalid_operation(format!(
                        "{}: {} detached while locking",
                        self.label, stream
                    )));
                }
            }
        }

        if let Err(e) = result {
            for key in locked {
                table.release_lock_info(key);
            }
            self.cond.notify_all();
            return Err(e.trace());
        }

        table.resources.insert(
            handle,
            PropertyLockResource {
                stream,
                keys: keys.clone(),
            },
        );
        tracing::debug!(
            lock = %self.label,
            stream = %stream,
            handle = %handle,
            keys = keys.len(),
            "Properties locked"
        );
        Ok(handle)
    }

    fn invoke_lock_callback(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        callback: Arc<OnLockProperty>,
        keys: &BTreeSet<PropertyKey>,
        handle: LockHandle,
        timeout_msec: i32,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let remaining = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::timeout("lock property timeout"));
                }
                i32::try_from(deadline.duration_since(now).as_millis()).unwrap_or(i32::MAX)
            }
            None => timeout_msec,
        };
        let args = LockPropertyArgs {
            keys: keys.iter().map(|key| key.full_key().to_string()).collect(),
            handle,
            timeout_msec: remaining,
        };
        MutexGuard::unlocked(table, || callback(&args)).traced()
    }

    /// Release an explicit lock held by `stream`
    pub fn unlock_property(&self, stream: StreamId, handle: LockHandle) -> Result<()> {
        let mut table = self.table.lock();
        let resource = table.resources.get(&handle).cloned().ok_or_else(|| {
            Error::invalid_argument(format!(
                "{}: invalid resource: {}({})",
                self.label, stream, handle
            ))
        })?;

        for key in &resource.keys {
            let owner = table.lock_info(key).and_then(|info| info.locked_stream);
            if owner != Some(stream) {
                return Err(Error::invalid_argument(format!(
                    "{}: no locked stream: {}({:?})",
                    self.label, stream, owner
                )));
            }
        }

        let on_unlock = table.on_unlock.clone();
        if let Some(callback) = on_unlock {
            MutexGuard::unlocked(&mut table, || callback(handle, &resource)).traced()?;
        }

        // a concurrent close may have force-released it while unlocked
        if let Some(resource) = table.resources.remove(&handle) {
            for key in &resource.keys {
                table.release_lock_info(key);
            }
        }
        self.cond.notify_all();

        tracing::debug!(lock = %self.label, stream = %stream, handle = %handle, "Properties unlocked");
        Ok(())
    }

    /// Release every lock owned by `stream` without consulting callbacks
    ///
    /// Returns the number of released locks.
    pub fn force_unlock_property(&self, stream: StreamId) -> usize {
        let mut table = self.table.lock();
        let owned: Vec<LockHandle> = table
            .resources
            .iter()
            .filter(|(_, resource)| resource.stream == stream)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in &owned {
            if let Some(resource) = table.resources.remove(handle) {
                for key in &resource.keys {
                    table.release_lock_info(key);
                }
            }
        }
        self.cond.notify_all();

        if !owned.is_empty() {
            tracing::debug!(
                lock = %self.label,
                stream = %stream,
                released = owned.len(),
                "Force unlocked properties"
            );
        }
        owned.len()
    }

    /// Begin a transient get (`is_set == false`) or set access to `key`
    ///
    /// A set fails `Busy` while another stream holds the key. The returned
    /// guard ends the access when dropped and wakes blocked lockers.
    pub fn start_property_access(
        &self,
        stream: StreamId,
        key: &PropertyKey,
        is_set: bool,
    ) -> Result<PropertyAccessGuard<'_>> {
        if !is_set {
            return Ok(PropertyAccessGuard {
                manager: self,
                key: None,
            });
        }

        let mut table = self.table.lock();
        table.acquire_set_access(&self.label, stream, key)?;
        Ok(PropertyAccessGuard {
            manager: self,
            key: Some(key.clone()),
        })
    }

    fn end_property_access(&self, key: &PropertyKey) {
        let mut table = self.table.lock();
        table.end_access(key);
        self.cond.notify_all();
    }

    /// Install the callback invoked once a lock is acquired
    pub fn register_lock_callback<F>(&self, callback: F)
    where
        F: Fn(&LockPropertyArgs) -> Result<()> + Send + Sync + 'static,
    {
        self.table.lock().on_lock = Some(Arc::new(callback));
    }

    /// Install the callback invoked before a lock is released
    pub fn register_unlock_callback<F>(&self, callback: F)
    where
        F: Fn(LockHandle, &PropertyLockResource) -> Result<()> + Send + Sync + 'static,
    {
        self.table.lock().on_unlock = Some(Arc::new(callback));
    }

    /// Snapshot of the lock state of a key partition
    pub fn lock_info(&self, key: &PropertyKey) -> Option<LockInfo> {
        self.table.lock().lock_info(key).cloned()
    }

    /// Snapshot of a granted lock
    pub fn resource(&self, handle: LockHandle) -> Option<PropertyLockResource> {
        self.table.lock().resources.get(&handle).cloned()
    }

    /// Number of granted locks
    pub fn resource_count(&self) -> usize {
        self.table.lock().resources.len()
    }
}

/// In-flight transient property access
///
/// Dropping the guard ends the access.
#[must_use = "the access ends when the guard is dropped"]
pub struct PropertyAccessGuard<'a> {
    manager: &'a PropertyLockManager,
    key: Option<PropertyKey>,
}

impl fmt::Debug for PropertyAccessGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessGuard")
            .field("key", &self.key)
            .finish()
    }
}

impl Drop for PropertyAccessGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.manager.end_property_access(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::error::ErrorKind;

    const A: StreamId = StreamId::from_raw(1);
    const B: StreamId = StreamId::from_raw(2);

    fn keys(names: &[&str]) -> BTreeSet<PropertyKey> {
        names.iter().map(|n| PropertyKey::parse(n).unwrap()).collect()
    }

    fn key(name: &str) -> PropertyKey {
        PropertyKey::parse(name).unwrap()
    }

    fn attached(_: StreamId) -> bool {
        true
    }

    #[test]
    fn test_lock_and_unlock() {
        let manager = PropertyLockManager::new("cam(image.0)");

        let handle = manager.lock_property(A, &keys(&["gain", "exposure"]), 0, attached).unwrap();
        assert_eq!(manager.resource_count(), 1);
        assert_eq!(manager.lock_info(&key("gain")).unwrap().locked_stream, Some(A));

        manager.unlock_property(A, handle).unwrap();
        assert_eq!(manager.resource_count(), 0);
        assert!(manager.lock_info(&key("gain")).is_none());
    }

    #[test]
    fn test_double_lock_rejected() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap();

        let err = manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(err.message().contains("double locking"));

        // a partition of a wholly locked key is also a double lock
        let err = manager.lock_property(A, &keys(&["gain[ch=1]"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_bare_key_lock_covers_partitions() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.lock_property(A, &keys(&["reg[ch=1]"]), 0, attached).unwrap();

        // the same stream locking the bare key is a double lock
        let err = manager.lock_property(A, &keys(&["reg"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        // another partition is independent
        manager.lock_property(B, &keys(&["reg[ch=2]"]), 0, attached).unwrap();

        // the bare key conflicts with both partitions
        let c = StreamId::from_raw(3);
        let err = manager.lock_property(c, &keys(&["reg"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_poll_timeout_rolls_back() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.lock_property(A, &keys(&["b"]), 0, attached).unwrap();

        let err = manager.lock_property(B, &keys(&["a", "b"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        // "a" was acquired first and must have been released again
        assert!(manager.lock_info(&key("a")).is_none());
        assert_eq!(manager.resource_count(), 1);
    }

    #[test]
    fn test_timed_wait_expires() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap();

        let started = Instant::now();
        let err = manager.lock_property(B, &keys(&["gain"]), 30, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_waiter_acquires_after_unlock() {
        let manager = PropertyLockManager::new("cam(image.0)");
        let handle = manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| manager.lock_property(B, &keys(&["gain"]), -1, attached));
            thread::sleep(Duration::from_millis(20));
            manager.unlock_property(A, handle).unwrap();

            let handle = waiter.join().unwrap().unwrap();
            assert_eq!(manager.resource(handle).unwrap().stream(), B);
        });
    }

    #[test]
    fn test_detached_stream_cannot_lock() {
        let manager = PropertyLockManager::new("cam(image.0)");

        let err = manager.lock_property(A, &keys(&["gain"]), 0, |_| false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(manager.lock_info(&key("gain")).is_none());
    }

    #[test]
    fn test_lock_callback_failure_rolls_back() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.register_lock_callback(|args| {
            assert_eq!(args.keys.len(), 2);
            Err(Error::busy("device refused"))
        });

        let err = manager.lock_property(A, &keys(&["a", "b"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(manager.lock_info(&key("a")).is_none());
        assert!(manager.lock_info(&key("b")).is_none());
        assert_eq!(manager.resource_count(), 0);
    }

    #[test]
    fn test_detached_during_lock_callback_rolls_back() {
        let manager = PropertyLockManager::new("cam(image.0)");
        let opened = Arc::new(AtomicBool::new(true));
        let closing = opened.clone();
        manager.register_lock_callback(move |_| {
            closing.store(false, Ordering::SeqCst);
            Ok(())
        });

        let err = manager
            .lock_property(A, &keys(&["gain"]), 0, |_| opened.load(Ordering::SeqCst))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(manager.lock_info(&key("gain")).is_none());
        assert_eq!(manager.resource_count(), 0);

        manager.register_lock_callback(|_| Ok(()));
        manager.lock_property(B, &keys(&["gain"]), 0, attached).unwrap();
    }

    #[test]
    fn test_unlock_validation_and_callback() {
        let manager = PropertyLockManager::new("cam(image.0)");
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        manager.register_unlock_callback(move |_, resource| {
            assert_eq!(resource.stream(), A);
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let handle = manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap();

        let err = manager.unlock_property(B, handle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        manager.unlock_property(A, handle).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = manager.unlock_property(A, handle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_force_unlock_skips_callbacks() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.register_unlock_callback(|_, _| Err(Error::busy("never called")));

        manager.lock_property(A, &keys(&["a"]), 0, attached).unwrap();
        manager.lock_property(A, &keys(&["b"]), 0, attached).unwrap();
        manager.lock_property(B, &keys(&["c"]), 0, attached).unwrap();

        assert_eq!(manager.force_unlock_property(A), 2);
        assert_eq!(manager.resource_count(), 1);
        assert!(manager.lock_info(&key("a")).is_none());
        assert_eq!(manager.lock_info(&key("c")).unwrap().locked_stream, Some(B));
    }

    #[test]
    fn test_set_access_respects_owner() {
        let manager = PropertyLockManager::new("cam(image.0)");
        manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap();

        // the owner may set
        let guard = manager.start_property_access(A, &key("gain"), true).unwrap();
        assert_eq!(manager.lock_info(&key("gain")).unwrap().accessing_streams, 1);
        drop(guard);
        assert_eq!(manager.lock_info(&key("gain")).unwrap().accessing_streams, 0);

        // others may not set, but may get
        let err = manager.start_property_access(B, &key("gain"), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        let err = manager.start_property_access(B, &key("gain[ch=0]"), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(manager.start_property_access(B, &key("gain"), false).is_ok());
    }

    #[test]
    fn test_access_blocks_lock_until_done() {
        let manager = PropertyLockManager::new("cam(image.0)");
        let guard = manager.start_property_access(B, &key("gain"), true).unwrap();

        let err = manager.lock_property(A, &keys(&["gain"]), 0, attached).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        thread::scope(|s| {
            let waiter = s.spawn(|| manager.lock_property(A, &keys(&["gain"]), 1000, attached));
            thread::sleep(Duration::from_millis(20));
            drop(guard);
            assert!(waiter.join().unwrap().is_ok());
        });
    }

    #[test]
    fn test_access_entry_pruned() {
        let manager = PropertyLockManager::new("cam(image.0)");

        let guard = manager.start_property_access(A, &key("gain[ch=3]"), true).unwrap();
        assert!(manager.lock_info(&key("gain[ch=3]")).is_some());
        drop(guard);
        assert!(manager.lock_info(&key("gain[ch=3]")).is_none());
    }
}
