//! Property keys, locks and versioned snapshots
//!
//! - [`key`]: parsing of `name[append]` keys into base key and partition
//! - [`lock`]: per-port arbitration between explicit locks and transient
//!   get/set access
//! - [`history`]: reference-counted property snapshots per channel

pub mod history;
pub mod key;
pub mod lock;

pub use history::{HistoryId, PropertyHistoryBook, PropertyReferences};
pub use key::{PropertyKey, CHANNEL_TAG};
pub use lock::{
    LockHandle, LockInfo, LockPropertyArgs, OnLockProperty, OnUnlockProperty, PropertyAccessGuard,
    PropertyLockManager, PropertyLockResource,
};
