//! Property accessor registered by a component

use bytes::Bytes;

use crate::error::Result;

/// Get/set handler for one property key
///
/// `key` passed to `get`/`set` is the full key including append
/// information, so one accessor serves every partition of its base key.
pub trait PropertyAccessor: Send + Sync {
    /// Base key this accessor is registered under
    fn key(&self) -> &str;

    /// Read the property; `input` carries request parameters, if any
    fn get(&self, key: &str, input: Bytes) -> Result<Bytes>;

    fn set(&self, key: &str, value: Bytes) -> Result<()>;
}
