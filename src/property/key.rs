//! Property key parsing
//!
//! A property key may carry append information that partitions it into
//! sub-resources, e.g. `register_access[ch=1,addr=0x10]`. The part before the
//! brackets is the base key used to look up accessors; the bracketed part is
//! the partition used by the lock table.

use std::fmt;

use crate::error::{Error, Result};

/// Append tag naming the channel a property applies to
pub const CHANNEL_TAG: &str = "ch=";

/// Parsed property key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKey {
    full_key: String,
    key_end: usize,
    append_range: Option<(usize, usize)>,
}

impl PropertyKey {
    /// Parse a full key of the form `name` or `name[append]`
    pub fn parse(key: &str) -> Result<Self> {
        let open = key.find('[');
        let close = key.rfind(']');

        match (open, close) {
            (None, None) if !key.is_empty() => Ok(Self {
                full_key: key.to_string(),
                key_end: key.len(),
                append_range: None,
            }),
            (Some(open), Some(close)) if open > 0 && close == key.len() - 1 => {
                // innermost bracket pair holds the append info
                let last_open = key.rfind('[').unwrap_or(open);
                let first_close = key.find(']').unwrap_or(close);
                if first_close < last_open {
                    return Err(Error::invalid_argument(format!(
                        "malformed property key: {}",
                        key
                    )));
                }
                Ok(Self {
                    full_key: key.to_string(),
                    key_end: open,
                    append_range: Some((last_open + 1, first_close)),
                })
            }
            _ => Err(Error::invalid_argument(format!(
                "malformed property key: {:?}",
                key
            ))),
        }
    }

    /// Key including append information
    pub fn full_key(&self) -> &str {
        &self.full_key
    }

    /// Base key without append information
    pub fn property_key(&self) -> &str {
        &self.full_key[..self.key_end]
    }

    /// Append information, empty when the key is not partitioned
    pub fn append_info(&self) -> &str {
        match self.append_range {
            Some((begin, end)) => &self.full_key[begin..end],
            None => "",
        }
    }

    /// Channel id from the `ch=` append tag, if present
    pub fn channel_id(&self) -> Option<u32> {
        self.append_info()
            .split(',')
            .find_map(|element| element.strip_prefix(CHANNEL_TAG))
            .and_then(|value| parse_u32(value.trim()))
    }
}

fn parse_u32(value: &str) -> Option<u32> {
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_key)
    }
}

impl std::str::FromStr for PropertyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
