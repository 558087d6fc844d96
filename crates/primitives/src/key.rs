//! Content keys.

use core::fmt;

use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};

/// Content address naming an immutable block.
///
/// Keys travel on the wire in their string form. Keys produced locally with
/// [`BlockKey::for_data`] are the lowercase hex keccak-256 digest of the
/// block data, which lets a receiver check that a delivered block matches the
/// key it was requested under.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockKey(String);

impl BlockKey {
    /// Wrap an existing key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the content key for `data`.
    pub fn for_data(data: &[u8]) -> Self {
        Self(hex::encode(keccak256(data)))
    }

    /// Whether `data` hashes to this key.
    pub fn matches(&self, data: &[u8]) -> bool {
        *self == Self::for_data(data)
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty (never valid on the wire).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the key, returning the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests drown log lines; eight hex chars are plenty to tell keys apart.
        match self.0.get(..8) {
            Some(prefix) if self.0.len() > 8 => write!(f, "BlockKey({prefix}..)"),
            _ => write!(f, "BlockKey({})", self.0),
        }
    }
}

impl From<&str> for BlockKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for BlockKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for BlockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
