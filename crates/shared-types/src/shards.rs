// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shard identifiers
//!
//! A shard identifier is the `{shardID}` path segment of a sharded request. The
//! gateway does not validate it beyond requiring a non-empty segment; resource
//! handlers decide which identifiers they serve.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque shard identifier taken from the request path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(Box<str>);

impl ShardId {
    /// Create a shard identifier from a path segment
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is empty. The decoded segment is kept as
    /// is, so an encoded `%2F` arrives as a `/`.
    pub fn new(segment: impl Into<String>) -> Result<Self, ShardIdError> {
        let segment = segment.into();
        if segment.is_empty() {
            return Err(ShardIdError::Empty);
        }
        Ok(Self(segment.into_boxed_str()))
    }

    /// The raw path segment
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ShardId {
    type Err = ShardIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ShardId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ShardId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ShardId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let segment = String::deserialize(deserializer)?;
        Self::new(segment).map_err(serde::de::Error::custom)
    }
}

/// Error type for shard identifier parsing
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ShardIdError {
    /// The path segment was empty
    #[error("shard identifier cannot be empty")]
    Empty,
}
