//! Short opaque identifiers for connections and outstanding calls.
//!
//! Both are cut from the simple (hyphen-free) form of a random UUID v4, so
//! every character is a lowercase hex digit.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length of a generated connection identifier.
pub const CONNECTION_ID_LEN: usize = 8;

/// Length of a generated request identifier (48 random bits).
pub const REQUEST_ID_LEN: usize = 12;

fn random_hex(len: usize) -> String {
    let mut simple = Uuid::new_v4().simple().to_string();
    simple.truncate(len);
    simple
}

/// Identifier the registry assigns to a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random connection id
    pub fn generate() -> Self {
        Self(random_hex(CONNECTION_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier correlating an outbound request with its reply.
///
/// Peers echo it back verbatim as the reply's `callbackId`, so any string a
/// peer sends is accepted when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random request id
    pub fn generate() -> Self {
        Self(random_hex(REQUEST_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
