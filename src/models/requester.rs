//! Requester identity and the location request it submits.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

use super::coordinate::Coordinate;

/// Chat identity that should receive a lookup result (a Slack channel ID).
///
/// Serializes as a JSON string. Deserialization also accepts a JSON integer,
/// which older workers emit for numeric chat IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequesterId(String);

impl RequesterId {
    /// Wrap a chat identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequesterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRequesterId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl<'de> Deserialize<'de> for RequesterId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawRequesterId::deserialize(deserializer)? {
            RawRequesterId::Text(text) => Self(text),
            RawRequesterId::Signed(n) => Self(n.to_string()),
            RawRequesterId::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// A location submitted by a requester, pending a worker lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRequest {
    /// Who receives the result.
    pub requester: RequesterId,
    /// Point to classify.
    pub coordinate: Coordinate,
}

impl LocationRequest {
    /// Pair a requester with a coordinate.
    #[must_use]
    pub fn new(requester: RequesterId, coordinate: Coordinate) -> Self {
        Self {
            requester,
            coordinate,
        }
    }
}
