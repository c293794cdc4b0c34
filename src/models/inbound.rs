//! Inbound chat events and location token decoding.

use regex::Regex;

use super::coordinate::Coordinate;
use super::requester::RequesterId;
use crate::{AppError, Result};

/// Closed set of inbound chat events the relay reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Free text, scanned for encoded location tokens.
    Text {
        /// Chat identity that sent the text and receives replies.
        from: RequesterId,
        /// Message body.
        text: String,
    },
    /// Structured geolocation shared by the platform.
    Location {
        /// Chat identity that shared the location.
        from: RequesterId,
        /// Shared point.
        coordinate: Coordinate,
    },
    /// Anything else; ignored.
    Other,
}

/// Recognizes a single whitespace-delimited token as a location.
pub trait LocationDecoder: Send + Sync {
    /// Decode `token`, returning `None` when it is not a location.
    fn decode(&self, token: &str) -> Option<Coordinate>;
}

/// Decoder for RFC 5870 `geo:` URIs (`geo:<lat>,<lon>[,<alt>][;params]`).
#[derive(Debug, Clone)]
pub struct GeoUriDecoder {
    pattern: Regex,
}

impl GeoUriDecoder {
    /// Compile the `geo:` URI matcher.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the pattern fails to compile.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"(?i)^geo:(-?\d+(?:\.\d+)?),(-?\d+(?:\.\d+)?)(?:,-?\d+(?:\.\d+)?)?(?:;\S*)?$",
        )
        .map_err(|err| AppError::Config(format!("invalid geo uri pattern: {err}")))?;
        Ok(Self { pattern })
    }
}

impl LocationDecoder for GeoUriDecoder {
    fn decode(&self, token: &str) -> Option<Coordinate> {
        let captures = self.pattern.captures(token)?;
        // geo: URIs put latitude first.
        let latitude: f64 = captures.get(1)?.as_str().parse().ok()?;
        let longitude: f64 = captures.get(2)?.as_str().parse().ok()?;
        Coordinate::new(longitude, latitude).ok()
    }
}

/// Decode every location token in `text`, in order of appearance.
#[must_use]
pub fn scan_locations(decoder: &dyn LocationDecoder, text: &str) -> Vec<Coordinate> {
    text.split_whitespace()
        .filter_map(|token| decoder.decode(token))
        .collect()
}
