//! Worker wire protocol: request encoding and response decoding.
//!
//! | Version    | Request line                                        | Response correlated by |
//! |------------|-----------------------------------------------------|------------------------|
//! | `echo-id`  | `{"requestId":"C1","longitude":-122.3,"latitude":47.6}` | echoed `requestId`  |
//! | `geometry` | `POINT(-122.3 47.6)`                                | echoed `longitude`/`latitude` |
//!
//! Every response is one JSON object per line group carrying optional
//! `huc2` … `huc16` levels and an optional `pointNotInDataset` flag.

use serde::{Deserialize, Serialize};

use crate::models::{Coordinate, LocationRequest, RequesterId, WatershedStack};
use crate::pipe::correlation::{CorrelationKey, CorrelationStrategy};
use crate::{AppError, Result};

/// Wire protocol spoken with the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVersion {
    /// JSON requests carrying `requestId`; the worker echoes it back.
    #[default]
    EchoId,
    /// Bare `POINT(lon lat)` requests; responses echo the coordinate.
    Geometry,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EchoIdRequest<'a> {
    request_id: &'a RequesterId,
    longitude: f64,
    latitude: f64,
}

impl ProtocolVersion {
    /// Correlation strategy this version requires.
    #[must_use]
    pub fn correlation_strategy(self) -> CorrelationStrategy {
        match self {
            Self::EchoId => CorrelationStrategy::EchoId,
            Self::Geometry => CorrelationStrategy::DerivedKey,
        }
    }

    /// Encode `request` as a single line, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if JSON serialization fails.
    pub fn encode_request(self, request: &LocationRequest) -> Result<String> {
        match self {
            Self::EchoId => {
                let wire = EchoIdRequest {
                    request_id: &request.requester,
                    longitude: request.coordinate.longitude,
                    latitude: request.coordinate.latitude,
                };
                Ok(serde_json::to_string(&wire)?)
            }
            Self::Geometry => Ok(request.coordinate.to_wkt()),
        }
    }
}

/// One decoded worker response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    /// Echoed requester identity (`echo-id` protocol).
    #[serde(default)]
    pub request_id: Option<RequesterId>,
    /// Echoed query longitude (`geometry` protocol).
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Echoed query latitude (`geometry` protocol).
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Classification result.
    #[serde(flatten)]
    pub stack: WatershedStack,
}

impl WorkerResponse {
    /// Key that identifies the request this response answers.
    ///
    /// An echoed `requestId` wins over echoed coordinates.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` when the response carries neither.
    pub fn correlation_key(&self) -> Result<CorrelationKey> {
        if let Some(id) = &self.request_id {
            return Ok(CorrelationKey::Echoed(id.clone()));
        }
        match (self.longitude, self.latitude) {
            (Some(longitude), Some(latitude)) => Ok(CorrelationKey::Derived(
                Coordinate {
                    longitude,
                    latitude,
                }
                .canonical_key(),
            )),
            _ => Err(AppError::Protocol(
                "response carries neither requestId nor coordinates".into(),
            )),
        }
    }
}

/// Parse one line group from the worker.
///
/// # Return value
///
/// - `Ok(Some(response))` for a well-formed response object.
/// - `Ok(None)` for a blank group.
///
/// # Errors
///
/// Returns `AppError::Protocol("malformed json: …")` if the group is not a
/// response object.
pub fn parse_response(group: &str) -> Result<Option<WorkerResponse>> {
    if group.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(group)?))
}
