//! Domain models shared by the pipe core and the chat adapter.

pub mod coordinate;
pub mod inbound;
pub mod requester;
pub mod watershed;

pub use coordinate::Coordinate;
pub use inbound::{GeoUriDecoder, InboundEvent, LocationDecoder};
pub use requester::{LocationRequest, RequesterId};
pub use watershed::{HucLevel, WatershedStack};
