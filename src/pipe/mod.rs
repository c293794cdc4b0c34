//! Pipe protocol core.
//!
//! - `aggregator`: chunk-safe line-group framing of worker output.
//! - `protocol`: request encoding and response decoding per [`ProtocolVersion`].
//! - `correlation`: matching responses back to requesters.
//! - `orchestrator`: the request path and the response dispatch loop.

pub mod aggregator;
pub mod correlation;
pub mod orchestrator;
pub mod protocol;

pub use aggregator::LineGroupCodec;
pub use correlation::{CorrelationKey, CorrelationLimits, CorrelationStore, CorrelationStrategy};
pub use orchestrator::PipeOrchestrator;
pub use protocol::{ProtocolVersion, WorkerResponse};
