#![forbid(unsafe_code)]

//! Chat relay answering location messages with watershed lookups.
//!
//! A long-running worker process performs the lookups over a line-oriented
//! stdio protocol; [`pipe`] frames its output and correlates responses back to
//! the requesting chat identity.

pub mod config;
pub mod delivery;
pub mod errors;
pub mod models;
pub mod pipe;
pub mod slack;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
