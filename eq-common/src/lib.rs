//! eq-common - Shared contract types for the EQ ingestion services
//!
//! Holds the pieces every service and downstream consumer agrees on:
//! the versioned `EnvelopeV1` event schema, the stream/bus record
//! wrappers, common error types, and UUID helpers.

pub mod envelope;
pub mod error;
pub mod events;
pub mod uuid_utils;

pub use error::{Error, Result};
