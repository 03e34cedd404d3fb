//! Shared types for the LAYRA chat client.
//!
//! This crate establishes the records that flow between the backend, the
//! conversation tree and whatever front end renders it: chat messages,
//! history turns, streaming reply events, and the [`ChatBackend`] protocol
//! that a backend implementation must follow.
//!
//! Types in this crate don't define any behavior beyond constructors and
//! accessors, the actual logic lives in `layra-core`.

#![deny(missing_docs)]

mod backend;
mod error;
mod message;
mod request;
mod response;

pub use backend::*;
pub use error::*;
pub use message::*;
pub use request::*;
pub use response::*;
