//! Core logic including conversation tree reconstruction, reply streaming,
//! branch navigation, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod backend_client;
mod chat;
mod error;
pub mod history;
mod receiving;
mod session;
pub mod tree;

pub use backend_client::DEFAULT_HISTORY_RETRY;
pub use chat::ChatState;
pub use error::Error;
pub use receiving::{
    ABORT_MARKER, OutgoingMessage, PENDING_REPLY_TEXT, ReceivingBuffer,
    ReplyOutcome,
};
pub use session::{Session, SessionBuilder};
