//! A terminal front end for LAYRA conversations.
//!
//! The crate includes a CLI tool for browsing and continuing a conversation
//! in the terminal. The command parsing and rendering used by the tool are
//! exposed as a library.

#![deny(missing_docs)]

mod command;
mod render;

pub use command::{Command, ParseError, fork_of_turn, next_line};
pub use render::render_path;

/// Re-exports of [`layra_core`] crate.
pub mod core {
    pub use layra_core::*;
}

/// Re-exports of [`layra_client`] crate.
pub mod client {
    pub use layra_client::*;
}
