//! A terminal chat client for hosted language models.
//!
//! The crate includes a CLI tool for chatting in the terminal. The renderer
//! and the live view can also be used as a library to show a conversation
//! from [`omnichat_core`] in your own program.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod command;
#[cfg(feature = "cli")]
pub mod log_sink;
pub mod render;
pub mod view;

/// Re-exports of [`omnichat_core`] crate.
pub mod core {
    pub use omnichat_core::*;
}

/// Re-exports of [`omnichat_model`] crate.
pub mod model {
    pub use omnichat_model::*;
}

/// Re-exports of [`omnichat_gemini_model`] crate.
pub mod gemini {
    pub use omnichat_gemini_model::*;
}
