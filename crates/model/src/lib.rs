//! An abstraction layer for hosted chat models.
//!
//! This crate establishes a unified protocol for the conversation core to
//! talk to a remote model, so that the core can stream replies from any
//! supported backend (or a scripted fake in tests) without knowing which
//! one it is.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
