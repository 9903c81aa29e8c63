//! Core logic of the chat client: the transcript, the model session and the
//! conversation controller tying them to a model provider.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod model_client;
pub mod session;
pub mod transcript;

pub use conversation::{Conversation, ConversationBuilder, Snapshot};
pub use model_client::{ModelClient, StreamResult};
pub use transcript::{Message, MessageId, Role, TranscriptChange};
