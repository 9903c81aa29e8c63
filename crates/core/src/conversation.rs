//! The conversation controller: turns user input into transcript mutations
//! and model calls.

mod builder;
mod state;

use std::error::Error;
use std::fmt;

use tokio::sync::{mpsc, oneshot};

pub use builder::ConversationBuilder;
use state::Command;

use crate::transcript::Message;

/// The greeting shown when a conversation starts.
pub const DEFAULT_GREETING: &str = "Hello! I'm OmniChat. I can answer questions, help you with code, or just chat. What's on your mind?";

/// The greeting shown after the conversation is reset.
pub const DEFAULT_RESET_GREETING: &str = "Fresh start! How can I help you now?";

/// The message appended when a turn fails, whatever the cause.
pub const ERROR_NOTICE: &str =
    "I'm sorry, I encountered an error. Please try again.";

/// A point-in-time copy of the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// All messages in arrival order.
    pub messages: Vec<Message>,
    /// Whether a turn is in flight.
    pub busy: bool,
}

/// A type of error which is returned when the conversation loop has
/// terminated.
pub struct ConversationClosedError;

impl fmt::Debug for ConversationClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationClosedError").finish()
    }
}

impl fmt::Display for ConversationClosedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "the conversation has been closed".fmt(f)
    }
}

impl Error for ConversationClosedError {}

/// Handle to a running conversation.
///
/// The conversation owns the transcript and the model session and processes
/// one command at a time in a background task. Handles are cheap to clone;
/// the task ends once the last handle is dropped, aborting any turn still in
/// flight.
#[derive(Clone)]
pub struct Conversation {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Conversation {
    /// Submits user input.
    ///
    /// The input is trimmed first. Blank input is ignored, and so is any
    /// input submitted while a turn is still in flight.
    pub fn submit<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<(), ConversationClosedError> {
        self.send(Command::Submit(text.into()))
    }

    /// Discards the transcript and the model session, leaving only the reset
    /// greeting. A turn in flight is abandoned.
    pub fn reset(&self) -> Result<(), ConversationClosedError> {
        self.send(Command::Reset)
    }

    /// Returns a copy of the current state, after every command sent before
    /// this call has been processed.
    pub async fn snapshot(&self) -> Result<Snapshot, ConversationClosedError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| ConversationClosedError)
    }

    #[inline]
    fn send(&self, cmd: Command) -> Result<(), ConversationClosedError> {
        self.cmd_tx.send(cmd).map_err(|_| ConversationClosedError)
    }
}
