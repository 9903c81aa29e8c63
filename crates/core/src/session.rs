//! The remote conversation context.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use omnichat_model::{ModelMessage, ModelRequest};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a session within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// The context the remote model sees: the system instruction and every
/// completed turn so far.
///
/// A session is never cleared in place. Starting over means dropping it and
/// creating a new one.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    system_instruction: Option<String>,
    history: Vec<ModelMessage>,
}

impl Session {
    /// Creates an empty session.
    pub fn new(system_instruction: Option<String>) -> Self {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        trace!("created {id}");
        Self {
            id,
            system_instruction,
            history: Vec::new(),
        }
    }

    /// Returns the identifier of this session.
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn turn_count(&self) -> usize {
        self.history.len() / 2
    }

    /// Builds the request for a new turn carrying `prompt`.
    pub fn build_request(&self, prompt: &str) -> ModelRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(instruction) = &self.system_instruction {
            messages.push(ModelMessage::System(instruction.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ModelMessage::User(prompt.to_owned()));
        ModelRequest { messages }
    }

    /// Records a completed turn, so that later requests carry it.
    pub fn commit_turn(&mut self, prompt: String, reply: String) {
        self.history.push(ModelMessage::User(prompt));
        self.history.push(ModelMessage::Model(reply));
    }
}
