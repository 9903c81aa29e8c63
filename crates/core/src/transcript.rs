//! The ordered record of what has been said in a conversation.

use std::error::Error;
use std::fmt::{self, Display};

use chrono::{DateTime, Local};

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person typing.
    User,
    /// The remote model.
    Model,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// Identifies a message within one [`TranscriptStore`].
///
/// Identifiers are handed out in increasing order and are never reused,
/// not even after a reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

/// A message in the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub(crate) id: MessageId,
    pub(crate) role: Role,
    pub(crate) text: String,
    pub(crate) created_at: DateTime<Local>,
    pub(crate) streaming: bool,
}

impl Message {
    /// Returns the identifier of this message.
    #[inline]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the author of this message.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text received so far.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns when this message was created.
    #[inline]
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Returns `true` while fragments are still arriving for this message.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// A mutation of the transcript, as seen by subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptChange {
    /// A message was appended at the end.
    Appended(Message),
    /// The streaming message grew, or became terminal.
    Updated(Message),
    /// The transcript was replaced as a whole.
    Reset(Vec<Message>),
}

/// Describes a rejected transcript mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptError {
    /// No message with this identifier exists.
    NotFound(MessageId),
    /// The message is terminal and cannot change anymore.
    Finalized(MessageId),
    /// Another message is still streaming.
    AlreadyStreaming(MessageId),
}

impl Display for TranscriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptError::NotFound(id) => write!(f, "{id} does not exist"),
            TranscriptError::Finalized(id) => write!(f, "{id} is finalized"),
            TranscriptError::AlreadyStreaming(id) => {
                write!(f, "{id} is still streaming")
            }
        }
    }
}

impl Error for TranscriptError {}

/// A callback receiving every transcript mutation.
pub type ChangeListener = Box<dyn Fn(&TranscriptChange) + Send + Sync>;

/// Ordered list of messages.
///
/// The store is append-only, except that the single streaming message may
/// grow in place until it is finished, and that the whole list may be
/// replaced by [`TranscriptStore::reset`]. Every mutation is reported to the
/// listener, if any.
#[derive(Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    next_id: u64,
    listener: Option<ChangeListener>,
}

impl TranscriptStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_listener(
        listener: impl Fn(&TranscriptChange) + Send + Sync + 'static,
    ) -> Self {
        Self {
            listener: Some(Box::new(listener)),
            ..Self::default()
        }
    }

    pub(crate) fn set_listener(&mut self, listener: Option<ChangeListener>) {
        self.listener = listener;
    }

    /// Returns all messages in arrival order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the message with the given identifier.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|msg| msg.id == id)
    }

    /// Returns the message that is still streaming, if any.
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|msg| msg.streaming)
    }

    /// Appends a terminal message.
    pub fn append<S: Into<String>>(&mut self, role: Role, text: S) -> MessageId {
        self.push(role, text.into(), false)
    }

    /// Appends an empty message that will grow with
    /// [`TranscriptStore::append_text`] until [`TranscriptStore::finish`] is
    /// called.
    pub fn begin_streaming(
        &mut self,
        role: Role,
    ) -> Result<MessageId, TranscriptError> {
        if let Some(msg) = self.streaming_message() {
            return Err(TranscriptError::AlreadyStreaming(msg.id));
        }
        Ok(self.push(role, String::new(), true))
    }

    /// Appends a fragment to the text of a streaming message.
    pub fn append_text(
        &mut self,
        id: MessageId,
        fragment: &str,
    ) -> Result<&Message, TranscriptError> {
        self.patch(id, |msg| msg.text.push_str(fragment))
    }

    /// Makes a streaming message terminal. Its text is kept as is.
    pub fn finish(&mut self, id: MessageId) -> Result<&Message, TranscriptError> {
        self.patch(id, |msg| msg.streaming = false)
    }

    /// Replaces every message with a single terminal greeting from the
    /// model.
    pub fn reset<S: Into<String>>(&mut self, greeting: S) -> MessageId {
        let id = self.allocate_id();
        self.messages = vec![Message {
            id,
            role: Role::Model,
            text: greeting.into(),
            created_at: Local::now(),
            streaming: false,
        }];
        self.notify(|| TranscriptChange::Reset(self.messages.clone()));
        id
    }

    fn push(&mut self, role: Role, text: String, streaming: bool) -> MessageId {
        let id = self.allocate_id();
        let msg = Message {
            id,
            role,
            text,
            created_at: Local::now(),
            streaming,
        };
        self.notify(|| TranscriptChange::Appended(msg.clone()));
        self.messages.push(msg);
        id
    }

    fn patch(
        &mut self,
        id: MessageId,
        f: impl FnOnce(&mut Message),
    ) -> Result<&Message, TranscriptError> {
        let msg = self
            .messages
            .iter_mut()
            .rev()
            .find(|msg| msg.id == id)
            .ok_or(TranscriptError::NotFound(id))?;
        if !msg.streaming {
            return Err(TranscriptError::Finalized(id));
        }
        f(msg);
        if let Some(listener) = &self.listener {
            listener(&TranscriptChange::Updated(msg.clone()));
        }
        Ok(msg)
    }

    #[inline]
    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    #[inline]
    fn notify(&self, change: impl FnOnce() -> TranscriptChange) {
        if let Some(listener) = &self.listener {
            listener(&change());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_append_in_order() {
        let mut store = TranscriptStore::new();
        let a = store.append(Role::User, "Hi");
        let b = store.append(Role::Model, "Hello!");
        assert!(a < b);

        let roles: Vec<_> = store.messages().iter().map(Message::role).collect();
        assert_eq!(roles, [Role::User, Role::Model]);
        assert!(store.messages().iter().all(|m| !m.is_streaming()));
        assert_eq!(store.get(b).map(Message::text), Some("Hello!"));
    }

    #[test]
    fn test_streaming_grows_in_place() {
        let mut store = TranscriptStore::new();
        store.append(Role::User, "Greet me");
        let id = store.begin_streaming(Role::Model).unwrap();

        let mut seen = Vec::new();
        for fragment in ["Hel", "lo, ", "world"] {
            let msg = store.append_text(id, fragment).unwrap();
            assert_eq!(msg.id(), id);
            seen.push(msg.text().to_owned());
        }
        assert_eq!(seen, ["Hel", "Hello, ", "Hello, world"]);
        assert_eq!(store.streaming_message().map(Message::id), Some(id));

        let msg = store.finish(id).unwrap();
        assert!(!msg.is_streaming());
        assert_eq!(msg.text(), "Hello, world");
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.streaming_message(), None);
    }

    #[test]
    fn test_terminal_messages_are_immutable() {
        let mut store = TranscriptStore::new();
        let user = store.append(Role::User, "Hi");
        assert_eq!(
            store.append_text(user, "!"),
            Err(TranscriptError::Finalized(user))
        );

        let id = store.begin_streaming(Role::Model).unwrap();
        store.finish(id).unwrap();
        assert_eq!(store.finish(id), Err(TranscriptError::Finalized(id)));
        assert_eq!(
            store.append_text(id, "late"),
            Err(TranscriptError::Finalized(id))
        );
        assert_eq!(store.get(id).map(Message::text), Some(""));
    }

    #[test]
    fn test_single_streaming_message() {
        let mut store = TranscriptStore::new();
        let id = store.begin_streaming(Role::Model).unwrap();
        assert_eq!(
            store.begin_streaming(Role::Model),
            Err(TranscriptError::AlreadyStreaming(id))
        );
    }

    #[test]
    fn test_unknown_message() {
        let mut store = TranscriptStore::new();
        let id = store.reset("Hello");
        let mut other = TranscriptStore::new();
        other.append(Role::User, "a");
        let unknown = other.append(Role::User, "b");
        assert_ne!(id, unknown);
        assert_eq!(
            store.append_text(unknown, "x"),
            Err(TranscriptError::NotFound(unknown))
        );
    }

    #[test]
    fn test_reset() {
        let mut store = TranscriptStore::new();
        let old = store.append(Role::User, "Hi");
        store.begin_streaming(Role::Model).unwrap();

        let greeting = store.reset("Fresh start!");
        assert!(greeting > old);
        assert_eq!(store.messages().len(), 1);
        let msg = &store.messages()[0];
        assert_eq!(msg.role(), Role::Model);
        assert_eq!(msg.text(), "Fresh start!");
        assert!(!msg.is_streaming());
        assert_eq!(store.get(old), None);
    }

    #[test]
    fn test_listener() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let mut store = TranscriptStore::with_listener({
            let changes = Arc::clone(&changes);
            move |change: &TranscriptChange| {
                changes.lock().unwrap().push(change.clone());
            }
        });

        store.append(Role::User, "Hi");
        let id = store.begin_streaming(Role::Model).unwrap();
        store.append_text(id, "Yo").unwrap();
        store.finish(id).unwrap();
        // Rejected mutations are not reported.
        store.append_text(id, "!").unwrap_err();
        store.reset("Bye");

        let changes = changes.lock().unwrap();
        let kinds: Vec<_> = changes
            .iter()
            .map(|change| match change {
                TranscriptChange::Appended(msg) => format!("+{}", msg.text()),
                TranscriptChange::Updated(msg) => {
                    format!("~{}:{}", msg.text(), msg.is_streaming())
                }
                TranscriptChange::Reset(msgs) => format!("={}", msgs.len()),
            })
            .collect();
        assert_eq!(kinds, ["+Hi", "+", "~Yo:true", "~Yo:false", "=1"]);
    }
}
