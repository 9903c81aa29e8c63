use omnichat_model::ModelProvider;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::state::{BusyListener, ConversationState, run_conversation};
use super::{Conversation, DEFAULT_GREETING, DEFAULT_RESET_GREETING};
use crate::model_client::ModelClient;
use crate::transcript::{ChangeListener, TranscriptChange, TranscriptStore};

/// [`Conversation`] builder.
pub struct ConversationBuilder {
    model_client: ModelClient,
    system_instruction: Option<String>,
    greeting: String,
    reset_greeting: String,
    on_change: Option<ChangeListener>,
    on_busy_changed: Option<BusyListener>,
}

impl ConversationBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_instruction: None,
            greeting: DEFAULT_GREETING.to_owned(),
            reset_greeting: DEFAULT_RESET_GREETING.to_owned(),
            on_change: None,
            on_busy_changed: None,
        }
    }

    /// Sets the instruction sent ahead of every request.
    #[inline]
    pub fn with_system_instruction<S: Into<String>>(
        mut self,
        instruction: S,
    ) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Sets the greeting the transcript starts with.
    #[inline]
    pub fn with_greeting<S: Into<String>>(mut self, greeting: S) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Sets the greeting the transcript is left with after a reset.
    #[inline]
    pub fn with_reset_greeting<S: Into<String>>(mut self, greeting: S) -> Self {
        self.reset_greeting = greeting.into();
        self
    }

    /// Attaches a callback to be invoked on every transcript mutation.
    ///
    /// The callback runs inside the conversation task, so it should return
    /// quickly.
    #[inline]
    pub fn on_change(
        mut self,
        on_change: impl Fn(&TranscriptChange) + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(Box::new(on_change));
        self
    }

    /// Attaches a callback to be invoked when a turn starts or ends.
    #[inline]
    pub fn on_busy_changed(
        mut self,
        on_busy_changed: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_busy_changed = Some(Box::new(on_busy_changed));
        self
    }

    /// Builds the conversation and starts its task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> Conversation {
        let Self {
            model_client,
            system_instruction,
            greeting,
            reset_greeting,
            on_change,
            on_busy_changed,
        } = self;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut store = TranscriptStore::new();
        store.set_listener(on_change);
        store.reset(greeting);

        let state = ConversationState::new(
            model_client,
            store,
            system_instruction,
            reset_greeting,
            on_busy_changed,
            cmd_tx.downgrade(),
        );
        tokio::spawn(
            run_conversation(state, cmd_rx)
                .instrument(trace_span!("conversation")),
        );
        Conversation { cmd_tx }
    }
}
