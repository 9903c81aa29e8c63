use std::fmt::{self, Debug};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{ERROR_NOTICE, Snapshot};
use crate::model_client::{ModelClient, StreamResult};
use crate::session::Session;
use crate::transcript::{MessageId, Role, TranscriptStore};

pub type BusyListener = Box<dyn Fn(bool) + Send + Sync>;

/// Commands processed by the conversation task, in the order they arrive.
pub enum Command {
    Submit(String),
    Reset,
    Snapshot(oneshot::Sender<Snapshot>),
    Fragment { turn: u64, text: String },
    Finished { turn: u64, result: StreamResult },
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Submit(text) => f.debug_tuple("Submit").field(text).finish(),
            Command::Reset => f.write_str("Reset"),
            Command::Snapshot(_) => f.write_str("Snapshot"),
            Command::Fragment { turn, text } => f
                .debug_struct("Fragment")
                .field("turn", turn)
                .field("text", text)
                .finish(),
            Command::Finished { turn, result } => f
                .debug_struct("Finished")
                .field("turn", turn)
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

struct ActiveTurn {
    turn: u64,
    placeholder: MessageId,
    prompt: String,
    task: JoinHandle<()>,
}

pub struct ConversationState {
    model_client: ModelClient,
    store: TranscriptStore,
    // Created on the first submission and dropped on reset.
    session: Option<Session>,
    system_instruction: Option<String>,
    reset_greeting: String,
    active: Option<ActiveTurn>,
    busy: bool,
    next_turn: u64,
    on_busy_changed: Option<BusyListener>,
    // Weak, so that the loop ends once every handle is gone.
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
}

impl ConversationState {
    pub fn new(
        model_client: ModelClient,
        store: TranscriptStore,
        system_instruction: Option<String>,
        reset_greeting: String,
        on_busy_changed: Option<BusyListener>,
        cmd_tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            model_client,
            store,
            session: None,
            system_instruction,
            reset_greeting,
            active: None,
            busy: false,
            next_turn: 1,
            on_busy_changed,
            cmd_tx,
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Submit(text) => self.submit(text),
            Command::Reset => self.reset(),
            Command::Snapshot(tx) => {
                tx.send(Snapshot {
                    messages: self.store.messages().to_vec(),
                    busy: self.busy,
                })
                .ok();
            }
            Command::Fragment { turn, text } => self.apply_fragment(turn, &text),
            Command::Finished { turn, result } => self.finish_turn(turn, result),
        }
    }

    fn submit(&mut self, text: String) {
        let prompt = text.trim();
        if prompt.is_empty() {
            debug!("ignored blank input");
            return;
        }
        if self.busy {
            debug!("ignored input while a turn is in flight");
            return;
        }

        self.store.append(Role::User, prompt);
        let placeholder = match self.store.begin_streaming(Role::Model) {
            Ok(id) => id,
            Err(err) => {
                error!("cannot open the reply: {err}");
                return;
            }
        };

        let session = self
            .session
            .get_or_insert_with(|| Session::new(self.system_instruction.clone()));
        let request = session.build_request(prompt);

        let turn = self.next_turn;
        self.next_turn += 1;
        debug!("starting turn {turn} in {}", session.id());

        let model_client = self.model_client.clone();
        let cmd_tx = self.cmd_tx.clone();
        let task = tokio::spawn(
            async move {
                let fragment_tx = cmd_tx.clone();
                let result = model_client
                    .stream_reply(request, move |text| {
                        if let Some(tx) = fragment_tx.upgrade() {
                            tx.send(Command::Fragment { turn, text }).ok();
                        }
                    })
                    .await;
                if let Some(tx) = cmd_tx.upgrade() {
                    tx.send(Command::Finished { turn, result }).ok();
                }
            }
            .instrument(trace_span!("turn", turn)),
        );

        self.active = Some(ActiveTurn {
            turn,
            placeholder,
            prompt: prompt.to_owned(),
            task,
        });
        self.set_busy(true);
    }

    fn apply_fragment(&mut self, turn: u64, text: &str) {
        let Some(active) = self.active.as_ref().filter(|a| a.turn == turn) else {
            trace!("dropped a fragment of stale turn {turn}");
            return;
        };
        if let Err(err) = self.store.append_text(active.placeholder, text) {
            warn!("failed to apply a fragment: {err}");
        }
    }

    fn finish_turn(&mut self, turn: u64, result: StreamResult) {
        let Some(active) = self.active.take_if(|a| a.turn == turn) else {
            trace!("dropped the result of stale turn {turn}");
            return;
        };

        if let Err(err) = self.store.finish(active.placeholder) {
            warn!("failed to finish the reply: {err}");
        }
        match result {
            Ok(reply) => {
                debug!("turn {turn} completed");
                if let Some(session) = &mut self.session {
                    session.commit_turn(active.prompt, reply);
                }
            }
            Err(err) => {
                error!(kind = %err.kind(), "turn {turn} failed: {err}");
                self.store.append(Role::Model, ERROR_NOTICE);
            }
        }
        self.set_busy(false);
    }

    fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("abandoning turn {}", active.turn);
            active.task.abort();
        }
        self.session = None;
        self.store.reset(self.reset_greeting.clone());
        self.set_busy(false);
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy == busy {
            return;
        }
        self.busy = busy;
        if let Some(on_busy_changed) = &self.on_busy_changed {
            on_busy_changed(busy);
        }
    }

    fn shutdown(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

pub async fn run_conversation(
    mut state: ConversationState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    debug!("started");
    while let Some(cmd) = cmd_rx.recv().await {
        trace!("received command: {cmd:?}");

        let proc_span = trace_span!("proc cmd");
        proc_span.in_scope(|| {
            state.handle(cmd);
            trace!("finished");
        });
    }
    state.shutdown();
    debug!("will terminate");
}
