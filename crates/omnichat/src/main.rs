//! A terminal chat with a Gemini model.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::{self, IsTerminal, Stdout};
use std::ops::ControlFlow;
use std::process::ExitCode;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use crossterm::terminal;
use indicatif::{ProgressBar, ProgressStyle};
use omnichat::command::{ChatCommand, help_text, parse_command};
use omnichat::core::{Conversation, ConversationBuilder, TranscriptChange};
use omnichat::gemini::{GeminiConfigBuilder, GeminiProvider};
use omnichat::log_sink::LogSink;
use omnichat::render::Renderer;
use omnichat::view::LiveView;
use rustyline::error::ReadlineError;
use rustyline::{Cmd, Config, DefaultEditor, KeyCode, KeyEvent, Modifiers};
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;

const SYSTEM_INSTRUCTION: &str = "You are OmniChat, a helpful, witty, and highly intelligent AI assistant. You answer questions concisely but comprehensively. You use Markdown for formatting when appropriate.";

const PROMPT: &str = "> ";

enum UiEvent {
    Change(TranscriptChange),
    Busy(bool),
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

struct App {
    conversation: Conversation,
    view: LiveView<Stdout>,
    spinner: Option<ProgressBar>,
    spinner_style: ProgressStyle,
    busy: bool,
    log_sink: LogSink,
    // Each token lets the editor thread read one line.
    ready_tx: std_mpsc::Sender<()>,
}

impl App {
    fn handle_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Change(change) => {
                // Finish the spinner before printing anything else.
                self.clear_spinner();
                self.view.set_size(terminal::size().ok());
                if let Err(err) = self.view.apply(&change) {
                    error!("failed to draw the transcript: {err}");
                }
                if self.busy && self.view.is_waiting() {
                    self.start_spinner();
                }
            }
            UiEvent::Busy(busy) => {
                self.busy = busy;
                if busy {
                    self.log_sink.hold();
                    if self.view.is_waiting() {
                        self.start_spinner();
                    }
                } else {
                    self.clear_spinner();
                    self.release_logs();
                    self.prompt();
                }
            }
        }
    }

    async fn handle_input(
        &mut self,
        input: InputEvent,
        ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
    ) -> ControlFlow<()> {
        let line = match input {
            InputEvent::Line(line) => line,
            InputEvent::Interrupted | InputEvent::Eof => return ControlFlow::Break(()),
            InputEvent::Failed(err) => {
                error!("error reading input: {err}");
                eprintln!("error reading input: {err}");
                return ControlFlow::Break(());
            }
        };

        let line = line.trim();
        if line.is_empty() {
            self.prompt();
            return ControlFlow::Continue(());
        }

        match parse_command(line) {
            Some(ChatCommand::Quit) => return ControlFlow::Break(()),
            Some(ChatCommand::Reset) => {
                if self.conversation.reset().is_err() {
                    return ControlFlow::Break(());
                }
                // Once the snapshot arrives, the reset has been reported.
                if self.conversation.snapshot().await.is_err() {
                    return ControlFlow::Break(());
                }
                while let Ok(event) = ui_rx.try_recv() {
                    self.handle_ui_event(event);
                }
                self.prompt();
            }
            Some(ChatCommand::Help) => {
                self.print_info(help_text());
                self.prompt();
            }
            Some(ChatCommand::Invalid(msg)) => {
                self.print_info(&msg);
                self.prompt();
            }
            None => {
                // The prompt comes back once the turn ends.
                if self.conversation.submit(line).is_err() {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn interrupt(&mut self) {
        debug!("interrupted while streaming");
        self.clear_spinner();
        self.conversation.reset().ok();
    }

    fn print_info(&mut self, text: &str) {
        if let Err(err) = self.view.print_info(text) {
            error!("failed to print: {err}");
        }
    }

    fn release_logs(&self) {
        if let Err(err) = self.log_sink.release() {
            eprintln!("failed to write logs: {err}");
        }
    }

    #[inline]
    fn prompt(&self) {
        self.ready_tx.send(()).ok();
    }

    fn start_spinner(&mut self) {
        self.spinner.get_or_insert_with(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(self.spinner_style.clone());
            spinner.set_message("Thinking...");
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs share the terminal with the live view.
    let log_sink = LogSink::stderr();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(log_sink.clone())
        .init();

    let config =
        match GeminiConfigBuilder::from_env().and_then(|builder| builder.build()) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{}", err.message());
                return ExitCode::FAILURE;
            }
        };
    let model = config.model().to_owned();
    let model_provider = GeminiProvider::new(config);

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let conversation = ConversationBuilder::with_model_provider(model_provider)
        .with_system_instruction(SYSTEM_INSTRUCTION)
        .on_change({
            let ui_tx = ui_tx.clone();
            move |change: &TranscriptChange| {
                ui_tx.send(UiEvent::Change(change.clone())).ok();
            }
        })
        .on_busy_changed(move |busy| {
            ui_tx.send(UiEvent::Busy(busy)).ok();
        })
        .build();

    let color = env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
    let spinner_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let (ready_tx, ready_rx) = std_mpsc::channel();
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    thread::spawn(move || run_editor(ready_rx, input_tx));

    let mut app = App {
        conversation,
        view: LiveView::new(io::stdout(), Renderer::new(color)),
        spinner: None,
        spinner_style,
        busy: false,
        log_sink,
        ready_tx,
    };
    app.print_info(&format!(
        "OmniChat (model: {model})\nType /help for commands, /quit to exit"
    ));

    // The greeting was reported while the conversation was being built.
    while let Ok(event) = ui_rx.try_recv() {
        app.handle_ui_event(event);
    }
    app.prompt();

    loop {
        select! {
            event = ui_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                app.handle_ui_event(event);
            }
            input = input_rx.recv(), if !app.busy => {
                let Some(input) = input else {
                    break;
                };
                if app.handle_input(input, &mut ui_rx).await.is_break() {
                    break;
                }
            }
            result = signal::ctrl_c(), if app.busy => {
                match result {
                    Ok(()) => app.interrupt(),
                    Err(err) => {
                        error!("failed to listen for Ctrl+C: {err}");
                        break;
                    }
                }
            }
        }
    }

    app.clear_spinner();
    app.release_logs();
    ExitCode::SUCCESS
}

fn run_editor(
    ready_rx: std_mpsc::Receiver<()>,
    input_tx: mpsc::UnboundedSender<InputEvent>,
) {
    let config = Config::builder().auto_add_history(true).build();
    let mut editor = match DefaultEditor::with_config(config) {
        Ok(editor) => editor,
        Err(err) => {
            input_tx.send(InputEvent::Failed(err.to_string())).ok();
            return;
        }
    };
    editor.bind_sequence(KeyEvent(KeyCode::Enter, Modifiers::ALT), Cmd::Newline);

    while ready_rx.recv().is_ok() {
        let event = match editor.readline(PROMPT) {
            Ok(line) => InputEvent::Line(line),
            Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
            Err(ReadlineError::Eof) => InputEvent::Eof,
            Err(err) => InputEvent::Failed(err.to_string()),
        };
        if input_tx.send(event).is_err() {
            break;
        }
    }
}
