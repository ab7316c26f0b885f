use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use crossterm::{
    cursor,
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture, EventStream,
    },
    queue,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
    },
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::command::{Command, EffectPanic};
use crate::dispatch::{Dispatcher, Inbound};
use crate::event::TerminalEvent;
use crate::model::Model;

/// Where the interface is drawn.
///
/// Rendering goes to stdout unless told otherwise. Pick
/// [`OutputTarget::Stderr`] when the program's stdout carries data — for
/// example when the user pipes it into another tool — so the interface stays
/// on the terminal while the data flows through the pipe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Draw on stdout (the default).
    #[default]
    Stdout,
    /// Draw on stderr, leaving stdout free for program output.
    Stderr,
}

impl OutputTarget {
    fn writer(self) -> Box<dyn Write + Send> {
        match self {
            OutputTarget::Stdout => Box::new(io::stdout()),
            OutputTarget::Stderr => Box::new(io::stderr()),
        }
    }
}

type Backend = CrosstermBackend<Box<dyn Write + Send>>;

/// Raised when the terminal cannot be set up, polled, drawn to, or restored.
///
/// Everything a [`Program`] can fail at is terminal I/O; worker failures
/// never surface here — they arrive in `update` as messages.
#[derive(Debug, thiserror::Error)]
#[error("terminal I/O error: {0}")]
pub struct ProgramError(#[from] io::Error);

/// Configuration options for a [`Program`].
///
/// Start from [`Default`] and override the fields you care about with struct
/// update syntax:
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::{OutputTarget, ProgramOptions};
///
/// let opts = ProgramOptions {
///     fps: 30,
///     mouse_capture: true,
///     title: Some("My App".into()),
///     output: OutputTarget::Stderr,
///     ..ProgramOptions::default()
/// };
/// ```
pub struct ProgramOptions {
    /// Redraw opportunities per second (default 60, clamped to 1..=120).
    /// At 60 the input poll deadline sits near 16 ms.
    pub fps: u32,
    /// Where to draw; see [`OutputTarget`].
    pub output: OutputTarget,
    /// Run on the alternate screen buffer, leaving scrollback untouched
    /// (default: true).
    pub alt_screen: bool,
    /// Ask the terminal to report mouse events (default: false).
    pub mouse_capture: bool,
    /// Receive pastes as a single [`TerminalEvent::Paste`] instead of a
    /// burst of key events (default: true).
    pub bracketed_paste: bool,
    /// Receive focus-gained/focus-lost events (default: false).
    pub focus_reporting: bool,
    /// Window title to set on startup, if any.
    pub title: Option<String>,
    /// Restore the terminal from a panic hook, so a crash does not leave
    /// the shell in raw mode (default: true).
    pub catch_panics: bool,
    /// Exit the loop on Ctrl-C delivered as a signal (default: true).
    pub handle_signals: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            fps: 60,
            output: OutputTarget::default(),
            alt_screen: true,
            mouse_capture: false,
            bracketed_paste: true,
            focus_reporting: false,
            title: None,
            catch_panics: true,
            handle_signals: true,
        }
    }
}

/// A cloneable handle to a running [`Program`] for control from outside the
/// loop — another task, a signal handler, a test.
///
/// * [`send`](ProgramHandle::send) injects a message that reaches `update`
///   on the next drain.
/// * [`kill`](ProgramHandle::kill) makes the loop exit at its next
///   iteration, skipping any messages still queued.
///
/// Obtain one with [`Program::handle`] before calling
/// [`run`](Program::run).
pub struct ProgramHandle<Msg: Send + 'static> {
    msg_tx: mpsc::UnboundedSender<Inbound<Msg>>,
    killed: Arc<AtomicBool>,
}

impl<Msg: Send + 'static> Clone for ProgramHandle<Msg> {
    fn clone(&self) -> Self {
        Self {
            msg_tx: self.msg_tx.clone(),
            killed: self.killed.clone(),
        }
    }
}

impl<Msg: Send + 'static> ProgramHandle<Msg> {
    /// Send a message to the running program. Silently does nothing once
    /// the program has exited.
    pub fn send(&self, msg: Msg) {
        let _ = self.msg_tx.send(Inbound::App(msg));
    }

    /// Force the program to exit at its next loop iteration.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

/// The shared core of [`Program`] and
/// [`TestRuntime`](crate::testing::TestRuntime): model, inbox, dispatcher,
/// and the update/dispatch/drain discipline. Keeping it in one place means
/// production code and tests run the same loop.
pub(crate) struct Engine<M: Model> {
    pub(crate) model: M,
    pub(crate) tx: mpsc::UnboundedSender<Inbound<M::Message>>,
    pub(crate) rx: mpsc::UnboundedReceiver<Inbound<M::Message>>,
    pub(crate) dispatcher: Dispatcher<M::Message>,
    pub(crate) should_quit: bool,
}

impl<M: Model> Engine<M> {
    pub(crate) fn new(flags: M::Flags) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(tx.clone());
        let (model, init_cmd) = M::init(flags);
        let mut engine = Self {
            model,
            tx,
            rx,
            dispatcher,
            should_quit: false,
        };
        engine.apply(init_cmd);
        engine
    }

    /// Hand a command to the dispatcher; `Exit` flips the quit flag instead.
    pub(crate) fn apply(&mut self, cmd: Command<M::Message>) {
        if self.dispatcher.dispatch(cmd) {
            self.should_quit = true;
        }
    }

    /// One update/dispatch cycle for a single inbox message.
    pub(crate) fn process(&mut self, inbound: Inbound<M::Message>) {
        match inbound {
            Inbound::App(msg) => {
                let cmd = self.model.update(msg);
                self.apply(cmd);
            }
            Inbound::Finished(handle) => {
                self.dispatcher.remove(handle);
            }
            Inbound::Panicked { handle, message } => {
                let entry = self.dispatcher.remove(handle);
                tracing::warn!(?handle, %message, "custom effect panicked");
                if let Some(on_panic) = entry.and_then(|entry| entry.on_panic) {
                    let msg = on_panic(EffectPanic { handle, message });
                    let cmd = self.model.update(msg);
                    self.apply(cmd);
                }
            }
        }
    }

    /// Map a terminal event through the model and run the update cycle.
    pub(crate) fn handle_event(&mut self, event: TerminalEvent) {
        if let Some(msg) = self.model.on_event(event) {
            self.process(Inbound::App(msg));
        }
    }

    /// The `Sync` semantics: join every pending worker and fully drain the
    /// inbox, repeating for messages produced along the way, until the
    /// system is quiescent.
    pub(crate) async fn settle(&mut self) {
        loop {
            self.dispatcher.join_pending().await;
            let mut progressed = false;
            while let Ok(inbound) = self.rx.try_recv() {
                self.process(inbound);
                progressed = true;
            }
            if !progressed && !self.dispatcher.pending() {
                break;
            }
        }
    }

    pub(crate) async fn shutdown(&mut self) {
        self.dispatcher.shutdown().await;
    }
}

/// The program runtime. Manages terminal setup, the event loop, and the full
/// [`Model`] lifecycle.
///
/// `Program` wires a [`Model`] to a real terminal via
/// [`ratatui`]/[`crossterm`] and drives the render/poll/update/dispatch/drain
/// loop until the model returns [`Command::exit`] or the process receives a
/// signal. Every running effect is cancelled (cooperatively, then forcibly)
/// before [`run`](Program::run) returns the final model.
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::{Program, ProgramError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), ProgramError> {
///     let model = Program::<MyApp>::new(())?.run().await?;
///     // `model` is the final state after exit
///     Ok(())
/// }
/// ```
pub struct Program<M: Model> {
    engine: Engine<M>,
    terminal: Terminal<Backend>,
    options: ProgramOptions,
    needs_redraw: bool,
    killed: Arc<AtomicBool>,
}

impl<M: Model> Program<M> {
    /// Create a new program with default options.
    ///
    /// Returns an error if terminal initialization fails.
    pub fn new(flags: M::Flags) -> Result<Self, ProgramError> {
        Self::with_options(flags, ProgramOptions::default())
    }

    /// Create a new program with custom options.
    pub fn with_options(flags: M::Flags, options: ProgramOptions) -> Result<Self, ProgramError> {
        if options.catch_panics {
            install_panic_hook(options.alt_screen, options.output);
        }
        let terminal = claim_terminal(&options)?;
        let engine = Engine::new(flags);
        tracing::debug!("program initialized");
        Ok(Self {
            engine,
            terminal,
            options,
            needs_redraw: true,
            killed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a handle for external control (send messages, force-kill).
    pub fn handle(&self) -> ProgramHandle<M::Message> {
        ProgramHandle {
            msg_tx: self.engine.tx.clone(),
            killed: self.killed.clone(),
        }
    }

    /// Run the program. Blocks until exit, then returns the final model.
    pub async fn run(mut self) -> Result<M, ProgramError> {
        let outcome = self.event_loop().await;

        tracing::debug!("loop finished; stopping effects");
        self.engine.shutdown().await;
        let restored = release_terminal(self.options.alt_screen, self.options.output);

        outcome?;
        restored?;
        Ok(self.engine.model)
    }

    async fn event_loop(&mut self) -> Result<(), ProgramError> {
        self.render()?;

        let fps = f64::from(self.options.fps.clamp(1, 120));
        let mut frames = tokio::time::interval(Duration::from_secs_f64(fps.recip()));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut input = EventStream::new();
        let handle_signals = self.options.handle_signals;

        loop {
            // Sole exit check: every branch below falls through to here.
            if self.engine.should_quit || self.killed.load(Ordering::SeqCst) {
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c(), if handle_signals => {
                    tracing::debug!("ctrl+c received");
                    return Ok(());
                }

                polled = input.next() => match polled {
                    Some(Ok(event)) => {
                        self.engine.handle_event(event.into());
                        self.needs_redraw = true;
                    }
                    // The terminal is gone; nothing left to poll.
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(()),
                },

                Some(inbound) = self.engine.rx.recv() => {
                    self.engine.process(inbound);
                    self.drain_queued();
                    self.needs_redraw = true;
                }

                _ = frames.tick() => {
                    if self.needs_redraw {
                        self.render()?;
                        self.needs_redraw = false;
                    }
                }
            }
        }
    }

    /// Pop the messages that were already queued when the drain started.
    ///
    /// Messages produced while draining wait for the next loop turn, so an
    /// effect that keeps the inbox full cannot starve rendering or input.
    fn drain_queued(&mut self) {
        let queued = self.engine.rx.len();
        for _ in 0..queued {
            if self.engine.should_quit {
                return;
            }
            match self.engine.rx.try_recv() {
                Ok(inbound) => self.engine.process(inbound),
                Err(_) => return,
            }
        }
    }

    fn render(&mut self) -> Result<(), ProgramError> {
        self.terminal.draw(|frame| {
            self.engine.model.view(frame);
        })?;
        Ok(())
    }
}

/// Put the terminal into TUI mode per `options` and hand back a ratatui
/// terminal over the chosen output.
///
/// Mode switches are queued and flushed in one write.
fn claim_terminal(options: &ProgramOptions) -> Result<Terminal<Backend>, ProgramError> {
    enable_raw_mode()?;
    let mut writer = options.output.writer();
    queue!(writer, cursor::Hide)?;
    if options.alt_screen {
        queue!(writer, EnterAlternateScreen)?;
    }
    if options.bracketed_paste {
        queue!(writer, EnableBracketedPaste)?;
    }
    if options.mouse_capture {
        queue!(writer, EnableMouseCapture)?;
    }
    if options.focus_reporting {
        queue!(writer, EnableFocusChange)?;
    }
    if let Some(title) = &options.title {
        queue!(writer, SetTitle(title))?;
    }
    writer.flush()?;
    Ok(Terminal::new(CrosstermBackend::new(writer))?)
}

/// Undo every mode [`claim_terminal`] may have switched on.
///
/// Steps are best-effort: disabling a mode that was never enabled is
/// harmless, and one failed step must not keep the rest of the terminal
/// state broken. Only the raw-mode switch reports its error, since a shell
/// left in raw mode is the failure the caller actually cares about.
fn release_terminal(alt_screen: bool, target: OutputTarget) -> io::Result<()> {
    let mut writer = target.writer();
    queue!(
        writer,
        DisableFocusChange,
        DisableMouseCapture,
        DisableBracketedPaste
    )
    .ok();
    if alt_screen {
        queue!(writer, LeaveAlternateScreen).ok();
    }
    queue!(writer, cursor::Show).ok();
    writer.flush().ok();
    disable_raw_mode()
}

/// Chain a terminal restore in front of the default panic handler, once per
/// process, so a crash mid-frame does not leave the shell in raw mode with
/// the panic message drawn into the alternate screen.
fn install_panic_hook(alt_screen: bool, target: OutputTarget) {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = release_terminal(alt_screen, target);
            previous(info);
        }));
    });
}

/// Open an append-mode file for debug logging.
///
/// A TUI owns the terminal, so printing to stdout or stderr scribbles over
/// the interface. Write log lines to a file instead and watch them from a
/// second terminal with `tail -f`.
///
/// # Example
///
/// ```no_run
/// use std::io::Write;
///
/// let mut log = oolong_core::runtime::log_to_file("/tmp/app.log").unwrap();
/// writeln!(log, "starting up").unwrap();
/// ```
pub fn log_to_file(path: impl AsRef<std::path::Path>) -> io::Result<std::fs::File> {
    std::fs::File::options().append(true).create(true).open(path)
}
