//! A headless test harness that drives a [`Model`] without a real terminal.
//!
//! [`TestRuntime`] runs the same engine as
//! [`Program`](crate::runtime::Program) — same update/dispatch/drain cycle,
//! same dispatcher, same active-command table — minus the terminal. Inject
//! events with [`send_event`](TestRuntime::send_event) /
//! [`send_key`](TestRuntime::send_key), then call
//! [`sync`](TestRuntime::sync) to join every pending worker and fully drain
//! the inbox, which makes asynchronous command tests deterministic.
//!
//! Construct a `TestRuntime` inside a tokio runtime (e.g. `#[tokio::test]`);
//! dispatching commands spawns worker tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn fetch_populates_the_list() {
//!     let mut rt = TestRuntime::<App>::new(());
//!     rt.send(Msg::Refresh);          // update returns Command::system(...)
//!     rt.sync().await;                // subprocess ran, results drained
//!     assert!(!rt.model().entries.is_empty());
//! }
//! ```

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::Terminal;

use crate::command::CommandHandle;
use crate::dispatch::Inbound;
use crate::event::TerminalEvent;
use crate::model::Model;
use crate::runtime::Engine;

/// Headless harness for exercising the full init/update/dispatch cycle in
/// tests. See the [module docs](self).
pub struct TestRuntime<M: Model> {
    engine: Engine<M>,
}

impl<M: Model> TestRuntime<M> {
    /// Create a test runtime by calling [`Model::init`] with the given
    /// flags. The init command is dispatched immediately.
    pub fn new(flags: M::Flags) -> Self {
        Self {
            engine: Engine::new(flags),
        }
    }

    /// Deliver a message, triggering a single update/dispatch cycle.
    pub fn send(&mut self, msg: M::Message) {
        self.engine.process(Inbound::App(msg));
    }

    /// Deliver a terminal event through [`Model::on_event`], exactly as the
    /// real loop would.
    pub fn send_event(&mut self, event: TerminalEvent) {
        self.engine.handle_event(event);
    }

    /// Deliver a key press with no modifiers.
    pub fn send_key(&mut self, code: KeyCode) {
        self.send_event(TerminalEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    /// Deliver a plain character key press.
    pub fn send_char(&mut self, c: char) {
        self.send_key(KeyCode::Char(c));
    }

    /// The `Sync` synthetic event: join every pending worker and fully drain
    /// the inbox — repeating the update/dispatch cycle for every message,
    /// including messages produced by commands dispatched during the drain —
    /// until the system is quiescent.
    ///
    /// An effect that never finishes (e.g. a ticker that loops until
    /// cancelled) keeps `sync` waiting; cancel it first.
    pub async fn sync(&mut self) {
        self.engine.settle().await;
    }

    /// Await and process a single inbox message. Returns `false` if the
    /// inbox has closed.
    ///
    /// Useful for observing an effect mid-flight (e.g. waiting for the first
    /// tick of a worker you intend to cancel) where [`sync`](TestRuntime::sync)
    /// would wait for the effect to finish.
    pub async fn step(&mut self) -> bool {
        match self.engine.rx.recv().await {
            Some(inbound) => {
                self.engine.process(inbound);
                true
            }
            None => false,
        }
    }

    /// Get a shared reference to the model for assertions.
    pub fn model(&self) -> &M {
        &self.engine.model
    }

    /// Get a mutable reference to the model for direct test setup.
    ///
    /// This bypasses the normal message-driven update cycle, which can be
    /// useful for arranging state before sending messages.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.engine.model
    }

    /// Whether the loop would still be running (no exit observed).
    pub fn is_running(&self) -> bool {
        !self.engine.should_quit
    }

    /// Number of entries in the active-command table.
    pub fn active_effects(&self) -> usize {
        self.engine.dispatcher.active_count()
    }

    /// Whether the effect identified by `handle` is still in the
    /// active-command table.
    pub fn is_effect_active(&self, handle: CommandHandle) -> bool {
        self.engine.dispatcher.is_active(handle)
    }

    /// Run the shutdown discipline and return the final model, as
    /// [`Program::run`](crate::runtime::Program::run) would.
    pub async fn finish(mut self) -> M {
        self.engine.shutdown().await;
        self.engine.model
    }

    /// Render the model to a ratatui [`Buffer`] of the given dimensions.
    ///
    /// Returns the raw buffer for cell-by-cell inspection; see
    /// [`render_string`](TestRuntime::render_string) for a simpler
    /// string-based assertion.
    pub fn render(&self, width: u16, height: u16) -> Buffer {
        let backend = ratatui::backend::TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|frame| {
                self.engine.model.view(frame);
            })
            .unwrap();
        terminal.backend().buffer().clone()
    }

    /// Render the model and return the visible content as a plain string,
    /// rows separated by newlines.
    pub fn render_string(&self, width: u16, height: u16) -> String {
        let buf = self.render(width, height);
        let area = Rect::new(0, 0, width, height);
        let mut output = String::new();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                let cell = &buf[(x, y)];
                output.push_str(cell.symbol());
            }
            if y < area.bottom() - 1 {
                output.push('\n');
            }
        }
        output
    }
}
