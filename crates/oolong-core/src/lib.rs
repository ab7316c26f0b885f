//! Core runtime for the **oolong** TUI framework.
//!
//! `oolong-core` is a Model-View-Update execution engine for terminal user
//! interfaces in the spirit of the [Elm Architecture]: your program is a
//! pure **init -> update -> view** cycle, with side effects pushed to the
//! edges through [`Command`]s. The runtime drives a render/input/dispatch
//! loop, executes commands concurrently on worker tasks, and feeds their
//! results back into `update` as ordinary messages — all while keeping state
//! transitions strictly single-threaded.
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Model`] | Top-level application trait (init / update / view) |
//! | [`Command`] | Describes a side effect: exit, subprocess, custom worker, cancellation |
//! | [`CustomCommand`] | A cancellable user effect with an [`Outlet`] and a [`CancelToken`] |
//! | [`Component`] | Reusable sub-model that renders into a [`ratatui::layout::Rect`] |
//! | [`Router`] | Declarative dispatch table: child routes, key/mouse bindings, guards |
//! | [`Program`] | Wires a [`Model`] to a real terminal and drives the event loop |
//! | [`TestRuntime`](testing::TestRuntime) | Headless harness running the same loop for deterministic tests |
//!
//! # Architecture
//!
//! 1. **init** — [`Model::init`] creates the initial state and may return a
//!    [`Command`] to kick off early work.
//! 2. **view** — the runtime calls [`Model::view`] to render the current
//!    state to a [`ratatui::Frame`].
//! 3. **input** — terminal events are polled with a per-frame deadline and
//!    converted to messages by [`Model::on_event`].
//! 4. **update** — [`Model::update`] receives one message at a time, mutates
//!    state, and optionally returns a [`Command`].
//! 5. **dispatch** — the dispatcher turns the command into worker tasks;
//!    subprocess output, streamed lines, and custom-effect messages arrive
//!    back on the inbox and re-enter `update` in the same loop.
//! 6. **repeat** — until `update` returns [`Command::exit`], at which point
//!    every running effect is cancelled (cooperatively, then forcibly) and
//!    [`run`] returns the final model.
//!
//! Effects are cancelled through the same command algebra that starts them:
//! keep the [`CommandHandle`] of a [`CustomCommand`] and return
//! [`Command::cancel`] from `update`. Cancellation is cooperative — the
//! effect polls its [`CancelToken`] — with a configurable grace period
//! before force-termination.
//!
//! # Quick example
//!
//! ```ignore
//! use oolong_core::{Command, Model, TerminalEvent};
//! use crossterm::event::KeyCode;
//! use ratatui::widgets::Paragraph;
//!
//! struct Counter { count: i32 }
//!
//! enum Msg { Increment, Quit }
//!
//! impl Model for Counter {
//!     type Message = Msg;
//!     type Flags = ();
//!
//!     fn init(_flags: ()) -> (Self, Command<Msg>) {
//!         (Counter { count: 0 }, Command::none())
//!     }
//!
//!     fn on_event(&self, event: TerminalEvent) -> Option<Msg> {
//!         match event.key()?.code {
//!             KeyCode::Char('+') => Some(Msg::Increment),
//!             KeyCode::Char('q') => Some(Msg::Quit),
//!             _ => None,
//!         }
//!     }
//!
//!     fn update(&mut self, msg: Msg) -> Command<Msg> {
//!         match msg {
//!             Msg::Increment => { self.count += 1; Command::none() }
//!             Msg::Quit => Command::exit(),
//!         }
//!     }
//!
//!     fn view(&self, frame: &mut ratatui::Frame) {
//!         frame.render_widget(
//!             Paragraph::new(format!("Count: {}", self.count)),
//!             frame.area(),
//!         );
//!     }
//! }
//! ```
//!
//! [Elm Architecture]: https://guide.elm-lang.org/architecture/

pub mod cancel;
pub mod command;
mod dispatch;
pub mod event;
pub mod model;
pub mod outlet;
pub mod router;
pub mod runtime;
mod system;
pub mod testing;

pub use cancel::CancelToken;
pub use command::{
    Command, CommandHandle, CustomCommand, EffectPanic, SystemEvent, SystemOutput,
};
pub use event::TerminalEvent;
pub use model::Model;
pub use outlet::Outlet;
pub use router::{delegate, route, Component, InputMessage, KeyPattern, Router, RouterGroup};
pub use runtime::{
    log_to_file, OutputTarget, Program, ProgramError, ProgramHandle, ProgramOptions,
};

/// Run an oolong application with default options.
pub async fn run<M: Model>(flags: M::Flags) -> Result<M, ProgramError> {
    Program::<M>::new(flags)?.run().await
}

/// Run with custom options.
pub async fn run_with<M: Model>(
    flags: M::Flags,
    options: ProgramOptions,
) -> Result<M, ProgramError> {
    Program::<M>::with_options(flags, options)?.run().await
}
