use ratatui::Frame;

use crate::command::Command;
use crate::event::TerminalEvent;

/// The top-level application trait, following the [Elm Architecture].
///
/// The runtime drives a continuous **init -> update -> view** cycle:
///
/// 1. [`init`](Model::init) creates the initial state and may return a
///    [`Command`] to kick off early work.
/// 2. [`view`](Model::view) renders the current state to a
///    [`ratatui::Frame`].
/// 3. Terminal input arrives as [`TerminalEvent`]s; the model converts each
///    into a message with [`on_event`](Model::on_event).
/// 4. [`update`](Model::update) processes each message, mutates state, and
///    returns a [`Command`] describing further side effects. The dispatcher
///    runs those effects on worker tasks, and their results come back to
///    `update` as ordinary messages.
/// 5. Steps 2--4 repeat until `update` returns [`Command::exit`].
///
/// `update` is never invoked concurrently with itself or with `view`: all
/// state transitions happen on the loop task, one message at a time, no
/// matter how many effects are in flight.
///
/// # Example
///
/// ```rust,ignore
/// use oolong_core::{Command, Model, TerminalEvent};
/// use crossterm::event::KeyCode;
/// use ratatui::Frame;
/// use ratatui::widgets::Paragraph;
///
/// struct Counter { count: i32 }
///
/// enum Msg { Increment, Quit }
///
/// impl Model for Counter {
///     type Message = Msg;
///     type Flags = ();
///
///     fn init(_flags: ()) -> (Self, Command<Msg>) {
///         (Counter { count: 0 }, Command::none())
///     }
///
///     fn on_event(&self, event: TerminalEvent) -> Option<Msg> {
///         match event.key()?.code {
///             KeyCode::Char('a') => Some(Msg::Increment),
///             KeyCode::Char('q') => Some(Msg::Quit),
///             _ => None,
///         }
///     }
///
///     fn update(&mut self, msg: Msg) -> Command<Msg> {
///         match msg {
///             Msg::Increment => {
///                 self.count += 1;
///                 Command::none()
///             }
///             Msg::Quit => Command::exit(),
///         }
///     }
///
///     fn view(&self, frame: &mut Frame) {
///         frame.render_widget(
///             Paragraph::new(format!("Count: {}", self.count)),
///             frame.area(),
///         );
///     }
/// }
/// ```
///
/// [Elm Architecture]: https://guide.elm-lang.org/architecture/
pub trait Model: Sized + Send + 'static {
    /// The application's message type.
    ///
    /// Every occurrence that can affect state is a variant of this type:
    /// mapped input events, subprocess results, messages put through an
    /// [`Outlet`](crate::Outlet) by a custom effect.
    type Message: Send + 'static;

    /// Initialization data passed to [`Model::init`]. Use `()` when no
    /// startup data is needed.
    type Flags: Send + 'static;

    /// Create the initial model and an optional startup command.
    fn init(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Convert a terminal event into a message, or `None` to discard it.
    ///
    /// Called by the loop for every polled event before `update`. The
    /// default discards everything, which suits models driven purely by
    /// injected messages or effect results.
    fn on_event(&self, event: TerminalEvent) -> Option<Self::Message> {
        let _ = event;
        None
    }

    /// Process a message, mutate state, and return a command for side
    /// effects. Return [`Command::exit`] to terminate the loop; the model as
    /// it stands after the final `update` is what
    /// [`run`](crate::run) returns.
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Render the current state to a ratatui [`Frame`].
    ///
    /// Should be a pure function of `&self`. Render an empty frame (or
    /// [`ratatui::widgets::Clear`]) to blank the screen explicitly.
    fn view(&self, frame: &mut Frame);
}
