//! Composition layer for hierarchical ("fractal") update functions.
//!
//! A parent model embeds child [`Component`]s, wraps each child's message
//! type in one of its own variants, and wires the two together with
//! [`delegate`] (messages down) and [`route`] (commands up). For models that
//! are mostly routing — forward these variants to children, bind those keys
//! to handlers, keep a modal guard on the keymap — the [`Router`] builder
//! produces the whole update function from a declarative description.
//!
//! ```rust,ignore
//! fn update(&mut self, msg: Msg) -> Command<Msg> {
//!     self.router().dispatch(self, msg)
//! }
//!
//! fn router() -> Router<App> {
//!     Router::new()
//!         .child(|app: &mut App, msg| match msg {
//!             Msg::Net(m) => Ok(delegate(&mut app.net, m, Msg::Net)),
//!             other => Err(other),
//!         })
//!         .key('q', |_app| Command::exit())
//!         .group(|g| {
//!             g.unless(|app: &App| app.modal_open)
//!                 .key('s', |app| app.start_search())
//!                 .key('r', |app| app.refresh())
//!         })
//! }
//! ```
//!
//! Child routes are always consulted before key and mouse bindings: a modal
//! that guards the keymap off cannot swallow the result of an asynchronous
//! command it did not initiate.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{layout::Rect, Frame};

use crate::command::Command;
use crate::model::Model;

/// Lift a child's command into the parent's message type.
///
/// `wrap` is the parent's wrapping variant constructor. Equivalent to
/// [`Command::map`]; provided as a free function so parent/child wiring
/// reads declaratively next to [`delegate`].
pub fn route<Child, Parent>(
    cmd: Command<Child>,
    wrap: impl Fn(Child) -> Parent + Send + Sync + 'static,
) -> Command<Parent>
where
    Child: Send + 'static,
    Parent: Send + 'static,
{
    cmd.map(wrap)
}

/// Forward a message to a child component and lift the resulting command
/// back into the parent's message type.
///
/// `delegate(child, msg, wrap)` invokes `child.update(msg)` and wraps the
/// returned command with [`route`], so results of effects the child starts
/// find their way back to the child on the next cycle.
pub fn delegate<C: Component, Parent: Send + 'static>(
    child: &mut C,
    msg: C::Message,
    wrap: impl Fn(C::Message) -> Parent + Send + Sync + 'static,
) -> Command<Parent> {
    route(child.update(msg), wrap)
}

/// A reusable sub-model that renders into a given [`Rect`] area.
///
/// `Component` is nearly identical to [`Model`] but its
/// [`view`](Component::view) receives an `area: Rect`, making components
/// composable within layouts: the parent decides *where* each child renders
/// by passing it a sub-region of the frame. Wire a component into a parent
/// with [`delegate`] and [`route`].
pub trait Component: Send + 'static {
    /// The component's internal message type. Parents typically wrap this in
    /// one of their own message variants.
    type Message: Send + 'static;

    /// Process a message, mutate state, and return a [`Command`] for side
    /// effects, exactly like [`Model::update`]. The parent lifts the
    /// returned command with [`route`] (or uses [`delegate`], which does
    /// both steps).
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Render into a specific `area` of the [`Frame`]. Implementations
    /// should confine all rendering to the given rectangle.
    fn view(&self, frame: &mut Frame, area: Rect);

    /// Whether this component currently has focus. A hint for input
    /// routing; the default implementation returns `false`.
    fn focused(&self) -> bool {
        false
    }
}

/// Lets the [`Router`] recognize input messages.
///
/// Implement this on your message type by exposing the wrapped event:
///
/// ```rust,ignore
/// impl InputMessage for Msg {
///     fn key(&self) -> Option<&KeyEvent> {
///         match self {
///             Msg::Key(key) => Some(key),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait InputMessage {
    /// The key event carried by this message, if any.
    fn key(&self) -> Option<&KeyEvent> {
        None
    }

    /// The mouse event carried by this message, if any.
    fn mouse(&self) -> Option<&MouseEvent> {
        None
    }
}

/// A key press shape that key bindings match against: a key code plus the
/// modifiers that must be held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    code: KeyCode,
    modifiers: KeyModifiers,
}

impl KeyPattern {
    /// Match `code` with no modifiers required.
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    /// Match a plain character key.
    pub fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c))
    }

    /// Match Ctrl + `c`.
    pub fn ctrl(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
        }
    }

    /// Match Alt + `c`.
    pub fn alt(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::ALT,
        }
    }

    /// Match `code` with an explicit modifier set.
    pub fn with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// Whether the given key event matches this pattern.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.code == event.code && event.modifiers.contains(self.modifiers)
    }
}

impl From<char> for KeyPattern {
    fn from(c: char) -> Self {
        KeyPattern::char(c)
    }
}

impl From<KeyCode> for KeyPattern {
    fn from(code: KeyCode) -> Self {
        KeyPattern::new(code)
    }
}

type Guard<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;
type KeyHandler<M> = Box<dyn Fn(&mut M) -> Command<<M as Model>::Message> + Send + Sync>;
type MouseHandler<M> =
    Box<dyn Fn(&mut M, &MouseEvent) -> Command<<M as Model>::Message> + Send + Sync>;
type ChildRoute<M> = Box<
    dyn Fn(&mut M, <M as Model>::Message) -> Result<Command<<M as Model>::Message>, <M as Model>::Message>
        + Send
        + Sync,
>;

struct KeyBinding<M: Model> {
    pattern: KeyPattern,
    guard: Option<Guard<M>>,
    handler: KeyHandler<M>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MouseKind {
    Click,
    ScrollUp,
    ScrollDown,
}

struct MouseBinding<M: Model> {
    kind: MouseKind,
    guard: Option<Guard<M>>,
    handler: MouseHandler<M>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum GuardKind {
    When,
    Unless,
}

fn and_guards<M: 'static>(a: Option<Guard<M>>, b: Option<Guard<M>>) -> Option<Guard<M>> {
    match (a, b) {
        (None, None) => None,
        (Some(g), None) | (None, Some(g)) => Some(g),
        (Some(a), Some(b)) => Some(Arc::new(move |model| a(model) && b(model))),
    }
}

fn guard_passes<M>(guard: &Option<Guard<M>>, model: &M) -> bool {
    guard.as_ref().map(|g| g(model)).unwrap_or(true)
}

/// A declarative dispatch table for an update function.
///
/// Build with the fluent methods, then call
/// [`dispatch`](Router::dispatch) from `update`. Dispatch order within one
/// invocation:
///
/// 1. every registered [`child`](Router::child) route, in registration
///    order — the first that claims the message wins;
/// 2. if the message is a key event, the first key binding whose pattern
///    matches and whose guards pass;
/// 3. if the message is a mouse event, the first matching mouse binding;
/// 4. otherwise [`Command::none`].
///
/// See the [module docs](self) for an example.
pub struct Router<M: Model> {
    children: Vec<ChildRoute<M>>,
    keys: Vec<KeyBinding<M>>,
    mouse: Vec<MouseBinding<M>>,
}

impl<M: Model> Router<M>
where
    M::Message: InputMessage,
{
    /// An empty router: every message falls through to [`Command::none`].
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            keys: Vec::new(),
            mouse: Vec::new(),
        }
    }

    /// Register a child route.
    ///
    /// The matcher receives every message before any key or mouse binding.
    /// Return `Ok(command)` when the message belonged to the child
    /// (typically via [`delegate`]); return `Err(msg)` to hand the message
    /// back so later routes and bindings can try it.
    pub fn child(
        mut self,
        matcher: impl Fn(&mut M, M::Message) -> Result<Command<M::Message>, M::Message>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.children.push(Box::new(matcher));
        self
    }

    /// Bind a key to a handler.
    pub fn key(
        mut self,
        pattern: impl Into<KeyPattern>,
        handler: impl Fn(&mut M) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.keys.push(KeyBinding {
            pattern: pattern.into(),
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind a key to a handler that only fires while `pred` is true.
    pub fn key_when(
        mut self,
        pattern: impl Into<KeyPattern>,
        pred: impl Fn(&M) -> bool + Send + Sync + 'static,
        handler: impl Fn(&mut M) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.keys.push(KeyBinding {
            pattern: pattern.into(),
            guard: Some(Arc::new(pred)),
            handler: Box::new(handler),
        });
        self
    }

    /// Bind a key to a handler that only fires while `pred` is false.
    pub fn key_unless(
        self,
        pattern: impl Into<KeyPattern>,
        pred: impl Fn(&M) -> bool + Send + Sync + 'static,
        handler: impl Fn(&mut M) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.key_when(pattern, move |model| !pred(model), handler)
    }

    /// Bind left-button clicks to a handler. The handler receives the mouse
    /// event for its coordinates.
    pub fn on_click(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::Click,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind scroll-up to a handler.
    pub fn on_scroll_up(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::ScrollUp,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind scroll-down to a handler.
    pub fn on_scroll_down(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::ScrollDown,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Register a block of bindings sharing a guard.
    ///
    /// The group's [`when`](RouterGroup::when) /
    /// [`unless`](RouterGroup::unless) guard applies to every binding
    /// registered inside; nested groups and per-key guards compose by
    /// logical AND.
    ///
    /// # Panics
    ///
    /// When the closure registers both `when` and `unless` on the same
    /// group. Pick one polarity per group.
    pub fn group(mut self, build: impl FnOnce(RouterGroup<M>) -> RouterGroup<M>) -> Self {
        let group = build(RouterGroup::new());
        let RouterGroup {
            guard, keys, mouse, ..
        } = group;
        for mut binding in keys {
            binding.guard = and_guards(guard.clone(), binding.guard.take());
            self.keys.push(binding);
        }
        for mut binding in mouse {
            binding.guard = and_guards(guard.clone(), binding.guard.take());
            self.mouse.push(binding);
        }
        self
    }

    /// Dispatch one message: child routes, then key bindings, then mouse
    /// bindings, else [`Command::none`].
    pub fn dispatch(&self, model: &mut M, msg: M::Message) -> Command<M::Message> {
        let mut msg = msg;
        for child in &self.children {
            match child(model, msg) {
                Ok(cmd) => return cmd,
                Err(unclaimed) => msg = unclaimed,
            }
        }

        if let Some(key) = msg.key() {
            for binding in &self.keys {
                if binding.pattern.matches(key) && guard_passes(&binding.guard, model) {
                    return (binding.handler)(model);
                }
            }
        } else if let Some(mouse) = msg.mouse() {
            let kind = match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => Some(MouseKind::Click),
                MouseEventKind::ScrollUp => Some(MouseKind::ScrollUp),
                MouseEventKind::ScrollDown => Some(MouseKind::ScrollDown),
                _ => None,
            };
            if let Some(kind) = kind {
                for binding in &self.mouse {
                    if binding.kind == kind && guard_passes(&binding.guard, model) {
                        return (binding.handler)(model, mouse);
                    }
                }
            }
        }

        Command::none()
    }
}

impl<M: Model> Default for Router<M>
where
    M::Message: InputMessage,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A block of bindings sharing one guard, built inside
/// [`Router::group`].
pub struct RouterGroup<M: Model> {
    guard: Option<Guard<M>>,
    kind: Option<GuardKind>,
    keys: Vec<KeyBinding<M>>,
    mouse: Vec<MouseBinding<M>>,
}

impl<M: Model> RouterGroup<M> {
    fn new() -> Self {
        Self {
            guard: None,
            kind: None,
            keys: Vec::new(),
            mouse: Vec::new(),
        }
    }

    /// Run this group's bindings only while `pred` is true. Repeated `when`
    /// calls compose by logical AND.
    ///
    /// # Panics
    ///
    /// When the group already carries an [`unless`](RouterGroup::unless)
    /// guard.
    pub fn when(mut self, pred: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        if self.kind == Some(GuardKind::Unless) {
            panic!("cannot combine `when` and `unless` guards in the same group");
        }
        self.kind = Some(GuardKind::When);
        self.guard = and_guards(self.guard.take(), Some(Arc::new(pred)));
        self
    }

    /// Run this group's bindings only while `pred` is false.
    ///
    /// # Panics
    ///
    /// When the group already carries a [`when`](RouterGroup::when) guard.
    pub fn unless(mut self, pred: impl Fn(&M) -> bool + Send + Sync + 'static) -> Self {
        if self.kind == Some(GuardKind::When) {
            panic!("cannot combine `when` and `unless` guards in the same group");
        }
        self.kind = Some(GuardKind::Unless);
        self.guard = and_guards(self.guard.take(), Some(Arc::new(move |model: &M| !pred(model))));
        self
    }

    /// Bind a key to a handler within this group.
    pub fn key(
        mut self,
        pattern: impl Into<KeyPattern>,
        handler: impl Fn(&mut M) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.keys.push(KeyBinding {
            pattern: pattern.into(),
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind a key with an additional per-key guard (ANDed with the group's).
    pub fn key_when(
        mut self,
        pattern: impl Into<KeyPattern>,
        pred: impl Fn(&M) -> bool + Send + Sync + 'static,
        handler: impl Fn(&mut M) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.keys.push(KeyBinding {
            pattern: pattern.into(),
            guard: Some(Arc::new(pred)),
            handler: Box::new(handler),
        });
        self
    }

    /// Bind left-button clicks within this group.
    pub fn on_click(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::Click,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind scroll-up within this group.
    pub fn on_scroll_up(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::ScrollUp,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Bind scroll-down within this group.
    pub fn on_scroll_down(
        mut self,
        handler: impl Fn(&mut M, &MouseEvent) -> Command<M::Message> + Send + Sync + 'static,
    ) -> Self {
        self.mouse.push(MouseBinding {
            kind: MouseKind::ScrollDown,
            guard: None,
            handler: Box::new(handler),
        });
        self
    }

    /// Nest a group; the nested guard composes with this group's by logical
    /// AND.
    pub fn group(mut self, build: impl FnOnce(RouterGroup<M>) -> RouterGroup<M>) -> Self {
        let nested = build(RouterGroup::new());
        for mut binding in nested.keys {
            binding.guard = and_guards(nested.guard.clone(), binding.guard.take());
            self.keys.push(binding);
        }
        for mut binding in nested.mouse {
            binding.guard = and_guards(nested.guard.clone(), binding.guard.take());
            self.mouse.push(binding);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(c: char) -> KeyEvent {
        KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl_key(c: char) -> KeyEvent {
        KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn scroll_up() -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 3,
            row: 7,
            modifiers: KeyModifiers::NONE,
        }
    }

    // -- child component -----------------------------------------------------

    struct Fetcher {
        done: bool,
    }

    #[derive(Debug, PartialEq)]
    enum FetchMsg {
        Done,
    }

    impl Component for Fetcher {
        type Message = FetchMsg;

        fn update(&mut self, msg: FetchMsg) -> Command<FetchMsg> {
            match msg {
                FetchMsg::Done => self.done = true,
            }
            Command::none()
        }

        fn view(&self, _frame: &mut Frame, _area: Rect) {}
    }

    // -- parent model --------------------------------------------------------

    struct App {
        fetcher: Fetcher,
        modal_open: bool,
        searches: u32,
        scrolls: u32,
    }

    #[derive(Debug)]
    enum Msg {
        Key(KeyEvent),
        Mouse(MouseEvent),
        Fetch(FetchMsg),
    }

    impl InputMessage for Msg {
        fn key(&self) -> Option<&KeyEvent> {
            match self {
                Msg::Key(key) => Some(key),
                _ => None,
            }
        }

        fn mouse(&self) -> Option<&MouseEvent> {
            match self {
                Msg::Mouse(mouse) => Some(mouse),
                _ => None,
            }
        }
    }

    impl Model for App {
        type Message = Msg;
        type Flags = ();

        fn init(_: ()) -> (Self, Command<Msg>) {
            (
                App {
                    fetcher: Fetcher { done: false },
                    modal_open: false,
                    searches: 0,
                    scrolls: 0,
                },
                Command::none(),
            )
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            router().dispatch(self, msg)
        }

        fn view(&self, _frame: &mut Frame) {}
    }

    fn router() -> Router<App> {
        Router::new()
            .child(|app: &mut App, msg| match msg {
                Msg::Fetch(m) => Ok(delegate(&mut app.fetcher, m, Msg::Fetch)),
                other => Err(other),
            })
            .group(|g| {
                g.unless(|app: &App| app.modal_open).key('s', |app| {
                    app.searches += 1;
                    Command::none()
                })
            })
            .on_scroll_up(|app, _mouse| {
                app.scrolls += 1;
                Command::none()
            })
    }

    fn app() -> App {
        App::init(()).0
    }

    #[test]
    fn delegate_invokes_child_update_and_routes_the_command() {
        let mut fetcher = Fetcher { done: false };
        let cmd: Command<Msg> = delegate(&mut fetcher, FetchMsg::Done, Msg::Fetch);
        assert!(fetcher.done);
        assert!(cmd.is_none());
    }

    #[test]
    fn route_wraps_command_messages() {
        let cmd: Command<Msg> = route(Command::message(FetchMsg::Done), Msg::Fetch);
        match cmd.into_message() {
            Some(Msg::Fetch(FetchMsg::Done)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn key_binding_fires_when_unguarded() {
        let mut app = app();
        router().dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 1);
    }

    #[test]
    fn guard_blocks_key_dispatch_while_modal_open() {
        let mut app = app();
        app.modal_open = true;
        router().dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 0);
    }

    #[test]
    fn child_route_wins_even_when_guards_are_off() {
        // A guarded-off keymap must not swallow a child's command result.
        let mut app = app();
        app.modal_open = true;
        router().dispatch(&mut app, Msg::Fetch(FetchMsg::Done));
        assert!(app.fetcher.done);
    }

    #[test]
    fn unmatched_message_falls_through_to_none() {
        let mut app = app();
        let cmd = router().dispatch(&mut app, Msg::Key(key('z')));
        assert!(cmd.is_none());
        assert_eq!(app.searches, 0);
    }

    #[test]
    fn mouse_binding_dispatches_by_kind() {
        let mut app = app();
        router().dispatch(&mut app, Msg::Mouse(scroll_up()));
        assert_eq!(app.scrolls, 1);
    }

    #[test]
    fn first_matching_key_binding_wins() {
        let r = Router::<App>::new()
            .key('s', |app| {
                app.searches += 10;
                Command::none()
            })
            .key('s', |app| {
                app.searches += 1;
                Command::none()
            });
        let mut app = app();
        r.dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 10);
    }

    #[test]
    fn nested_group_guards_compose_by_and() {
        let r = Router::<App>::new().group(|g| {
            g.when(|app: &App| !app.modal_open).group(|inner| {
                inner.when(|app: &App| app.searches < 1).key('s', |app| {
                    app.searches += 1;
                    Command::none()
                })
            })
        });

        let mut app = app();
        r.dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 1);
        // Inner guard now false: binding no longer fires.
        r.dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 1);
        // Outer guard false blocks it too.
        app.searches = 0;
        app.modal_open = true;
        r.dispatch(&mut app, Msg::Key(key('s')));
        assert_eq!(app.searches, 0);
    }

    #[test]
    #[should_panic(expected = "cannot combine `when` and `unless`")]
    fn mixing_when_and_unless_panics_at_registration() {
        let _ = Router::<App>::new().group(|g| {
            g.when(|app: &App| app.modal_open)
                .unless(|app: &App| app.modal_open)
        });
    }

    #[test]
    fn key_pattern_requires_modifiers() {
        let pattern = KeyPattern::ctrl('c');
        assert!(pattern.matches(&ctrl_key('c')));
        assert!(!pattern.matches(&key('c')));
    }

    #[test]
    fn plain_pattern_matches_modified_key() {
        // NONE is a subset of every modifier set, so an unmodified pattern
        // also matches modified presses.
        let pattern = KeyPattern::char('c');
        assert!(pattern.matches(&ctrl_key('c')));
    }
}
