use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::cancel::CancelToken;
use crate::outlet::Outlet;

/// How long a cancelled effect may keep running before it is force-terminated.
pub(crate) const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// A side effect returned from [`Model::update`](crate::Model::update) or
/// [`Model::init`](crate::Model::init).
///
/// Commands are immutable descriptions of work; the runtime's dispatcher
/// turns them into concurrent tasks whose results come back to `update` as
/// ordinary messages. The algebra:
///
/// | Constructor | Effect |
/// |-------------|--------|
/// | [`none`](Command::none) | nothing |
/// | [`exit`](Command::exit) | terminate the event loop |
/// | [`message`](Command::message) | deliver a message on the next drain |
/// | [`batch`](Command::batch) | dispatch several commands concurrently |
/// | [`system`](Command::system) | run a subprocess, collect its output |
/// | [`system_streaming`](Command::system_streaming) | run a subprocess, stream its output line by line |
/// | [`custom`](Command::custom) | run a user effect with an [`Outlet`] and a [`CancelToken`] |
/// | [`cancel`](Command::cancel) | request cooperative cancellation of a running custom effect |
///
/// [`map`](Command::map) lifts a command across message types for component
/// composition; see also [`route`](crate::route) and
/// [`delegate`](crate::delegate).
///
/// # Examples
///
/// ```rust,ignore
/// // Run `git status` and hand the captured output to update:
/// let cmd = Command::system("git status --short", Msg::GitStatus);
///
/// // Start a cancellable background worker:
/// let task = CustomCommand::new(|outlet, token| async move {
///     while !token.cancelled() {
///         outlet.put(Msg::Tick);
///         tokio::time::sleep(Duration::from_millis(250)).await;
///     }
/// });
/// let handle = task.handle();
/// let cmd = Command::custom(task);
///
/// // ...later, stop it:
/// let cmd = Command::cancel(handle);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) inner: CommandInner<Msg>,
}

pub(crate) enum CommandInner<Msg: Send + 'static> {
    None,
    Exit,
    Message(Msg),
    Batch(Vec<Command<Msg>>),
    System {
        command_line: String,
        kind: SystemKind<Msg>,
    },
    Custom(CustomCommand<Msg>),
    Cancel(CommandHandle),
}

pub(crate) enum SystemKind<Msg> {
    Batch(Arc<dyn Fn(SystemOutput) -> Msg + Send + Sync>),
    Streaming(Arc<dyn Fn(SystemEvent) -> Msg + Send + Sync>),
}

/// Captured result of a batch-mode [`system`](Command::system) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemOutput {
    /// Everything the process wrote to stdout.
    pub stdout: String,
    /// Everything the process wrote to stderr.
    pub stderr: String,
    /// The process exit status. `127` when the process could not be spawned,
    /// `-1` when it was killed by a signal.
    pub status: i32,
}

/// One event from a streaming-mode
/// [`system_streaming`](Command::system_streaming) command.
///
/// A successfully spawned process produces zero or more `Stdout`/`Stderr`
/// events followed by exactly one `Completed`. A process that could not be
/// spawned produces exactly one `Error` and nothing else. Lines within one
/// stream arrive in emission order; interleaving between the two streams is
/// unordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// One line of stdout, trailing newline included.
    Stdout(String),
    /// One line of stderr, trailing newline included.
    Stderr(String),
    /// The process exited.
    Completed {
        /// The process exit status (`-1` when killed by a signal).
        status: i32,
    },
    /// The process could not be spawned. No `Completed` follows.
    Error {
        /// The spawn error, stringified.
        message: String,
    },
}

/// The identity of a dispatched [`custom`](Command::custom) effect.
///
/// Every [`CustomCommand::new`] call mints a fresh handle, even when two
/// commands wrap the same closure, so each dispatch can be cancelled
/// independently. Pass the handle to [`Command::cancel`] to request
/// cooperative cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(u64);

impl CommandHandle {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        CommandHandle(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Details of a panicked custom effect, delivered to the mapper registered
/// with [`CustomCommand::on_panic`].
#[derive(Debug, Clone)]
pub struct EffectPanic {
    /// The handle of the effect that panicked.
    pub handle: CommandHandle,
    /// The panic payload, stringified.
    pub message: String,
}

type Effect<Msg> = Box<dyn FnOnce(Outlet<Msg>, CancelToken) -> BoxFuture<'static, ()> + Send>;
type PanicMapper<Msg> = Arc<dyn Fn(EffectPanic) -> Msg + Send + Sync>;

/// A user-supplied effect, built with [`CustomCommand::new`] and dispatched
/// via [`Command::custom`].
///
/// The effect runs on its own worker task with an [`Outlet`] for pushing
/// messages back to `update` and a [`CancelToken`] it is expected to poll at
/// safe points. Configure the cancellation grace period with
/// [`grace`](CustomCommand::grace) or
/// [`grace_unbounded`](CustomCommand::grace_unbounded), and keep the
/// [`handle`](CustomCommand::handle) if you intend to cancel the effect
/// later.
pub struct CustomCommand<Msg: Send + 'static> {
    pub(crate) handle: CommandHandle,
    pub(crate) grace: Option<Duration>,
    pub(crate) effect: Effect<Msg>,
    pub(crate) on_panic: Option<PanicMapper<Msg>>,
}

impl<Msg: Send + 'static> CustomCommand<Msg> {
    /// Wrap an async effect. Mints a fresh [`CommandHandle`] per call.
    pub fn new<F, Fut>(effect: F) -> Self
    where
        F: FnOnce(Outlet<Msg>, CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: CommandHandle::next(),
            grace: Some(DEFAULT_GRACE),
            effect: Box::new(move |outlet, token| Box::pin(effect(outlet, token))),
            on_panic: None,
        }
    }

    /// Set how long a [`Command::cancel`] waits for this effect to stop
    /// cooperatively before force-terminating it. Default: 2 seconds.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    /// Never force-terminate this effect: cancellation waits indefinitely
    /// for a cooperative stop.
    ///
    /// Use this for effects holding resources that must not leak.
    pub fn grace_unbounded(mut self) -> Self {
        self.grace = None;
        self
    }

    /// Receive a message when this effect panics.
    ///
    /// Without a mapper, a panic is logged to the diagnostic sink and the
    /// effect's table entry is removed silently. With one, `update`
    /// additionally receives the mapped message and can react.
    pub fn on_panic(mut self, f: impl Fn(EffectPanic) -> Msg + Send + Sync + 'static) -> Self {
        self.on_panic = Some(Arc::new(f));
        self
    }

    /// The identity of this effect, for use with [`Command::cancel`].
    pub fn handle(&self) -> CommandHandle {
        self.handle
    }
}

impl<Msg: Send + 'static> Command<Msg> {
    /// No-op command.
    pub fn none() -> Self {
        Command {
            inner: CommandInner::None,
        }
    }

    /// Terminate the event loop. The runtime runs its shutdown discipline
    /// (cancelling every running effect) before `run` returns.
    pub fn exit() -> Self {
        Command {
            inner: CommandInner::Exit,
        }
    }

    /// Deliver a message on the next drain (no async work).
    pub fn message(msg: Msg) -> Self {
        Command {
            inner: CommandInner::Message(msg),
        }
    }

    /// Dispatch multiple commands concurrently. No ordering is guaranteed
    /// between the messages of different commands in the batch.
    pub fn batch(cmds: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let mut cmds: Vec<_> = cmds.into_iter().collect();
        match cmds.len() {
            0 => Command::none(),
            1 => cmds.pop().unwrap(),
            _ => Command {
                inner: CommandInner::Batch(cmds),
            },
        }
    }

    /// Run `command_line` through `sh -c`, capture its full stdout, stderr,
    /// and exit status, and deliver exactly one `tag(SystemOutput)` message.
    ///
    /// When the process cannot be spawned at all, the same message shape is
    /// used uniformly: `status` is `127` (the shell's command-not-found
    /// convention) and `stderr` carries the spawn error text.
    pub fn system(
        command_line: impl Into<String>,
        tag: impl Fn(SystemOutput) -> Msg + Send + Sync + 'static,
    ) -> Self {
        Command {
            inner: CommandInner::System {
                command_line: command_line.into(),
                kind: SystemKind::Batch(Arc::new(tag)),
            },
        }
    }

    /// Run `command_line` through `sh -c` and deliver its output as it is
    /// produced: one `tag(SystemEvent::Stdout)` / `tag(SystemEvent::Stderr)`
    /// per line (trailing newline included), then exactly one
    /// `tag(SystemEvent::Completed)` after the process exits — or exactly one
    /// `tag(SystemEvent::Error)` if it could not be spawned.
    pub fn system_streaming(
        command_line: impl Into<String>,
        tag: impl Fn(SystemEvent) -> Msg + Send + Sync + 'static,
    ) -> Self {
        Command {
            inner: CommandInner::System {
                command_line: command_line.into(),
                kind: SystemKind::Streaming(Arc::new(tag)),
            },
        }
    }

    /// Run a [`CustomCommand`] effect on a worker task.
    pub fn custom(custom: CustomCommand<Msg>) -> Self {
        Command {
            inner: CommandInner::Custom(custom),
        }
    }

    /// Request cooperative cancellation of the effect identified by `handle`.
    ///
    /// Cancellation travels through the dispatcher like any other effect;
    /// there is no side channel. Cancelling a handle that never ran or has
    /// already finished is a no-op.
    pub fn cancel(handle: CommandHandle) -> Self {
        Command {
            inner: CommandInner::Cancel(handle),
        }
    }

    /// Transform the message type (for component composition).
    ///
    /// Every message the command produces is converted through `f` at the
    /// producing site, so ordering is preserved exactly and
    /// `cmd.map(f).map(g)` delivers the messages of `cmd` converted through
    /// `g ∘ f`. Mapping does not change a custom effect's identity: its
    /// handle still cancels the same dispatch.
    pub fn map<NewMsg: Send + 'static>(
        self,
        f: impl Fn(Msg) -> NewMsg + Send + Sync + 'static,
    ) -> Command<NewMsg> {
        self.map_with(Arc::new(f))
    }

    fn map_with<NewMsg: Send + 'static>(
        self,
        f: Arc<dyn Fn(Msg) -> NewMsg + Send + Sync>,
    ) -> Command<NewMsg> {
        match self.inner {
            CommandInner::None => Command::none(),
            CommandInner::Exit => Command::exit(),
            CommandInner::Message(msg) => Command::message(f(msg)),
            CommandInner::Batch(cmds) => Command {
                inner: CommandInner::Batch(
                    cmds.into_iter().map(|cmd| cmd.map_with(f.clone())).collect(),
                ),
            },
            CommandInner::System { command_line, kind } => Command {
                inner: CommandInner::System {
                    command_line,
                    kind: match kind {
                        SystemKind::Batch(tag) => {
                            let f = f.clone();
                            SystemKind::Batch(Arc::new(move |output| f(tag(output))))
                        }
                        SystemKind::Streaming(tag) => {
                            let f = f.clone();
                            SystemKind::Streaming(Arc::new(move |event| f(tag(event))))
                        }
                    },
                },
            },
            CommandInner::Custom(custom) => {
                let CustomCommand {
                    handle,
                    grace,
                    effect,
                    on_panic,
                } = custom;
                let effect_f = f.clone();
                Command {
                    inner: CommandInner::Custom(CustomCommand {
                        handle,
                        grace,
                        effect: Box::new(move |outlet: Outlet<NewMsg>, token| {
                            effect(outlet.map(move |msg| effect_f(msg)), token)
                        }),
                        on_panic: on_panic.map(|p| {
                            let f = f.clone();
                            Arc::new(move |panic: EffectPanic| f(p(panic))) as PanicMapper<NewMsg>
                        }),
                    }),
                }
            }
            CommandInner::Cancel(handle) => Command::cancel(handle),
        }
    }

    // --- Inspection methods (useful for testing) ---

    /// Returns `true` if this is a no-op command.
    pub fn is_none(&self) -> bool {
        matches!(self.inner, CommandInner::None)
    }

    /// Returns `true` if this command terminates the event loop.
    pub fn is_exit(&self) -> bool {
        matches!(self.inner, CommandInner::Exit)
    }

    /// If this command is an immediate message, return it.
    pub fn into_message(self) -> Option<Msg> {
        match self.inner {
            CommandInner::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_none() {
        let cmd: Command<()> = Command::none();
        assert!(cmd.is_none());
        assert!(!cmd.is_exit());
    }

    #[test]
    fn exit_is_exit() {
        let cmd: Command<()> = Command::exit();
        assert!(cmd.is_exit());
    }

    #[test]
    fn message_round_trips() {
        let cmd: Command<i32> = Command::message(42);
        assert_eq!(cmd.into_message(), Some(42));
    }

    #[test]
    fn batch_empty_collapses_to_none() {
        let cmd: Command<()> = Command::batch(vec![]);
        assert!(cmd.is_none());
    }

    #[test]
    fn batch_single_unwraps() {
        let cmd: Command<i32> = Command::batch(vec![Command::message(1)]);
        assert_eq!(cmd.into_message(), Some(1));
    }

    #[test]
    fn batch_multiple_stays_a_batch() {
        let cmd: Command<i32> = Command::batch(vec![Command::message(1), Command::message(2)]);
        assert!(matches!(cmd.inner, CommandInner::Batch(ref cmds) if cmds.len() == 2));
    }

    #[test]
    fn custom_commands_have_fresh_identity() {
        // Same shared closure, two constructions: two distinct handles.
        let effect = |_outlet: Outlet<()>, _token: CancelToken| async {};
        let a = CustomCommand::new(effect);
        let b = CustomCommand::new(effect);
        assert_ne!(a.handle(), b.handle());
    }

    #[test]
    fn map_converts_immediate_messages() {
        let cmd: Command<i32> = Command::message(42);
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        assert_eq!(mapped.into_message(), Some("42".to_string()));
    }

    #[test]
    fn map_preserves_exit_and_cancel() {
        let mapped: Command<String> = Command::<i32>::exit().map(|n| n.to_string());
        assert!(mapped.is_exit());

        let task = CustomCommand::<i32>::new(|_, _| async {});
        let handle = task.handle();
        let mapped: Command<String> = Command::<i32>::cancel(handle).map(|n| n.to_string());
        assert!(matches!(mapped.inner, CommandInner::Cancel(h) if h == handle));
    }

    #[test]
    fn map_preserves_custom_identity() {
        let task = CustomCommand::<i32>::new(|_, _| async {});
        let handle = task.handle();
        let mapped: Command<String> = Command::custom(task).map(|n| n.to_string());
        match mapped.inner {
            CommandInner::Custom(custom) => assert_eq!(custom.handle(), handle),
            _ => panic!("expected Custom"),
        }
    }

    #[test]
    fn map_composes_on_system_tags() {
        // map(map(c, f), g) tags through g ∘ f.
        let cmd: Command<i32> = Command::system("true", |out: SystemOutput| out.status);
        let composed: Command<String> = cmd.map(|n| n + 1).map(|n| format!("status {n}"));
        match composed.inner {
            CommandInner::System { kind, .. } => match kind {
                SystemKind::Batch(tag) => {
                    let msg = tag(SystemOutput {
                        stdout: String::new(),
                        stderr: String::new(),
                        status: 0,
                    });
                    assert_eq!(msg, "status 1");
                }
                SystemKind::Streaming(_) => panic!("expected batch kind"),
            },
            _ => panic!("expected System"),
        }
    }

    #[test]
    fn map_composes_on_streaming_tags() {
        let cmd: Command<SystemEvent> = Command::system_streaming("true", |ev| ev);
        let mapped: Command<(u8, SystemEvent)> = cmd.map(|ev| (1, ev));
        match mapped.inner {
            CommandInner::System { kind, .. } => match kind {
                SystemKind::Streaming(tag) => {
                    let msg = tag(SystemEvent::Stdout("a\n".into()));
                    assert_eq!(msg, (1, SystemEvent::Stdout("a\n".into())));
                }
                SystemKind::Batch(_) => panic!("expected streaming kind"),
            },
            _ => panic!("expected System"),
        }
    }

    #[test]
    fn map_batch_maps_every_element() {
        let cmd: Command<i32> = Command::batch(vec![Command::message(1), Command::message(2)]);
        let mapped: Command<String> = cmd.map(|n| n.to_string());
        match mapped.inner {
            CommandInner::Batch(cmds) => {
                let msgs: Vec<_> = cmds
                    .into_iter()
                    .map(|c| c.into_message().expect("message"))
                    .collect();
                assert_eq!(msgs, vec!["1".to_string(), "2".to_string()]);
            }
            _ => panic!("expected Batch"),
        }
    }
}
