//! The command dispatcher: turns [`Command`] values into concurrent work and
//! inbox messages, and tracks running custom effects for cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::cancel::CancelToken;
use crate::command::{Command, CommandHandle, CommandInner, CustomCommand, EffectPanic, SystemKind};
use crate::outlet::Outlet;
use crate::system;

/// How long shutdown waits for cancelled effects before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// A message on the runtime inbox.
///
/// `App` is the only variant the application observes; the rest are
/// notifications the loop uses to maintain the active-command table.
pub(crate) enum Inbound<Msg> {
    App(Msg),
    /// A custom effect returned normally.
    Finished(CommandHandle),
    /// A custom effect panicked; `message` is the stringified payload.
    Panicked {
        handle: CommandHandle,
        message: String,
    },
}

/// Table entry for a running custom effect.
pub(crate) struct ActiveCommand<Msg: Send + 'static> {
    /// Completes when the effect has finished, panicked, or been aborted.
    supervisor: JoinHandle<()>,
    /// Force-terminates the effect task itself.
    abort: AbortHandle,
    token: CancelToken,
    grace: Option<Duration>,
    pub(crate) on_panic: Option<Arc<dyn Fn(EffectPanic) -> Msg + Send + Sync>>,
}

pub(crate) struct Dispatcher<Msg: Send + 'static> {
    tx: mpsc::UnboundedSender<Inbound<Msg>>,
    active: HashMap<CommandHandle, ActiveCommand<Msg>>,
    /// System workers and cancellation waiters, joined by `settle`.
    workers: Vec<JoinHandle<()>>,
}

impl<Msg: Send + 'static> Dispatcher<Msg> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound<Msg>>) -> Self {
        Self {
            tx,
            active: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Translate a command into work. Returns `true` when the command (or a
    /// nested command in a batch) requests loop exit.
    pub(crate) fn dispatch(&mut self, cmd: Command<Msg>) -> bool {
        self.workers.retain(|worker| !worker.is_finished());
        match cmd.inner {
            CommandInner::None => false,
            CommandInner::Exit => true,
            CommandInner::Message(msg) => {
                let _ = self.tx.send(Inbound::App(msg));
                false
            }
            CommandInner::Batch(cmds) => {
                let mut exit = false;
                for cmd in cmds {
                    exit |= self.dispatch(cmd);
                }
                exit
            }
            CommandInner::System { command_line, kind } => {
                self.spawn_system(command_line, kind);
                false
            }
            CommandInner::Custom(custom) => {
                self.spawn_custom(custom);
                false
            }
            CommandInner::Cancel(handle) => {
                self.cancel(handle);
                false
            }
        }
    }

    fn spawn_system(&mut self, command_line: String, kind: SystemKind<Msg>) {
        let tx = self.tx.clone();
        let worker = match kind {
            SystemKind::Batch(tag) => tokio::spawn(async move {
                let output = system::run_batch(&command_line).await;
                let _ = tx.send(Inbound::App(tag(output)));
            }),
            SystemKind::Streaming(tag) => {
                tokio::spawn(system::run_streaming(command_line, tag, tx))
            }
        };
        self.workers.push(worker);
    }

    fn spawn_custom(&mut self, custom: CustomCommand<Msg>) {
        let CustomCommand {
            handle,
            grace,
            effect,
            on_panic,
        } = custom;

        let token = CancelToken::new();
        let outlet = Outlet::new(self.tx.clone());
        let effect_task = tokio::spawn(effect(outlet, token.clone()));
        let abort = effect_task.abort_handle();

        // The supervisor flattens the effect's outcome into an inbox
        // notification; the loop removes the table entry when it arrives.
        let tx = self.tx.clone();
        let supervisor = tokio::spawn(async move {
            match effect_task.await {
                Ok(()) => {
                    let _ = tx.send(Inbound::Finished(handle));
                }
                Err(err) if err.is_panic() => {
                    let message = panic_message(err.into_panic());
                    let _ = tx.send(Inbound::Panicked { handle, message });
                }
                // Aborted: the cancel waiter already removed the entry.
                Err(_) => {}
            }
        });

        self.active.insert(
            handle,
            ActiveCommand {
                supervisor,
                abort,
                token,
                grace,
                on_panic,
            },
        );
    }

    /// Signal the effect's token and arrange force-termination if it outlives
    /// its grace period. No-op for unknown or already-finished handles. Never
    /// blocks the loop.
    fn cancel(&mut self, handle: CommandHandle) {
        let Some(entry) = self.active.remove(&handle) else {
            return;
        };
        entry.token.cancel();

        let ActiveCommand {
            supervisor,
            abort,
            grace,
            ..
        } = entry;
        let waiter = tokio::spawn(async move {
            match grace {
                None => {
                    // Unbounded grace: wait for the cooperative stop forever.
                    let _ = supervisor.await;
                }
                Some(grace) => {
                    if tokio::time::timeout(grace, supervisor).await.is_err() {
                        tracing::warn!(
                            ?handle,
                            grace_ms = grace.as_millis() as u64,
                            "effect ignored cancellation past its grace period; force-terminating"
                        );
                        abort.abort();
                    }
                }
            }
        });
        self.workers.push(waiter);
    }

    /// Remove a table entry after its `Finished`/`Panicked` notification.
    pub(crate) fn remove(&mut self, handle: CommandHandle) -> Option<ActiveCommand<Msg>> {
        self.active.remove(&handle)
    }

    /// Whether the effect identified by `handle` is still in the table.
    pub(crate) fn is_active(&self, handle: CommandHandle) -> bool {
        self.active.contains_key(&handle)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Wait for every pending worker to finish: system workers, cancellation
    /// waiters, and running custom effects. Part of the `Sync` semantics.
    pub(crate) async fn join_pending(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        // Supervisors stay in the table until the loop processes their
        // Finished notification, so poll rather than consume.
        while self
            .active
            .values()
            .any(|entry| !entry.supervisor.is_finished())
        {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Whether any worker is still running.
    pub(crate) fn pending(&mut self) -> bool {
        self.workers.retain(|worker| !worker.is_finished());
        !self.workers.is_empty()
            || self
                .active
                .values()
                .any(|entry| !entry.supervisor.is_finished())
    }

    /// The shutdown discipline: signal every token, wait briefly for
    /// cooperative stops, force-terminate survivors, clear the table.
    pub(crate) async fn shutdown(&mut self) {
        for entry in self.active.values() {
            entry.token.cancel();
        }

        let mut supervisors = Vec::new();
        let mut aborts = Vec::new();
        for (handle, entry) in self.active.drain() {
            supervisors.push((handle, entry.supervisor));
            aborts.push(entry.abort);
        }

        let all = futures::future::join_all(
            supervisors
                .into_iter()
                .map(|(handle, supervisor)| async move { (handle, supervisor.await) }),
        );
        match tokio::time::timeout(SHUTDOWN_GRACE, all).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!("effects still running at shutdown; force-terminating");
                for abort in &aborts {
                    abort.abort();
                }
            }
        }

        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload of unknown type".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SystemEvent, SystemOutput};

    fn dispatcher() -> (
        Dispatcher<TestMsg>,
        mpsc::UnboundedReceiver<Inbound<TestMsg>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(tx), rx)
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestMsg {
        Out(SystemOutput),
        Stream(SystemEvent),
        Routed(Box<TestMsg>),
        Tick,
        Stopped,
    }

    async fn drain_app(rx: &mut mpsc::UnboundedReceiver<Inbound<TestMsg>>) -> Vec<TestMsg> {
        let mut msgs = Vec::new();
        while let Ok(inbound) = rx.try_recv() {
            if let Inbound::App(msg) = inbound {
                msgs.push(msg);
            }
        }
        msgs
    }

    #[tokio::test]
    async fn batch_system_emits_exactly_one_message() {
        let (mut dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch(Command::system("echo hi", TestMsg::Out));
        dispatcher.join_pending().await;

        let msgs = drain_app(&mut rx).await;
        assert_eq!(
            msgs,
            vec![TestMsg::Out(SystemOutput {
                stdout: "hi\n".into(),
                stderr: String::new(),
                status: 0,
            })]
        );
    }

    #[tokio::test]
    async fn streaming_system_delivers_lines_then_completion() {
        let (mut dispatcher, mut rx) = dispatcher();
        dispatcher.dispatch(Command::system_streaming(
            "printf 'a\\nb\\n'; printf 'x\\n' 1>&2",
            TestMsg::Stream,
        ));
        dispatcher.join_pending().await;

        let msgs = drain_app(&mut rx).await;
        let events: Vec<_> = msgs
            .into_iter()
            .map(|msg| match msg {
                TestMsg::Stream(ev) => ev,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();

        let stdout: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                SystemEvent::Stdout(line) => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stdout, vec!["a\n", "b\n"]);

        let stderr: Vec<_> = events
            .iter()
            .filter_map(|ev| match ev {
                SystemEvent::Stderr(line) => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stderr, vec!["x\n"]);

        assert_eq!(events.last(), Some(&SystemEvent::Completed { status: 0 }));
    }

    #[tokio::test]
    async fn mapped_system_routes_through_the_wrapper() {
        let (mut dispatcher, mut rx) = dispatcher();
        let cmd = Command::system("echo ok", TestMsg::Out).map(|msg| TestMsg::Routed(Box::new(msg)));
        dispatcher.dispatch(cmd);
        dispatcher.join_pending().await;

        let msgs = drain_app(&mut rx).await;
        assert_eq!(
            msgs,
            vec![TestMsg::Routed(Box::new(TestMsg::Out(SystemOutput {
                stdout: "ok\n".into(),
                stderr: String::new(),
                status: 0,
            })))]
        );
    }

    #[tokio::test]
    async fn mapping_twice_composes_the_wrappers() {
        // Dispatching map(map(c, f), g) delivers the messages of c through
        // g ∘ f.
        let (mut dispatcher, mut rx) = dispatcher();
        let cmd = Command::system("echo hi", TestMsg::Out)
            .map(|msg| TestMsg::Routed(Box::new(msg)))
            .map(|msg| TestMsg::Routed(Box::new(msg)));
        dispatcher.dispatch(cmd);
        dispatcher.join_pending().await;

        let msgs = drain_app(&mut rx).await;
        assert_eq!(
            msgs,
            vec![TestMsg::Routed(Box::new(TestMsg::Routed(Box::new(
                TestMsg::Out(SystemOutput {
                    stdout: "hi\n".into(),
                    stderr: String::new(),
                    status: 0,
                })
            ))))]
        );
    }

    #[tokio::test]
    async fn custom_effect_puts_messages_and_reports_finished() {
        let (mut dispatcher, mut rx) = dispatcher();
        let task = CustomCommand::new(|outlet: Outlet<TestMsg>, _token| async move {
            outlet.put(TestMsg::Tick);
            outlet.put(TestMsg::Tick);
        });
        let handle = task.handle();
        dispatcher.dispatch(Command::custom(task));
        assert!(dispatcher.is_active(handle));
        dispatcher.join_pending().await;

        let mut ticks = 0;
        let mut finished = false;
        while let Ok(inbound) = rx.try_recv() {
            match inbound {
                Inbound::App(TestMsg::Tick) => ticks += 1,
                Inbound::Finished(h) => {
                    assert_eq!(h, handle);
                    finished = true;
                }
                _ => panic!("unexpected inbound"),
            }
        }
        assert_eq!(ticks, 2);
        assert!(finished);
    }

    #[tokio::test]
    async fn custom_panic_reports_a_diagnostic_notification() {
        let (mut dispatcher, mut rx) = dispatcher();
        let task = CustomCommand::new(|_outlet: Outlet<TestMsg>, _token| async move {
            panic!("boom");
        });
        let handle = task.handle();
        dispatcher.dispatch(Command::custom(task));
        dispatcher.join_pending().await;

        match rx.try_recv() {
            Ok(Inbound::Panicked {
                handle: reported,
                message,
            }) => {
                assert_eq!(reported, handle);
                assert_eq!(message, "boom");
            }
            _ => panic!("expected Panicked notification"),
        }
    }

    #[tokio::test]
    async fn cancel_of_unknown_handle_is_a_noop() {
        let (mut dispatcher, _rx) = dispatcher();
        let task = CustomCommand::<TestMsg>::new(|_, _| async {});
        let handle = task.handle();
        // Never dispatched.
        dispatcher.dispatch(Command::cancel(handle));
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn cooperative_cancellation_stops_the_effect_within_grace() {
        let (mut dispatcher, mut rx) = dispatcher();
        let task = CustomCommand::new(|outlet: Outlet<TestMsg>, token: CancelToken| async move {
            while !token.cancelled() {
                outlet.put(TestMsg::Tick);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            outlet.put(TestMsg::Stopped);
        })
        .grace(Duration::from_secs(5));
        let handle = task.handle();
        dispatcher.dispatch(Command::custom(task));

        // Wait for the first tick before cancelling.
        loop {
            match rx.recv().await {
                Some(Inbound::App(TestMsg::Tick)) => break,
                Some(_) => continue,
                None => panic!("inbox closed"),
            }
        }

        dispatcher.dispatch(Command::cancel(handle));
        assert!(!dispatcher.is_active(handle));
        dispatcher.join_pending().await;

        // The effect observed the token and stopped on its own.
        let msgs = drain_app(&mut rx).await;
        assert!(msgs.contains(&TestMsg::Stopped));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_noop() {
        let (mut dispatcher, mut rx) = dispatcher();
        let task = CustomCommand::new(|_outlet: Outlet<TestMsg>, _token| async {});
        let handle = task.handle();
        dispatcher.dispatch(Command::custom(task));
        dispatcher.join_pending().await;

        // Process the Finished notification the way the loop would.
        while let Ok(inbound) = rx.try_recv() {
            if let Inbound::Finished(h) = inbound {
                dispatcher.remove(h);
            }
        }
        assert_eq!(dispatcher.active_count(), 0);

        dispatcher.dispatch(Command::cancel(handle));
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_effect_is_force_terminated_after_grace() {
        let (mut dispatcher, _rx) = dispatcher();
        let task = CustomCommand::new(|_outlet: Outlet<TestMsg>, _token| async {
            // Ignores its token entirely.
            std::future::pending::<()>().await;
        })
        .grace(Duration::from_millis(50));
        let handle = task.handle();
        dispatcher.dispatch(Command::custom(task));

        dispatcher.dispatch(Command::cancel(handle));
        assert!(!dispatcher.is_active(handle));
        // Advancing past the grace period lets the waiter abort the effect.
        tokio::time::sleep(Duration::from_millis(60)).await;
        dispatcher.join_pending().await;
        assert!(!dispatcher.pending());
    }

    #[tokio::test]
    async fn shutdown_clears_the_table() {
        let (mut dispatcher, _rx) = dispatcher();
        let cooperative =
            CustomCommand::new(|_outlet: Outlet<TestMsg>, token: CancelToken| async move {
                while !token.cancelled() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            });
        let stubborn = CustomCommand::new(|_outlet: Outlet<TestMsg>, _token| async {
            std::future::pending::<()>().await;
        });
        dispatcher.dispatch(Command::custom(cooperative));
        dispatcher.dispatch(Command::custom(stubborn));
        assert_eq!(dispatcher.active_count(), 2);

        dispatcher.shutdown().await;
        assert_eq!(dispatcher.active_count(), 0);
        assert!(!dispatcher.pending());
    }

    #[tokio::test]
    async fn exit_inside_a_batch_is_reported() {
        let (mut dispatcher, _rx) = dispatcher();
        let cmd = Command::batch(vec![Command::message(TestMsg::Tick), Command::exit()]);
        assert!(dispatcher.dispatch(cmd));
    }
}
