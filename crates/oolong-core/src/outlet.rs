use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dispatch::Inbound;

/// The sending capability a [`custom`](crate::Command::custom) effect uses to
/// push messages into the runtime's inbox.
///
/// Messages put through a single outlet arrive at the update function in the
/// order they were put. Outlets are cheap to clone and may be moved freely
/// between tasks.
pub struct Outlet<Msg> {
    send: Arc<dyn Fn(Msg) + Send + Sync>,
}

impl<Msg: Send + 'static> Outlet<Msg> {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound<Msg>>) -> Self {
        Self {
            send: Arc::new(move |msg| {
                // The loop may already have shut down; a dropped message is
                // indistinguishable from one that arrived after exit.
                let _ = tx.send(Inbound::App(msg));
            }),
        }
    }

    /// Enqueue a message for the update function. Never blocks.
    pub fn put(&self, msg: Msg) {
        (self.send)(msg);
    }

    /// Build an outlet for an inner message type that converts each message
    /// through `f` before forwarding.
    ///
    /// This is how [`Command::map`](crate::Command::map) reaches inside a
    /// custom effect: the effect keeps writing its own message type while the
    /// conversion happens at the producing site, preserving order.
    pub fn map<Inner: Send + 'static>(
        &self,
        f: impl Fn(Inner) -> Msg + Send + Sync + 'static,
    ) -> Outlet<Inner> {
        let send = self.send.clone();
        Outlet {
            send: Arc::new(move |msg| send(f(msg))),
        }
    }
}

impl<Msg> Clone for Outlet<Msg> {
    fn clone(&self) -> Self {
        Self {
            send: self.send.clone(),
        }
    }
}
