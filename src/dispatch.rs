//! Background store writes
//!
//! Tracking calls never wait on the store. They enqueue a [`StoreCall`] and
//! return; a background task issues each call as soon as it arrives, bounds
//! it by a timeout, and logs failures without retrying. Calls run
//! concurrently, so a slow call never holds back the ones behind it and
//! completion order is not guaranteed.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{SessionStore, StoreCall};

enum Command {
    Call(StoreCall),
    Barrier(oneshot::Sender<()>),
}

/// Fire-and-forget queue in front of a [`SessionStore`]
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Call(call) => write!(f, "Call({})", call.op_name()),
            Command::Barrier(_) => write!(f, "Barrier"),
        }
    }
}

impl Dispatcher {
    /// Start the intake task on `handle`.
    ///
    /// The task exits once every clone of the dispatcher is dropped and the
    /// calls already issued have finished.
    pub fn spawn(handle: &Handle, store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _task = handle.spawn(run(rx, store, timeout));
        Self { tx }
    }

    /// Issue `call` without waiting for it
    pub fn send(&self, call: StoreCall) {
        let command = Command::Call(call);
        if let Err(mpsc::error::SendError(Command::Call(call))) = self.tx.send(command) {
            warn!(
                op = call.op_name(),
                session_id = call.session_id(),
                "store writer stopped, dropping call"
            );
        }
    }

    /// Wait until every call issued before this one has completed, failed or
    /// timed out
    pub async fn drained(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Call(call)) => {
                    let store = Arc::clone(&store);
                    in_flight.spawn(async move { execute(store.as_ref(), &call, timeout).await });
                }
                Some(Command::Barrier(done)) => {
                    // Only calls issued before the barrier are awaited; intake
                    // keeps going meanwhile.
                    let pending = std::mem::take(&mut in_flight);
                    tokio::spawn(async move {
                        join_all(pending).await;
                        let _ = done.send(());
                    });
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    join_all(in_flight).await;
    debug!("store writer finished");
}

async fn join_all(mut tasks: JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

async fn execute(store: &dyn SessionStore, call: &StoreCall, timeout: Duration) {
    let op = call.op_name();
    let session_id = call.session_id();
    match tokio::time::timeout(timeout, call.apply(store)).await {
        Ok(Ok(())) => debug!(op, session_id, "store call completed"),
        Ok(Err(error)) => warn!(op, session_id, %error, "store call failed"),
        Err(_) => {
            let error = StoreError::Timeout(timeout);
            warn!(op, session_id, %error, "store call failed");
        }
    }
}
