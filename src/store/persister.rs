use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::persistence::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

enum PersistCommand {
    Write { key: &'static str, value: String },
    Remove(&'static str),
    Flush(oneshot::Sender<()>),
}

/// Ordered, fire-and-forget writer in front of a [`KeyValueStore`]. Values
/// are serialized by the caller's thread, so each write carries the state as
/// it was when the mutation happened, and the last queued write wins.
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl Persister {
    /// Starts the writer task; needs a tokio runtime.
    pub fn spawn(kv: Arc<dyn KeyValueStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PersistCommand::Write { key, value } => {
                        if let Err(err) = kv.set(key, value).await {
                            log_error!("failed to persist '{key}': {err:#}");
                        }
                    }
                    PersistCommand::Remove(key) => {
                        if let Err(err) = kv.remove(key).await {
                            log_error!("failed to remove '{key}': {err:#}");
                        }
                    }
                    PersistCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    pub fn write<T>(&self, key: &'static str, value: &T)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(value) {
            Ok(value) => self.send(PersistCommand::Write { key, value }),
            Err(err) => log_error!("could not serialize '{key}' for storage: {err}"),
        }
    }

    pub fn remove(&self, key: &'static str) {
        self.send(PersistCommand::Remove(key));
    }

    /// Resolves once every command queued before this call has run.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(PersistCommand::Flush(ack_tx));
        let _ = ack_rx.await;
    }

    fn send(&self, command: PersistCommand) {
        if self.tx.send(command).is_err() {
            log_warn!("persistence writer has stopped; change kept in memory only");
        }
    }
}
