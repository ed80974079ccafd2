use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod migrations;
pub mod repositories;

use migrations::run_migrations;

type DbJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbMessage {
    Run(DbJob),
    Stop,
}

struct Worker {
    sender: mpsc::Sender<DbMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(handle) = handle else {
            return;
        };
        if let Err(err) = self.sender.send(DbMessage::Stop) {
            error!("could not signal storage thread to stop: {err}");
        }
        if let Err(join_err) = handle.join() {
            error!("storage thread panicked: {join_err:?}");
        }
    }
}

/// SQLite-backed key/value mirror. All statements run on one dedicated
/// thread; callers talk to it through async jobs.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }

        let (job_tx, job_rx) = mpsc::channel::<DbMessage>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let thread = thread::Builder::new()
            .name("tabhome-storage".into())
            .spawn(move || {
                let mut conn = match Connection::open(&thread_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx
                            .send(Err(anyhow::Error::new(err).context("failed to open SQLite store")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }

                let init = run_migrations(&mut conn).context("failed to migrate storage schema");
                if ready_tx.send(init).is_err() {
                    return;
                }

                while let Ok(message) = job_rx.recv() {
                    match message {
                        DbMessage::Run(job) => job(&mut conn),
                        DbMessage::Stop => break,
                    }
                }

                info!("storage thread stopped");
            })
            .context("failed to spawn storage thread")?;

        ready_rx
            .recv()
            .context("storage thread exited before it was ready")??;

        info!("storage opened at {}", path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                sender: job_tx,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Run `job` on the storage thread and await its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let message = DbMessage::Run(Box::new(move |conn| {
            let _ = reply_tx.send(job(conn));
        }));

        self.worker
            .sender
            .send(message)
            .map_err(|err| anyhow!("storage thread is gone: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("storage thread dropped the job"))?
    }
}
