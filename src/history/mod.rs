//! Local scan history ("Historial local").
//!
//! SQLite on a dedicated worker thread; async callers hand it closures and
//! await the reply on a oneshot channel. The scanning core never writes here
//! itself, [`HistoryRecorder`] subscribes to a session instead.

#[cfg(feature = "app")]
pub mod commands;

mod entries;
mod migrations;
pub mod models;
pub mod recorder;

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use tokio::sync::oneshot;

use migrations::run_migrations;

pub use models::HistoryEntry;
pub use recorder::HistoryRecorder;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

type HistoryTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum HistoryCommand {
    Execute(HistoryTask),
    Shutdown,
}

struct HistoryInner {
    sender: mpsc::Sender<HistoryCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for HistoryInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(HistoryCommand::Shutdown) {
                log_error!("failed to send shutdown to history thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                log_error!("failed to join history thread: {join_err:?}");
            }
        }
    }
}

/// Where the history database lives.
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Clone)]
pub struct ScanHistory {
    inner: Arc<HistoryInner>,
    path: Option<Arc<PathBuf>>,
}

impl ScanHistory {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }
        Self::spawn(Location::File(db_path))
    }

    /// Throwaway store, for tests and the CLI.
    pub fn in_memory() -> Result<Self> {
        Self::spawn(Location::Memory)
    }

    fn spawn(location: Location) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<HistoryCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let location_for_thread = location.clone();

        let worker = thread::Builder::new()
            .name("masbarato-history".into())
            .spawn(move || {
                let opened = match &location_for_thread {
                    Location::File(path) => Connection::open(path),
                    Location::Memory => Connection::open_in_memory(),
                };
                let mut conn = match opened {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open history database")));
                        return;
                    }
                };

                if let Location::File(_) = location_for_thread {
                    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                        log_error!("failed to enable WAL mode: {err}");
                    }
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run history migrations");
                if ready_tx.send(init_result).is_err() {
                    log_error!("history initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        HistoryCommand::Execute(task) => task(&mut conn),
                        HistoryCommand::Shutdown => break,
                    }
                }

                log_info!("history thread shutting down");
            })
            .context("failed to spawn history worker thread")?;

        ready_rx
            .recv()
            .context("history worker exited before signaling readiness")??;

        let path = match location {
            Location::File(path) => {
                log_info!("scan history at {}", path.display());
                Some(Arc::new(path))
            }
            Location::Memory => None,
        };

        Ok(Self {
            inner: Arc::new(HistoryInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = HistoryCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                log_error!("history caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to history thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("history thread terminated unexpectedly"))?
    }

    /// Queue a task without waiting for it. Failures are logged on the worker.
    fn submit<F>(&self, what: &'static str, task: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
    {
        let command = HistoryCommand::Execute(Box::new(move |conn| {
            if let Err(err) = task(conn) {
                log_error!("history {what} failed: {err:#}");
            }
        }));
        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to history thread: {err}"))
    }
}
