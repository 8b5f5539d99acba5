//! Embedded SQLite backend serving every store port.
//!
//! All statements run on one dedicated worker thread that owns the
//! connection; async callers hand it closures over a channel and await the
//! reply. Writes announce themselves on a broadcast channel from inside the
//! worker, so feed subscribers see changes in commit order.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::AtomicU64,
        mpsc, Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

mod feed;
mod helpers;
mod migrations;
mod repositories;

use migrations::run_migrations;

use crate::store::{AuthSession, ChannelId, RawChange};

/// Change notifications buffered per feed subscriber before it is
/// considered lagging.
const CHANGE_BUFFER: usize = 1024;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<Option<PathBuf>>,
    changes: broadcast::Sender<RawChange>,
    session: Arc<Mutex<Option<AuthSession>>>,
    channels: Arc<Mutex<HashMap<ChannelId, CancellationToken>>>,
    next_channel_id: Arc<AtomicU64>,
}

impl Database {
    /// Open (or create) a database file.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        Self::spawn(Some(db_path))
    }

    /// A private database that lives as long as this handle and its clones.
    pub fn in_memory() -> Result<Self> {
        Self::spawn(None)
    }

    fn spawn(db_path: Option<PathBuf>) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("saree-tracker-db".into())
            .spawn(move || {
                let opened = match &path_for_thread {
                    Some(path) => Connection::open(path),
                    None => Connection::open_in_memory(),
                };
                let mut conn = match opened {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if path_for_thread.is_some() {
                    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                        error!("Failed to enable WAL mode: {err}");
                    }
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        match &db_path {
            Some(path) => info!("Database initialized at {}", path.display()),
            None => info!("In-memory database initialized"),
        }

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
            changes,
            session: Arc::new(Mutex::new(None)),
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_channel_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Location of the database file; `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        (*self.db_path).as_deref()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    fn session_guard(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn channels_guard(&self) -> MutexGuard<'_, HashMap<ChannelId, CancellationToken>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
