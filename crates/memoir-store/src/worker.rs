//! Dedicated SQLite worker thread.
//!
//! The connection lives on one thread for its whole life; callers send
//! closures over a channel and await the reply through a oneshot. Drop
//! of the last handle shuts the thread down cleanly.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};

use rusqlite::Connection;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::StoreError;
use crate::migrations::run_migrations;

type Task = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Command {
    Run(Task),
    Shutdown,
}

/// Where the database lives.
pub(crate) enum Location {
    Disk(PathBuf),
    Memory,
}

struct WorkerInner {
    sender: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let mut guard = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            if self.sender.send(Command::Shutdown).is_err() {
                error!("database worker already gone at shutdown");
            }
            if let Err(join_error) = handle.join() {
                error!("failed to join database worker: {join_error:?}");
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct SqliteWorker {
    inner: Arc<WorkerInner>,
}

impl SqliteWorker {
    /// Spawn the worker, open the database, apply migrations. Errors
    /// during startup surface here, not on first use.
    pub(crate) fn open(location: Location) -> Result<Self, StoreError> {
        if let Location::Disk(path) = &location {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_sender, ready_receiver) = mpsc::channel::<Result<(), StoreError>>();

        let handle = thread::Builder::new()
            .name("memoir-store-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&location) {
                    Ok(conn) => {
                        let _ = ready_sender.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_sender.send(Err(err));
                        return;
                    }
                };

                info!("database worker ready");
                while let Ok(command) = receiver.recv() {
                    match command {
                        Command::Run(task) => task(&mut conn),
                        Command::Shutdown => break,
                    }
                }
            })?;

        match ready_receiver.recv() {
            Ok(Ok(())) => Ok(Self {
                inner: Arc::new(WorkerInner {
                    sender,
                    handle: Mutex::new(Some(handle)),
                }),
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(StoreError::WorkerGone)
            }
        }
    }

    /// Run a closure on the worker thread and await its result.
    pub(crate) async fn call<R, F>(&self, task: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.inner
            .sender
            .send(Command::Run(Box::new(move |conn| {
                let _ = sender.send(task(conn));
            })))
            .map_err(|_| StoreError::WorkerGone)?;
        receiver.await.map_err(|_| StoreError::WorkerGone)?
    }
}

fn open_connection(location: &Location) -> Result<Connection, StoreError> {
    let mut conn = match location {
        Location::Disk(path) => Connection::open(path)?,
        Location::Memory => Connection::open_in_memory()?,
    };
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&mut conn)?;
    Ok(conn)
}
