//! Single-writer key-value store reached over a channel.
//!
//! Workers never touch a backend directly: they send a [`StoreMsg`] and wait
//! on its reply slot. One actor owns the backend and applies messages in
//! receipt order.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key '{0}'")]
    InvalidKey(String),
    #[error("store io failure for key '{key}'")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store actor is not running")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
}

/// Data read back for `Read`; `None` for writes and missing keys.
pub type StoreResponse = Result<Option<Vec<u8>>, StoreError>;

#[derive(Debug)]
pub struct StoreMsg {
    pub operation: Operation,
    pub key: String,
    pub data: Vec<u8>,
    pub reply: oneshot::Sender<StoreResponse>,
}

impl StoreMsg {
    pub fn write(key: impl Into<String>, data: Vec<u8>) -> (Self, oneshot::Receiver<StoreResponse>) {
        let (reply, rx) = oneshot::channel();
        let msg = Self {
            operation: Operation::Write,
            key: key.into(),
            data,
            reply,
        };
        (msg, rx)
    }

    pub fn read(key: impl Into<String>) -> (Self, oneshot::Receiver<StoreResponse>) {
        let (reply, rx) = oneshot::channel();
        let msg = Self {
            operation: Operation::Read,
            key: key.into(),
            data: Vec::new(),
            reply,
        };
        (msg, rx)
    }
}

pub trait StoreBackend: Send + 'static {
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl StoreBackend for MemoryStore {
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }
}

/// One file per key, laid out under `root` following the key's `/` segments.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl StoreBackend for FileStore {
    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(io_err)?;

        // Readers see either the old record or the new one
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(data).map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreMsg>,
}

impl StoreHandle {
    /// Deliver `msg`; its reply slot is answered exactly once by the actor.
    pub async fn send(&self, msg: StoreMsg) -> Result<(), StoreError> {
        self.tx.send(msg).await.map_err(|_| StoreError::Closed)
    }

    pub async fn write(&self, key: impl Into<String>, data: Vec<u8>) -> Result<(), StoreError> {
        let (msg, rx) = StoreMsg::write(key, data);
        self.send(msg).await?;
        rx.await.map_err(|_| StoreError::Closed)?.map(|_| ())
    }

    pub async fn read(&self, key: impl Into<String>) -> Result<Option<Vec<u8>>, StoreError> {
        let (msg, rx) = StoreMsg::read(key);
        self.send(msg).await?;
        rx.await.map_err(|_| StoreError::Closed)?
    }
}

/// Start the actor owning `backend`.
///
/// The actor exits once every [`StoreHandle`] is dropped and the queue has
/// drained; awaiting the returned handle therefore waits for all accepted
/// writes to land.
pub fn spawn_store<B: StoreBackend>(mut backend: B) -> (StoreHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StoreMsg>(CHANNEL_CAPACITY);

    let task = tokio::task::spawn_blocking(move || {
        while let Some(msg) = rx.blocking_recv() {
            let response = match msg.operation {
                Operation::Write => backend.write(&msg.key, &msg.data).map(|_| None),
                Operation::Read => backend.read(&msg.key),
            };
            match &response {
                Ok(_) => tracing::trace!("store {:?} {}", msg.operation, msg.key),
                Err(e) => tracing::debug!("store {:?} {} failed: {}", msg.operation, msg.key, e),
            }
            // A requester that gave up waiting is not an error for the store
            let _ = msg.reply.send(response);
        }
        tracing::debug!("store actor drained");
    });

    (StoreHandle { tx }, task)
}
