//! Document store backing threads, messages, users, and product listings.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use async_trait::async_trait;
use shopme_chat::{MessageRecord, ThreadId, ThreadPatch, ThreadRecord};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("stored record could not be decoded: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("subscription registry poisoned")]
    SubscriptionPoisoned,
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("listing must include at least one image")]
    InvalidListing,
}

/// Realtime feed of message updates for one thread.
///
/// Every update carries the full ordered message list, not a delta, so a
/// skipped or replayed update never corrupts the receiver's view.
pub struct MessageFeed {
    rx: broadcast::Receiver<Vec<MessageRecord>>,
}

impl MessageFeed {
    /// Next snapshot, or `None` once the store side is gone.
    pub async fn next(&mut self) -> Option<Vec<MessageRecord>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // Lagging only drops stale snapshots; a newer full one follows.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Persistence contract for chat threads and their message sub-collections.
///
/// Timestamps come from the store side (`server_time_ms`), never from the
/// caller's clock, so message ordering agrees across devices.
#[async_trait]
pub trait ChatThreadStore: Send + Sync {
    async fn get_thread(&self, id: &ThreadId) -> Result<Option<ThreadRecord>>;

    /// Write thread metadata. With `merge` the patch is combined with the
    /// stored record (union/overwrite-by-key); without it the patch becomes
    /// the whole record.
    async fn set_thread(&self, id: &ThreadId, patch: ThreadPatch, merge: bool) -> Result<()>;

    /// Append a message, assigning its id and server timestamp.
    async fn append_message(
        &self,
        id: &ThreadId,
        sender_id: &str,
        text: &str,
    ) -> Result<MessageRecord>;

    /// All messages of a thread, ascending by `created_at_ms`.
    async fn list_messages(&self, id: &ThreadId) -> Result<Vec<MessageRecord>>;

    async fn subscribe_messages(&self, id: &ThreadId) -> Result<MessageFeed>;

    /// Threads whose participant set contains `uid`.
    async fn threads_for(&self, uid: &str) -> Result<Vec<ThreadRecord>>;

    /// Remove a thread and everything under it: messages first, then the
    /// thread record itself.
    async fn delete_thread(&self, id: &ThreadId) -> Result<()>;

    fn server_time_ms(&self) -> i64;
}

/// Sled-backed document store.
///
/// One tree per collection; values are bincode-encoded records. Message keys
/// sort by assigned timestamp so a prefix scan yields ascending order.
pub struct SledStore {
    db: sled::Db,
    clock: AtomicI64,
    watchers: Mutex<HashMap<String, broadcast::Sender<Vec<MessageRecord>>>>,
}

impl SledStore {
    const THREADS_TREE: &'static str = "threads";
    const MESSAGES_TREE: &'static str = "messages";
    const USERS_TREE: &'static str = "users";
    const PRODUCTS_TREE: &'static str = "products";

    const FEED_CAPACITY: usize = 32;

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create storage directory {:?}", path))?;
        let db = sled::open(path)
            .with_context(|| format!("failed to open sled database at {:?}", path))?;
        Ok(Self::with_db(db))
    }

    /// Throwaway in-memory database for tests.
    pub fn temporary() -> anyhow::Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("failed to open temporary sled database")?;
        Ok(Self::with_db(db))
    }

    fn with_db(db: sled::Db) -> Self {
        Self {
            db,
            clock: AtomicI64::new(0),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    fn threads_tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::THREADS_TREE)
    }

    fn messages_tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::MESSAGES_TREE)
    }

    pub(crate) fn users_tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::USERS_TREE)
    }

    pub(crate) fn products_tree(&self) -> sled::Result<sled::Tree> {
        self.db.open_tree(Self::PRODUCTS_TREE)
    }

    fn message_prefix(id: &ThreadId) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(id.as_str().len() + 1);
        prefix.extend_from_slice(id.as_str().as_bytes());
        prefix.push(0);
        prefix
    }

    fn message_key(id: &ThreadId, created_at_ms: i64, message_id: &str) -> Vec<u8> {
        let mut key = Self::message_prefix(id);
        key.extend_from_slice(&(created_at_ms as u64).to_be_bytes());
        key.extend_from_slice(message_id.as_bytes());
        key
    }

    fn watcher(&self, id: &ThreadId) -> Result<broadcast::Sender<Vec<MessageRecord>>> {
        let mut watchers = self
            .watchers
            .lock()
            .map_err(|_| StoreError::SubscriptionPoisoned)?;
        Ok(watchers
            .entry(id.as_str().to_string())
            .or_insert_with(|| broadcast::channel(Self::FEED_CAPACITY).0)
            .clone())
    }

    fn load_messages(&self, id: &ThreadId) -> Result<Vec<MessageRecord>> {
        let tree = self.messages_tree()?;
        let mut messages = Vec::new();
        for entry in tree.scan_prefix(Self::message_prefix(id)) {
            let (_key, value) = entry?;
            messages.push(bincode::deserialize(&value)?);
        }
        Ok(messages)
    }
}

#[async_trait]
impl ChatThreadStore for SledStore {
    async fn get_thread(&self, id: &ThreadId) -> Result<Option<ThreadRecord>> {
        let tree = self.threads_tree()?;
        match tree.get(id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    async fn set_thread(&self, id: &ThreadId, patch: ThreadPatch, merge: bool) -> Result<()> {
        let tree = self.threads_tree()?;
        let mut record = if merge {
            match tree.get(id.as_str().as_bytes())? {
                Some(value) => bincode::deserialize(&value)?,
                None => ThreadRecord::new(id.clone()),
            }
        } else {
            ThreadRecord::new(id.clone())
        };
        record.apply(&patch);

        tree.insert(id.as_str().as_bytes(), bincode::serialize(&record)?)?;
        tree.flush()?;
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ThreadId,
        sender_id: &str,
        text: &str,
    ) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            thread_id: id.clone(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            created_at_ms: self.server_time_ms(),
        };

        let tree = self.messages_tree()?;
        let key = Self::message_key(id, record.created_at_ms, &record.id);
        tree.insert(key, bincode::serialize(&record)?)?;
        tree.flush()?;

        let snapshot = self.load_messages(id)?;
        let _ = self.watcher(id)?.send(snapshot);

        Ok(record)
    }

    async fn list_messages(&self, id: &ThreadId) -> Result<Vec<MessageRecord>> {
        self.load_messages(id)
    }

    async fn subscribe_messages(&self, id: &ThreadId) -> Result<MessageFeed> {
        Ok(MessageFeed {
            rx: self.watcher(id)?.subscribe(),
        })
    }

    async fn threads_for(&self, uid: &str) -> Result<Vec<ThreadRecord>> {
        let tree = self.threads_tree()?;
        let mut threads = Vec::new();
        for entry in tree.iter() {
            let (_key, value) = entry?;
            let record: ThreadRecord = bincode::deserialize(&value)?;
            if record.participant_ids.contains(uid) {
                threads.push(record);
            }
        }
        Ok(threads)
    }

    async fn delete_thread(&self, id: &ThreadId) -> Result<()> {
        let messages = self.messages_tree()?;
        let keys = messages
            .scan_prefix(Self::message_prefix(id))
            .keys()
            .collect::<sled::Result<Vec<_>>>()?;
        for key in keys {
            messages.remove(key)?;
        }
        messages.flush()?;

        let threads = self.threads_tree()?;
        threads.remove(id.as_str().as_bytes())?;
        threads.flush()?;
        Ok(())
    }

    fn server_time_ms(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        match self
            .clock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(wall.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => wall.max(prev + 1),
        }
    }
}
