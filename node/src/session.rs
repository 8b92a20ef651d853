//! Lifecycle of one active two-party conversation view.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shopme_chat::{
    derive_thread_id, ChatError, MessageRecord, ParticipantProfile, ThreadId, ThreadPatch,
};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::directory::ProfileDirectory;
use crate::notify::{DeliveryOutcome, NotificationDispatch};
use crate::storage::{ChatThreadStore, StoreError};

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Resolving,
    Active,
    Failed,
    Closed,
}

/// State shared with the subscription watcher task.
struct SessionShared {
    closed: AtomicBool,
    messages: RwLock<Vec<MessageRecord>>,
    changed_tx: watch::Sender<u64>,
}

impl SessionShared {
    /// Replace the visible message list with a store snapshot. Updates that
    /// arrive after `close()` are dropped here, whatever task carried them.
    async fn deliver(&self, snapshot: Vec<MessageRecord>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        *self.messages.write().await = snapshot;
        self.changed_tx.send_modify(|generation| *generation += 1);
    }
}

struct SessionInner {
    phase: SessionPhase,
    thread_id: Option<ThreadId>,
    self_profile: Option<ParticipantProfile>,
    draft: Option<String>,
    watcher: Option<JoinHandle<()>>,
}

/// One active conversation between the local user and one other participant.
///
/// The self snapshot is passed into [`ChatSession::open`] explicitly; the
/// session never consults process-global state.
pub struct ChatSession {
    store: Arc<dyn ChatThreadStore>,
    directory: Arc<dyn ProfileDirectory>,
    dispatch: Arc<dyn NotificationDispatch>,
    shared: Arc<SessionShared>,
    changed_rx: watch::Receiver<u64>,
    inner: RwLock<SessionInner>,
}

impl ChatSession {
    pub fn new(
        store: Arc<dyn ChatThreadStore>,
        directory: Arc<dyn ProfileDirectory>,
        dispatch: Arc<dyn NotificationDispatch>,
    ) -> Self {
        let (changed_tx, changed_rx) = watch::channel(0);
        Self {
            store,
            directory,
            dispatch,
            shared: Arc::new(SessionShared {
                closed: AtomicBool::new(true),
                messages: RwLock::new(Vec::new()),
                changed_tx,
            }),
            changed_rx,
            inner: RwLock::new(SessionInner {
                phase: SessionPhase::Uninitialized,
                thread_id: None,
                self_profile: None,
                draft: None,
                watcher: None,
            }),
        }
    }

    /// Resolve (create or merge) the thread for this participant pair and
    /// start following its messages.
    ///
    /// Exactly one thread write happens per call: a full create when the
    /// thread is new, otherwise a merge that refreshes both participants'
    /// snapshots and leaves any other stored entries untouched.
    pub async fn open(
        &self,
        self_profile: &ParticipantProfile,
        other: &ParticipantProfile,
    ) -> Result<ThreadId> {
        if self_profile.id.is_empty() || other.id.is_empty() {
            return Err(ChatError::MissingParticipant);
        }
        let thread_id = derive_thread_id(&self_profile.id, &other.id)?;

        {
            let mut inner = self.inner.write().await;
            if let Some(watcher) = inner.watcher.take() {
                watcher.abort();
            }
            inner.phase = SessionPhase::Resolving;
            inner.thread_id = None;
        }

        let existing = match self.store.get_thread(&thread_id).await {
            Ok(existing) => existing,
            Err(err) => return Err(self.fail(err).await),
        };

        let mut patch = ThreadPatch::for_pair(self_profile, other);
        let merge = existing.is_some();
        if !merge {
            patch = patch.with_summary("", self.store.server_time_ms());
        }
        if let Err(err) = self.store.set_thread(&thread_id, patch, merge).await {
            return Err(self.fail(err).await);
        }

        let mut feed = match self.store.subscribe_messages(&thread_id).await {
            Ok(feed) => feed,
            Err(err) => return Err(self.fail(err).await),
        };
        let snapshot = match self.store.list_messages(&thread_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => return Err(self.fail(err).await),
        };

        self.shared.closed.store(false, Ordering::SeqCst);
        self.shared.deliver(snapshot).await;

        let shared = Arc::clone(&self.shared);
        let watcher = tokio::spawn(async move {
            while let Some(snapshot) = feed.next().await {
                shared.deliver(snapshot).await;
            }
        });

        let mut inner = self.inner.write().await;
        inner.phase = SessionPhase::Active;
        inner.thread_id = Some(thread_id.clone());
        inner.self_profile = Some(self_profile.clone());
        inner.watcher = Some(watcher);

        Ok(thread_id)
    }

    /// Append a message and update the thread's last-message summary.
    ///
    /// The summary write uses the timestamp of the already-appended record,
    /// so it can never point at a message that did not land. Push
    /// notification delivery runs detached and cannot affect the result.
    pub async fn send(&self, text: &str) -> Result<MessageRecord> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (thread_id, sender) = {
            let inner = self.inner.read().await;
            match (&inner.phase, &inner.thread_id, &inner.self_profile) {
                (SessionPhase::Active, Some(thread_id), Some(sender)) => {
                    (thread_id.clone(), sender.clone())
                }
                _ => return Err(ChatError::NotReady),
            }
        };

        let record = match self
            .store
            .append_message(&thread_id, &sender.id, trimmed)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                // keep the composed text recoverable
                self.inner.write().await.draft = Some(trimmed.to_string());
                return Err(ChatError::StoreUnavailable(err.to_string()));
            }
        };
        self.inner.write().await.draft = None;

        self.store
            .set_thread(
                &thread_id,
                ThreadPatch::summary(record.text.clone(), record.created_at_ms),
                true,
            )
            .await
            .map_err(|err| ChatError::StoreUnavailable(err.to_string()))?;

        let store = Arc::clone(&self.store);
        let directory = Arc::clone(&self.directory);
        let dispatch = Arc::clone(&self.dispatch);
        let notify_thread = thread_id.clone();
        let notify_sender = sender.clone();
        let body = record.text.clone();
        tokio::spawn(async move {
            if let Err(err) = notify_receiver(
                store,
                directory,
                dispatch,
                notify_thread,
                notify_sender,
                body,
            )
            .await
            {
                warn!(%err, "push notification dropped");
            }
        });

        Ok(record)
    }

    /// Stop following the thread. Idempotent; safe before `open` and after
    /// previous `close` calls. No update becomes visible once this returns.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let mut inner = self.inner.write().await;
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
        inner.phase = SessionPhase::Closed;
    }

    /// Current ordered message list, exactly as the store last published it.
    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.shared.messages.read().await.clone()
    }

    /// Change signal for UI collaborators; bumped once per applied snapshot.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.changed_rx.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.read().await.phase
    }

    pub async fn thread_id(&self) -> Option<ThreadId> {
        self.inner.read().await.thread_id.clone()
    }

    /// Text of the last failed send, if any.
    pub async fn draft(&self) -> Option<String> {
        self.inner.read().await.draft.clone()
    }

    async fn fail(&self, err: StoreError) -> ChatError {
        self.inner.write().await.phase = SessionPhase::Failed;
        ChatError::StoreUnavailable(err.to_string())
    }
}

/// Resolve the counterpart's device token and push a notification to it.
/// Runs on the best-effort path: every error stays inside the spawned task.
async fn notify_receiver(
    store: Arc<dyn ChatThreadStore>,
    directory: Arc<dyn ProfileDirectory>,
    dispatch: Arc<dyn NotificationDispatch>,
    thread_id: ThreadId,
    sender: ParticipantProfile,
    body: String,
) -> Result<()> {
    let thread = store
        .get_thread(&thread_id)
        .await
        .map_err(store_unavailable)?
        .ok_or_else(|| ChatError::StoreUnavailable(format!("thread {thread_id} is gone")))?;

    let Some(receiver_id) = thread.other_participant(&sender.id) else {
        return Err(ChatError::MissingParticipant);
    };

    let token = match directory
        .device_token(receiver_id)
        .await
        .map_err(store_unavailable)?
    {
        Some(token) => token,
        None => {
            debug!(receiver = receiver_id, "no device token registered, skipping push");
            return Ok(());
        }
    };

    let mut data = BTreeMap::new();
    data.insert("thread_id".to_string(), thread_id.to_string());

    match dispatch
        .send(&token, &sender.display_name, &body, &data)
        .await
    {
        DeliveryOutcome::Delivered => Ok(()),
        DeliveryOutcome::Failed(reason) => Err(ChatError::NotificationDeliveryFailed(reason)),
    }
}

fn store_unavailable(err: StoreError) -> ChatError {
    ChatError::StoreUnavailable(err.to_string())
}
