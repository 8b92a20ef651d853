//! End-to-end scenarios for the chat core: thread resolution, messaging,
//! realtime ordering, and notification isolation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shopme_chat::{MessageRecord, ParticipantProfile, ThreadId, ThreadPatch, ThreadRecord};
use shopme_node::directory::{ProfileDirectory, UserProfile};
use shopme_node::inbox;
use shopme_node::notify::{DeliveryOutcome, NotificationDispatch};
use shopme_node::session::ChatSession;
use shopme_node::storage::{ChatThreadStore, MessageFeed, Result as StoreResult, SledStore};
use tokio::time::timeout;

struct NullDispatch;

#[async_trait]
impl NotificationDispatch for NullDispatch {
    async fn send(
        &self,
        _device_token: &str,
        _title: &str,
        _body: &str,
        _data: &BTreeMap<String, String>,
    ) -> DeliveryOutcome {
        DeliveryOutcome::Delivered
    }
}

struct FailingDispatch;

#[async_trait]
impl NotificationDispatch for FailingDispatch {
    async fn send(
        &self,
        _device_token: &str,
        _title: &str,
        _body: &str,
        _data: &BTreeMap<String, String>,
    ) -> DeliveryOutcome {
        DeliveryOutcome::Failed("gateway unavailable".to_string())
    }
}

/// Store wrapper counting every write, for asserting validation happens
/// before any persistence call.
struct CountingStore {
    inner: Arc<SledStore>,
    thread_writes: AtomicUsize,
    appends: AtomicUsize,
}

impl CountingStore {
    fn new(inner: Arc<SledStore>) -> Self {
        Self {
            inner,
            thread_writes: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatThreadStore for CountingStore {
    async fn get_thread(&self, id: &ThreadId) -> StoreResult<Option<ThreadRecord>> {
        self.inner.get_thread(id).await
    }

    async fn set_thread(&self, id: &ThreadId, patch: ThreadPatch, merge: bool) -> StoreResult<()> {
        self.thread_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_thread(id, patch, merge).await
    }

    async fn append_message(
        &self,
        id: &ThreadId,
        sender_id: &str,
        text: &str,
    ) -> StoreResult<MessageRecord> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append_message(id, sender_id, text).await
    }

    async fn list_messages(&self, id: &ThreadId) -> StoreResult<Vec<MessageRecord>> {
        self.inner.list_messages(id).await
    }

    async fn subscribe_messages(&self, id: &ThreadId) -> StoreResult<MessageFeed> {
        self.inner.subscribe_messages(id).await
    }

    async fn threads_for(&self, uid: &str) -> StoreResult<Vec<ThreadRecord>> {
        self.inner.threads_for(uid).await
    }

    async fn delete_thread(&self, id: &ThreadId) -> StoreResult<()> {
        self.inner.delete_thread(id).await
    }

    fn server_time_ms(&self) -> i64 {
        self.inner.server_time_ms()
    }
}

fn alice() -> ParticipantProfile {
    ParticipantProfile::new("alice", "Alice", "https://cdn/alice.jpg")
}

fn bob() -> ParticipantProfile {
    ParticipantProfile::new("bob", "Bob", "https://cdn/bob.jpg")
}

async fn wait_for_messages(session: &ChatSession, count: usize) -> Vec<MessageRecord> {
    let mut updates = session.updates();
    timeout(Duration::from_secs(5), async {
        loop {
            let messages = session.messages().await;
            if messages.len() >= count {
                return messages;
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn alice_messages_bob_end_to_end() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let session = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));

    let thread_id = session.open(&alice(), &bob()).await.unwrap();
    assert_eq!(thread_id.as_str(), "alice_bob");

    let thread = store.get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(
        thread
            .participant_ids
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>(),
        vec!["alice", "bob"]
    );

    let record = session.send("hi").await.unwrap();
    assert_eq!(record.sender_id, "alice");
    assert_eq!(record.text, "hi");

    let stored = store.list_messages(&thread_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], record);

    let thread = store.get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.last_message, "hi");
    assert_eq!(thread.last_message_time_ms, record.created_at_ms);
}

#[tokio::test]
async fn reopening_does_not_drift_thread_metadata() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let session = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));

    let thread_id = session.open(&alice(), &bob()).await.unwrap();
    let after_first = store.get_thread(&thread_id).await.unwrap().unwrap();

    session.close().await;
    session.open(&alice(), &bob()).await.unwrap();
    let after_second = store.get_thread(&thread_id).await.unwrap().unwrap();

    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn reopening_preserves_historical_participants() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let thread_id = shopme_chat::derive_thread_id("alice", "bob").unwrap();

    // a third snapshot already stored, as if the thread had been extended
    let carol = ParticipantProfile::new("carol", "Carol", "");
    let mut extension = ThreadPatch::default();
    extension.participant_ids.insert("carol".to_string());
    extension.participants.insert("carol".to_string(), carol.clone());
    store
        .set_thread(
            &thread_id,
            ThreadPatch::for_pair(&alice(), &bob()),
            false,
        )
        .await
        .unwrap();
    store.set_thread(&thread_id, extension, true).await.unwrap();

    let session = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));
    session.open(&alice(), &bob()).await.unwrap();

    let thread = store.get_thread(&thread_id).await.unwrap().unwrap();
    assert!(thread.participant_ids.contains("carol"));
    assert_eq!(thread.participants.get("carol"), Some(&carol));
    assert_eq!(thread.participant_ids.len(), 3);
}

#[tokio::test]
async fn both_devices_opening_concurrently_converge() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let on_alices_phone = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));
    let on_bobs_phone = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));

    let alice_user = alice();
    let bob_user = bob();
    let (from_alice, from_bob) = tokio::join!(
        on_alices_phone.open(&alice_user, &bob_user),
        on_bobs_phone.open(&bob_user, &alice_user),
    );
    let thread_id = from_alice.unwrap();
    assert_eq!(thread_id, from_bob.unwrap());

    let thread = store.get_thread(&thread_id).await.unwrap().unwrap();
    assert_eq!(thread.participant_ids.len(), 2);
    assert_eq!(thread.participants.len(), 2);
}

#[tokio::test]
async fn messages_render_in_server_timestamp_order() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let session = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));
    let thread_id = session.open(&alice(), &bob()).await.unwrap();

    // counterpart writes land through the store, not this session
    store.append_message(&thread_id, "bob", "first").await.unwrap();
    store.append_message(&thread_id, "bob", "second").await.unwrap();
    session.send("third").await.unwrap();

    let messages = wait_for_messages(&session, 3).await;
    assert_eq!(
        messages.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
        vec!["first", "second", "third"]
    );
    assert!(messages
        .windows(2)
        .all(|pair| pair[0].created_at_ms < pair[1].created_at_ms));
}

#[tokio::test]
async fn invalid_send_makes_no_store_calls() {
    let sled = Arc::new(SledStore::temporary().unwrap());
    let counting = Arc::new(CountingStore::new(sled.clone()));
    let session = ChatSession::new(counting.clone(), sled.clone(), Arc::new(NullDispatch));

    session.open(&alice(), &bob()).await.unwrap();
    assert_eq!(counting.thread_writes.load(Ordering::SeqCst), 1);

    assert!(session.send("").await.is_err());
    assert!(session.send("   ").await.is_err());

    assert_eq!(counting.appends.load(Ordering::SeqCst), 0);
    assert_eq!(counting.thread_writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn push_failure_leaves_the_send_result_intact() {
    let sled = Arc::new(SledStore::temporary().unwrap());
    sled.upsert_profile(UserProfile::new("bob", "Bob", "bob@example.com", "", 1))
        .await
        .unwrap();
    sled.register_device_token("bob", "tok-bob").await.unwrap();

    let counting = Arc::new(CountingStore::new(sled.clone()));
    let session = ChatSession::new(counting.clone(), sled.clone(), Arc::new(FailingDispatch));
    let thread_id = session.open(&alice(), &bob()).await.unwrap();

    let record = session.send("hi").await.unwrap();
    assert_eq!(record.text, "hi");
    assert_eq!(counting.appends.load(Ordering::SeqCst), 1);
    assert_eq!(sled.list_messages(&thread_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_a_conversation_cascades() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let session = ChatSession::new(store.clone(), store.clone(), Arc::new(NullDispatch));
    let thread_id = session.open(&alice(), &bob()).await.unwrap();
    session.send("hello").await.unwrap();
    session.close().await;

    assert_eq!(inbox::conversations(store.as_ref(), "alice").await.unwrap().len(), 1);

    store.delete_thread(&thread_id).await.unwrap();

    assert!(store.list_messages(&thread_id).await.unwrap().is_empty());
    assert!(store.get_thread(&thread_id).await.unwrap().is_none());
    assert!(inbox::conversations(store.as_ref(), "alice")
        .await
        .unwrap()
        .is_empty());
}
