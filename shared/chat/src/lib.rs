//! Chat thread models shared across ShopMe services and clients.

pub mod identity;
pub mod thread;

pub use identity::{derive_thread_id, ThreadId, THREAD_ID_SEPARATOR};
pub use thread::{ThreadPatch, ThreadRecord};

use serde::{Deserialize, Serialize};

/// Snapshot of a participant's public profile, copied into thread metadata
/// whenever that participant touches the thread. Not a live reference: later
/// profile edits only show up the next time the participant opens the thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl ParticipantProfile {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

/// A single chat message as persisted by the thread store.
///
/// Immutable once created. `created_at_ms` is assigned by the store's server
/// clock at append time, never by the sending client, so ordering agrees
/// across devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: ThreadId,
    pub sender_id: String,
    pub text: String,
    pub created_at_ms: i64,
}

/// Chat-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid participant: {0}")]
    InvalidParticipant(String),
    #[error("participant identity is missing")]
    MissingParticipant,
    #[error("message text is empty")]
    EmptyMessage,
    #[error("chat session is not ready")]
    NotReady,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("notification delivery failed: {0}")]
    NotificationDeliveryFailed(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
