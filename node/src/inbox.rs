//! Conversation overview for one user.

use shopme_chat::{ParticipantProfile, ThreadRecord};

use crate::storage::{ChatThreadStore, Result};

/// One row of the conversation list.
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub thread: ThreadRecord,
    /// Snapshot of the participant that is not the viewing user.
    pub counterpart: Option<ParticipantProfile>,
}

/// Threads the user participates in, newest activity first. Threads that
/// never carried a message stay hidden.
pub async fn conversations(store: &dyn ChatThreadStore, uid: &str) -> Result<Vec<ThreadSummary>> {
    let mut threads: Vec<ThreadRecord> = store
        .threads_for(uid)
        .await?
        .into_iter()
        .filter(|thread| !thread.last_message.trim().is_empty())
        .collect();
    threads.sort_by(|a, b| b.last_message_time_ms.cmp(&a.last_message_time_ms));

    Ok(threads
        .into_iter()
        .map(|thread| {
            let counterpart = thread
                .other_participant(uid)
                .and_then(|id| thread.participants.get(id))
                .cloned();
            ThreadSummary {
                thread,
                counterpart,
            }
        })
        .collect())
}
