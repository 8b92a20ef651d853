//! Canonical identity for two-party chat threads.

use crate::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the two participant ids inside a thread id. Participant
/// ids handed out by the auth backend never contain it.
pub const THREAD_ID_SEPARATOR: char = '_';

/// Stable identifier for a two-party conversation, independent of which side
/// initiated it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ThreadId> for String {
    fn from(id: ThreadId) -> Self {
        id.0
    }
}

/// Derive the canonical thread id for a pair of participants.
///
/// The lexicographically smaller id always comes first, so
/// `derive_thread_id(a, b)` and `derive_thread_id(b, a)` agree for every
/// pair. Empty ids and self-chat are rejected.
pub fn derive_thread_id(id_a: &str, id_b: &str) -> Result<ThreadId> {
    if id_a.is_empty() || id_b.is_empty() {
        return Err(ChatError::InvalidParticipant(
            "participant id is empty".to_string(),
        ));
    }
    if id_a == id_b {
        return Err(ChatError::InvalidParticipant(format!(
            "self-chat is not supported ({id_a})"
        )));
    }

    let (first, second) = if id_a < id_b {
        (id_a, id_b)
    } else {
        (id_b, id_a)
    };
    Ok(ThreadId(format!("{first}{THREAD_ID_SEPARATOR}{second}")))
}
