//! Thread metadata and its merge semantics.

use crate::{ParticipantProfile, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persistent record of a two-party conversation.
///
/// Shared mutable state: both participants' devices write to the same record
/// when they open the conversation, so every update goes through
/// [`ThreadRecord::apply`] rather than a destructive replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: ThreadId,
    pub participant_ids: BTreeSet<String>,
    pub participants: BTreeMap<String, ParticipantProfile>,
    pub last_message: String,
    pub last_message_time_ms: i64,
}

/// Partial update applied to a thread record.
///
/// Application is commutative and idempotent: participant ids are unioned,
/// participant snapshots overwrite per key, and the last-message summary
/// fields overwrite only when present. Entries for participants the patch
/// does not name are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPatch {
    pub participant_ids: BTreeSet<String>,
    pub participants: BTreeMap<String, ParticipantProfile>,
    pub last_message: Option<String>,
    pub last_message_time_ms: Option<i64>,
}

impl ThreadPatch {
    /// Patch refreshing both members of a participant pair.
    pub fn for_pair(a: &ParticipantProfile, b: &ParticipantProfile) -> Self {
        let mut patch = Self::default();
        patch.participant_ids.insert(a.id.clone());
        patch.participant_ids.insert(b.id.clone());
        patch.participants.insert(a.id.clone(), a.clone());
        patch.participants.insert(b.id.clone(), b.clone());
        patch
    }

    /// Patch updating only the last-message summary.
    pub fn summary(text: impl Into<String>, time_ms: i64) -> Self {
        Self {
            last_message: Some(text.into()),
            last_message_time_ms: Some(time_ms),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, text: impl Into<String>, time_ms: i64) -> Self {
        self.last_message = Some(text.into());
        self.last_message_time_ms = Some(time_ms);
        self
    }
}

impl ThreadRecord {
    /// Empty record for a freshly created thread.
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            participant_ids: BTreeSet::new(),
            participants: BTreeMap::new(),
            last_message: String::new(),
            last_message_time_ms: 0,
        }
    }

    /// Merge a patch into this record.
    pub fn apply(&mut self, patch: &ThreadPatch) {
        self.participant_ids
            .extend(patch.participant_ids.iter().cloned());
        for (uid, profile) in &patch.participants {
            self.participants.insert(uid.clone(), profile.clone());
        }
        if let Some(text) = &patch.last_message {
            self.last_message = text.clone();
        }
        if let Some(time_ms) = patch.last_message_time_ms {
            self.last_message_time_ms = time_ms;
        }
    }

    /// The one member of the pair that is not `uid`.
    ///
    /// Relies on the two-party invariant; if the record ever carries more
    /// participants, the first non-matching id wins.
    pub fn other_participant(&self, uid: &str) -> Option<&str> {
        self.participant_ids
            .iter()
            .map(String::as_str)
            .find(|id| *id != uid)
    }
}
