//! User profile documents and device token registration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shopme_chat::ParticipantProfile;

use crate::storage::{ChatThreadStore, Result, SledStore, StoreError};

/// User document as stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub device_token: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl UserProfile {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        avatar_url: impl Into<String>,
        created_at_ms: i64,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            email: email.into(),
            avatar_url: avatar_url.into(),
            device_token: None,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// Chat-facing snapshot of this profile.
    pub fn participant_profile(&self) -> ParticipantProfile {
        ParticipantProfile::new(
            self.uid.clone(),
            self.name.clone(),
            self.avatar_url.clone(),
        )
    }
}

/// Merge-update for the editable profile fields.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn upsert_profile(&self, profile: UserProfile) -> Result<()>;

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Merge-update name/email/avatar, stamping `updated_at_ms`.
    async fn update_profile(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile>;

    /// Merge-write the push token into the user document. A refreshed token
    /// overwrites the previous one.
    async fn register_device_token(&self, uid: &str, token: &str) -> Result<()>;

    async fn device_token(&self, uid: &str) -> Result<Option<String>>;
}

#[async_trait]
impl ProfileDirectory for SledStore {
    async fn upsert_profile(&self, profile: UserProfile) -> Result<()> {
        let tree = self.users_tree()?;
        tree.insert(profile.uid.as_bytes(), bincode::serialize(&profile)?)?;
        tree.flush()?;
        Ok(())
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        let tree = self.users_tree()?;
        match tree.get(uid.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    async fn update_profile(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile> {
        let tree = self.users_tree()?;
        let mut profile: UserProfile = match tree.get(uid.as_bytes())? {
            Some(value) => bincode::deserialize(&value)?,
            None => return Err(StoreError::UnknownUser(uid.to_string())),
        };

        if let Some(name) = patch.name {
            profile.name = name;
        }
        if let Some(email) = patch.email {
            profile.email = email;
        }
        if let Some(avatar_url) = patch.avatar_url {
            profile.avatar_url = avatar_url;
        }
        profile.updated_at_ms = self.server_time_ms();

        tree.insert(uid.as_bytes(), bincode::serialize(&profile)?)?;
        tree.flush()?;
        Ok(profile)
    }

    async fn register_device_token(&self, uid: &str, token: &str) -> Result<()> {
        let tree = self.users_tree()?;
        let mut profile: UserProfile = match tree.get(uid.as_bytes())? {
            Some(value) => bincode::deserialize(&value)?,
            None => return Err(StoreError::UnknownUser(uid.to_string())),
        };
        profile.device_token = Some(token.to_string());

        tree.insert(uid.as_bytes(), bincode::serialize(&profile)?)?;
        tree.flush()?;
        Ok(())
    }

    async fn device_token(&self, uid: &str) -> Result<Option<String>> {
        Ok(self
            .get_profile(uid)
            .await?
            .and_then(|profile| profile.device_token))
    }
}
