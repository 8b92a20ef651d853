//! Push notification dispatch over the FCM legacy HTTP endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Outcome of one delivery attempt. Dispatch is best-effort: callers treat
/// every outcome as non-fatal and never retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &BTreeMap<String, String>,
    ) -> DeliveryOutcome;
}

/// All content rides in the `data` field; the receiving client renders the
/// notification itself (legacy-API compatibility).
#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    to: &'a str,
    priority: &'static str,
    data: PushData<'a>,
}

#[derive(Debug, Serialize)]
struct PushData<'a> {
    title: &'a str,
    body: &'a str,
    sound: &'static str,
    android_channel_id: &'static str,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, String>,
}

fn build_payload<'a>(
    device_token: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a BTreeMap<String, String>,
) -> PushPayload<'a> {
    PushPayload {
        to: device_token,
        priority: "high",
        data: PushData {
            title,
            body,
            sound: "default",
            android_channel_id: "default_channel",
            extra: data,
        },
    }
}

/// HTTP client for the push gateway.
pub struct FcmDispatcher {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmDispatcher {
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            server_key: server_key.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatch for FcmDispatcher {
    async fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &BTreeMap<String, String>,
    ) -> DeliveryOutcome {
        let payload = build_payload(device_token, title, body, data);

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.server_key),
            )
            .json(&payload)
            .send()
            .await;

        // Only a plain 200 counts as delivered.
        match response {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                debug!(token = device_token, "push delivered");
                DeliveryOutcome::Delivered
            }
            Ok(response) => DeliveryOutcome::Failed(format!(
                "push endpoint returned {}",
                response.status()
            )),
            Err(err) => DeliveryOutcome::Failed(format!("push request failed: {err}")),
        }
    }
}
