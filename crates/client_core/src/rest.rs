use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::domain::{ChatMessage, GroupId};

/// Source of the current bearer token. Consumers fetch it fresh on every
/// connect and REST call rather than caching it at construction.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Settable token slot, the hand-off point from whatever owns authentication.
#[derive(Default)]
pub struct SharedToken {
    token: Mutex<Option<String>>,
}

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some(token.into())),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.lock() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenProvider for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.lock().clone()
    }
}

/// One page of REST message history, newest page first at offset 0.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub limit: u32,
    pub offset: u32,
}

/// REST side of the chat backend: paginated history and the non-realtime
/// send fallback.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_history(&self, group_id: GroupId, limit: u32, offset: u32)
        -> Result<HistoryPage>;
    async fn send_message(&self, group_id: GroupId, content: &str) -> Result<ChatMessage>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

pub struct HttpChatApi {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }

    fn endpoint(&self, group_id: GroupId) -> String {
        format!(
            "{}/groups/{}/messages",
            self.base_url.trim_end_matches('/'),
            group_id.0
        )
    }

    fn bearer(&self) -> Result<String> {
        self.tokens
            .access_token()
            .context("no access token for REST call")
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_history(
        &self,
        group_id: GroupId,
        limit: u32,
        offset: u32,
    ) -> Result<HistoryPage> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.endpoint(group_id))
            .query(&[("limit", limit), ("offset", offset)])
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("failed to fetch history for group {}", group_id.0))?
            .error_for_status()?;
        let page = response.json().await.context("invalid history payload")?;
        Ok(page)
    }

    async fn send_message(&self, group_id: GroupId, content: &str) -> Result<ChatMessage> {
        let token = self.bearer()?;
        let response = self
            .http
            .post(self.endpoint(group_id))
            .bearer_auth(token)
            .json(&SendMessageRequest {
                content,
                kind: "text",
            })
            .send()
            .await
            .with_context(|| format!("failed to send message to group {}", group_id.0))?
            .error_for_status()?;
        let message = response.json().await.context("invalid message payload")?;
        Ok(message)
    }
}
