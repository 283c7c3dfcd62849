//! REST client for the chat server.
//!
//! Implements [`ChatApi`] over `reqwest`. HTTP status codes are mapped onto
//! the [`ChatError`] taxonomy here, and every response body goes through
//! the wire normalizer before callers see it.

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::model::{ChatError, ConversationKey, Message, MessageId, UserId};
use crate::usecase::{ChatApi, MessageDraft, MessageEdit};
use crate::wire::{normalize_message, MessageDto};

/// REST client bound to one server and one authenticated user.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    local_user: UserId,
}

impl RestClient {
    /// Build a client for `base_url` (no trailing slash) using the given
    /// bearer credential.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, local_user: UserId) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            local_user,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    /// Map a non-success HTTP status to the error taxonomy.
    fn status_error(response: &Response) -> Option<ChatError> {
        let status = response.status();
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusCode::UNAUTHORIZED => ChatError::Auth,
            StatusCode::NOT_FOUND => ChatError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_ms = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1_000);
                ChatError::RateLimit { retry_after_ms }
            }
            s if s.is_server_error() => ChatError::Server { status: s.as_u16() },
            s => ChatError::Network(format!("unexpected status {s}")),
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ChatError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;
        if let Some(err) = Self::status_error(&response) {
            debug!(status = %response.status(), "rest call failed");
            return Err(err);
        }
        Ok(response)
    }

    async fn message_body(&self, response: Response) -> Result<Message, ChatError> {
        let dto: MessageDto = response
            .json()
            .await
            .map_err(|e| ChatError::Network(format!("malformed response body: {e}")))?;
        normalize_message(&dto, &self.local_user)
            .map_err(|e| ChatError::Network(format!("unnormalizable response: {e}")))
    }

    fn media_part(upload: &crate::usecase::MediaUpload) -> Result<Part, ChatError> {
        Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime)
            .map_err(|e| ChatError::Network(format!("invalid media part: {e}")))
    }
}

#[async_trait::async_trait]
impl ChatApi for RestClient {
    async fn fetch_messages(
        &self,
        conversation: &ConversationKey,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let request = self
            .http
            .get(self.url("/api/messages"))
            .query(&[("conversation", conversation.to_string())])
            .query(&[("page", page), ("limit", limit)]);
        let response = self.execute(request).await?;

        let dtos: Vec<MessageDto> = response
            .json()
            .await
            .map_err(|e| ChatError::Network(format!("malformed response body: {e}")))?;
        dtos.iter()
            .map(|dto| {
                normalize_message(dto, &self.local_user)
                    .map_err(|e| ChatError::Network(format!("unnormalizable response: {e}")))
            })
            .collect()
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message, ChatError> {
        let mut form = Form::new().text("conversation", draft.conversation.to_string());
        if let Some(peer) = draft.conversation.peer() {
            form = form.text("receiverId", peer.to_string());
        }
        if let Some(content) = &draft.content {
            form = form.text("content", content.clone());
        }
        if let Some(upload) = &draft.media {
            form = form.part("file", Self::media_part(upload)?);
        }

        let request = self.http.post(self.url("/api/messages")).multipart(form);
        let response = self.execute(request).await?;
        self.message_body(response).await
    }

    async fn edit_message(
        &self,
        id: &MessageId,
        edit: &MessageEdit,
    ) -> Result<Message, ChatError> {
        let mut form = Form::new();
        if let Some(content) = &edit.content {
            form = form.text("content", content.clone());
        }
        if edit.remove_media {
            form = form.text("removeMedia", "true");
        }
        if let Some(upload) = &edit.media {
            form = form.part("file", Self::media_part(upload)?);
        }

        let request = self
            .http
            .put(self.url(&format!("/api/messages/{id}")))
            .multipart(form);
        let response = self.execute(request).await?;
        self.message_body(response).await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<Message, ChatError> {
        let request = self.http.delete(self.url(&format!("/api/messages/{id}")));
        let response = self.execute(request).await?;
        self.message_body(response).await
    }

    async fn mark_read(&self, id: &MessageId) -> Result<Message, ChatError> {
        let request = self.http.post(self.url(&format!("/api/messages/{id}/read")));
        let response = self.execute(request).await?;
        self.message_body(response).await
    }

    async fn set_pinned(&self, id: &MessageId, pinned: bool) -> Result<Message, ChatError> {
        let request = self
            .http
            .post(self.url(&format!("/api/messages/{id}/pin")))
            .json(&serde_json::json!({ "isPinned": pinned }));
        let response = self.execute(request).await?;
        self.message_body(response).await
    }
}

// ===== Tests =====
