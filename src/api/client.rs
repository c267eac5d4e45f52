use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::ChatTransport;
use crate::api::models::{
    Conversation, ConversationStatus, Message, MessagePage, OutgoingMessage, SenderRole,
};
use crate::error::ChatError;

pub struct ApiClient {
    http: HttpClient,
    base_api: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ChatError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Self::with_http(http, base_url, token)
    }

    pub fn with_http(http: HttpClient, base_url: &str, token: Option<String>) -> Result<Self, ChatError> {
        let base_api = Url::parse(&Self::base_api(base_url))?;
        if base_api.cannot_be_a_base() {
            return Err(ChatError::Config(format!("not a usable base URL: {base_url}")));
        }
        Ok(Self {
            http,
            base_api,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn with_auth(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }
        req
    }

    /// Append path segments to the API root, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ChatError> {
        let status = resp.status();
        if !status.is_success() {
            let detail = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("detail").cloned())
                .map(|d| match d {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
            return Err(ChatError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /chat/conversations/my`; the server creates the conversation on
    /// first access.
    pub async fn my_conversation(&self) -> Result<Conversation, ChatError> {
        let url = self.endpoint(&["chat", "conversations", "my"]);
        debug!("GET {url}");
        let resp = self.with_auth(self.http.get(url)).send().await?;
        Self::read_json(resp).await
    }

    pub async fn messages(&self, conversation_id: &str, page: &MessagePage) -> Result<Vec<Message>, ChatError> {
        let url = self.endpoint(&["chat", "messages", conversation_id]);
        debug!("GET {url}");
        let mut req = self.http.get(url).query(&[("limit", page.limit)]);
        if let Some(before) = page.before {
            req = req.query(&[("before", before.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())]);
        }
        let resp = self.with_auth(req).send().await?;
        Self::read_json(resp).await
    }

    pub async fn admin_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<Message>, ChatError> {
        let url = self.endpoint(&["chat", "admin", "messages", conversation_id]);
        debug!("GET {url}");
        let req = self.http.get(url).query(&[("limit", limit)]);
        let resp = self.with_auth(req).send().await?;
        Self::read_json(resp).await
    }

    /// Multipart send. The admin endpoint stamps the message with the admin
    /// role server-side.
    pub async fn send_message(&self, role: SenderRole, outgoing: &OutgoingMessage) -> Result<Message, ChatError> {
        let url = match role {
            SenderRole::User => self.endpoint(&["chat", "messages"]),
            SenderRole::Admin => self.endpoint(&["chat", "admin", "messages"]),
        };
        let mut form = Form::new()
            .text("conversation_id", outgoing.conversation_id.clone())
            .text("content", outgoing.content.clone())
            .text("message_type", outgoing.message_type.as_str());
        if let Some(image) = &outgoing.image {
            let part = Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)?;
            form = form.part("image", part);
        }
        debug!("POST {url} ({})", outgoing.message_type.as_str());
        let resp = self.with_auth(self.http.post(url).multipart(form)).send().await?;
        Self::read_json(resp).await
    }

    pub async fn admin_conversations(&self, status: Option<&ConversationStatus>) -> Result<Vec<Conversation>, ChatError> {
        let url = self.endpoint(&["chat", "admin", "conversations"]);
        debug!("GET {url}");
        let mut req = self.http.get(url);
        if let Some(status) = status {
            req = req.query(&[("status", status.as_str())]);
        }
        let resp = self.with_auth(req).send().await?;
        Self::read_json(resp).await
    }

    pub async fn update_status(&self, conversation_id: &str, status: &ConversationStatus) -> Result<(), ChatError> {
        let url = self.endpoint(&["chat", "admin", "conversations", conversation_id, "status"]);
        debug!("PUT {url} -> {}", status.as_str());
        let req = self.http.put(url).query(&[("status", status.as_str())]);
        let resp = self.with_auth(req).send().await?;
        let _: Value = Self::read_json(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn my_conversation(&self) -> Result<Conversation, ChatError> {
        ApiClient::my_conversation(self).await
    }

    async fn messages(&self, role: SenderRole, conversation_id: &str, page: &MessagePage) -> Result<Vec<Message>, ChatError> {
        match role {
            SenderRole::User => ApiClient::messages(self, conversation_id, page).await,
            SenderRole::Admin => self.admin_messages(conversation_id, page.limit).await,
        }
    }

    async fn send_message(&self, role: SenderRole, outgoing: &OutgoingMessage) -> Result<Message, ChatError> {
        ApiClient::send_message(self, role, outgoing).await
    }

    async fn conversations(&self, status: Option<&ConversationStatus>) -> Result<Vec<Conversation>, ChatError> {
        self.admin_conversations(status).await
    }

    async fn update_status(&self, conversation_id: &str, status: &ConversationStatus) -> Result<(), ChatError> {
        ApiClient::update_status(self, conversation_id, status).await
    }
}
