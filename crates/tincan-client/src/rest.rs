//! Typed client for the REST surface.
//!
//! Thin wrappers over `reqwest`, one method per route, speaking the request
//! and response types from `tincan-types`.

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use tincan_types::api::{
    AuthResponse, CreateChatRequest, DeleteChatResponse, HistoryResponse, LoginRequest,
    RegisterRequest, SendMessageRequest, ToggleMuteResponse, ToggleReactionRequest,
};
use tincan_types::models::{Chat, Message, User};

use crate::error::ClientError;

/// HTTP client bound to one server. Carries the bearer token once a session
/// exists; `register` and `login` store it automatically.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Client for an already-established session (e.g. a token restored from
    /// disk).
    pub fn with_token(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut client = Self::new(base_url);
        client.token = Some(token.into());
        client
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    // -- Auth --

    pub async fn register(
        &mut self,
        request: &RegisterRequest,
    ) -> Result<AuthResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        let auth: AuthResponse = decode(resp).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            username: username.into(),
            password: password.into(),
        };
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await?;
        let auth: AuthResponse = decode(resp).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    /// Refresh the session. The server backfills a generated username here
    /// when the account does not have one yet.
    pub async fn session(&self) -> Result<User, ClientError> {
        let req = self.authed(self.http.get(self.url("/auth/session")))?;
        decode(req.send().await?).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        let req = self.authed(self.http.get(self.url("/users")))?;
        decode(req.send().await?).await
    }

    // -- Chats --

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ClientError> {
        let req = self.authed(self.http.get(self.url("/chats")))?;
        decode(req.send().await?).await
    }

    /// Create the chat with `user_id`, or fetch the existing one for the
    /// pair.
    pub async fn create_chat(&self, user_id: Uuid) -> Result<Chat, ClientError> {
        let body = CreateChatRequest { user_id };
        let req = self.authed(self.http.post(self.url("/chat")).json(&body))?;
        decode(req.send().await?).await
    }

    pub async fn delete_chat(&self, chat_id: Uuid) -> Result<DeleteChatResponse, ClientError> {
        let req = self.authed(self.http.delete(self.url(&format!("/chat/{chat_id}"))))?;
        decode(req.send().await?).await
    }

    pub async fn toggle_mute(&self, chat_id: Uuid) -> Result<ToggleMuteResponse, ClientError> {
        let req = self.authed(
            self.http
                .patch(self.url(&format!("/chat/{chat_id}/toggle-mute"))),
        )?;
        decode(req.send().await?).await
    }

    pub async fn start_typing(&self, chat_id: Uuid) -> Result<(), ClientError> {
        let req = self.authed(
            self.http
                .patch(self.url(&format!("/chat/{chat_id}/start-typing"))),
        )?;
        check(req.send().await?).await.map(drop)
    }

    pub async fn end_typing(&self, chat_id: Uuid) -> Result<(), ClientError> {
        let req = self.authed(
            self.http
                .patch(self.url(&format!("/chat/{chat_id}/end-typing"))),
        )?;
        check(req.send().await?).await.map(drop)
    }

    // -- Messages --

    pub async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        let req = self.authed(self.http.post(self.url("/message")).json(request))?;
        decode(req.send().await?).await
    }

    /// Fetch one history page, newest page first, each page chronological.
    /// This route takes no session token.
    pub async fn history(
        &self,
        chat_id: Uuid,
        limit: u32,
        page: u32,
    ) -> Result<HistoryResponse, ClientError> {
        let resp = self
            .http
            .get(self.url("/messages"))
            .query(&[
                ("chat_id", chat_id.to_string()),
                ("limit", limit.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn mark_seen(&self, message_id: Uuid) -> Result<Message, ClientError> {
        let req = self.authed(self.http.patch(self.url(&format!("/message/{message_id}"))))?;
        decode(req.send().await?).await
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<Message, ClientError> {
        let req = self.authed(
            self.http
                .delete(self.url(&format!("/message/{message_id}"))),
        )?;
        decode(req.send().await?).await
    }

    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        body: &str,
    ) -> Result<Message, ClientError> {
        let payload = ToggleReactionRequest { body: body.into() };
        let req = self.authed(
            self.http
                .patch(self.url(&format!("/message/{message_id}/react")))
                .json(&payload),
        )?;
        decode(req.send().await?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        match &self.token {
            Some(token) => Ok(builder.header("Authorization", format!("Bearer {token}"))),
            None => Err(ClientError::MissingToken),
        }
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status,
        message: extract_error(&body),
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    Ok(check(resp).await?.json().await?)
}

/// Pull the server's `{"error": "..."}` message out of an error body, falling
/// back to the raw text.
fn extract_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}
