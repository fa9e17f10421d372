use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::api::models::{
    AuthResponse, ConversationKey, CreateGroupRequest, Group, GroupId, GroupMember, JoinGroupRequest,
    LoginRequest, Message, RegisterRequest, SendMessageRequest, User,
};
use crate::error::ApiError;

const GENERIC_FAILURE: &str = "Request failed";

/// The two message endpoints the conversation core depends on.
#[async_trait]
pub trait MessageApi: Send + Sync {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError>;
    async fn list_messages(&self, key: ConversationKey) -> Result<Vec<Message>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_api: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: HttpClient::new(),
            base_api: Self::base_api(base_url),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_api, path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Turn a non-2xx response into `ApiError::Request`, pulling the server's
    /// `{"error": "..."}` message out of the body when there is one.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|json| json.get("error").and_then(|v| v.as_str()).map(str::to_string))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        Err(ApiError::Request { status: status.as_u16(), message })
    }

    /// Read a successful body and decode it, keeping shape mismatches apart from transport failures.
    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let body = Self::check(resp).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.with_auth(self.http.get(self.endpoint(path))).send().await?;
        Self::decode(resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let resp = self.with_auth(self.http.post(self.endpoint(path))).json(body).send().await?;
        Self::decode(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest { email: email.to_string(), password: password.to_string() };
        self.post_json("/auth/login", &body).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/auth/register", &body).await
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("/user/me").await
    }

    pub async fn create_group(&self, name: &str, description: Option<&str>) -> Result<Group, ApiError> {
        let body = CreateGroupRequest {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.post_json("/groups/create", &body).await
    }

    pub async fn join_group(&self, group_id: GroupId) -> Result<(), ApiError> {
        let _: Value = self.post_json("/groups/join", &JoinGroupRequest { group_id }).await?;
        Ok(())
    }

    pub async fn groups(&self) -> Result<Vec<Group>, ApiError> {
        self.get_json("/groups/list").await
    }

    pub async fn group_members(&self, group_id: GroupId) -> Result<Vec<GroupMember>, ApiError> {
        self.get_json(&format!("/groups/{}/members", group_id)).await
    }
}

#[async_trait]
impl MessageApi for ApiClient {
    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError> {
        self.post_json("/messages/send", request).await
    }

    async fn list_messages(&self, key: ConversationKey) -> Result<Vec<Message>, ApiError> {
        let query = match key {
            ConversationKey::Contact(id) => ("receiver_id", id),
            ConversationKey::Group(id) => ("group_id", id),
        };
        let req = self.http.get(self.endpoint("/messages/list")).query(&[query]);
        let resp = self.with_auth(req).send().await?;
        Self::decode(resp).await
    }
}
