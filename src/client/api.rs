//! REST API 客户端
//!
//! 自动附加 `Authorization: Bearer <token>`。持有 token 时收到 401
//! 视为登录失效：清空会话存储并返回 `SessionExpired`，由界面引导重新登录。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ts_rs::TS;

use super::session_store::SessionStore;
use crate::errors::{Kk360Error, Result};
use crate::models::auth::requests::LoginRequest;
use crate::models::auth::responses::LoginResponse;
use crate::models::class_sessions::entities::SessionAction;
use crate::models::class_sessions::requests::{LogSessionRequest, StartSessionRequest};
use crate::models::class_sessions::responses::SessionStartResponse;
use crate::models::{ApiResponse, ErrorCode};

/// 课堂会话相关调用（会议页面使用）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassSessionApi: Send + Sync {
    /// 开始课堂（教师）
    async fn start_class(
        &self,
        class_id: i64,
        session_link: Option<String>,
    ) -> Result<SessionStartResponse>;

    /// 加入课堂
    async fn join_class(&self, class_id: i64) -> Result<SessionStartResponse>;

    /// 记录加入/离开
    async fn log_session(&self, session_id: i64, action: SessionAction) -> Result<()>;

    /// 心跳
    async fn heartbeat(&self, session_id: i64) -> Result<()>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, store)
    }

    /// 使用自定义的 reqwest 客户端（代理、超时等）
    pub fn with_http(
        http: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// 登录并保存 token
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self
            .request(Method::POST, "/api/v1/auth/login", Some(&body))
            .await?;
        self.store.set_token(response.access_token.clone());
        self.store.set_user(response.user.clone());
        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + TS,
    {
        let token = self.store.token();
        let mut builder = self.http.request(method.clone(), self.url(path));
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("{} {} -> {}", method, path, status);

        if status == StatusCode::UNAUTHORIZED && token.is_some() {
            warn!("Session expired while calling {}, clearing stored token", path);
            self.store.clear();
            return Err(Kk360Error::session_expired("Login expired, please login again"));
        }

        let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(failure(status, None, &text)),
            Err(e) => return Err(e.into()),
        };

        if !status.is_success() || !envelope.is_success() {
            return Err(failure(status, Some(envelope.code), &envelope.message));
        }
        envelope.into_data().map_err(Kk360Error::http)
    }
}

/// 把失败响应映射为错误类型
fn failure(status: StatusCode, code: Option<i32>, message: &str) -> Kk360Error {
    match code {
        Some(code) if code == ErrorCode::ClassNotStarted as i32 => {
            Kk360Error::not_started(message)
        }
        Some(code) if code == ErrorCode::SessionEnded as i32 => Kk360Error::session_ended(message),
        Some(code) if code == ErrorCode::SessionNotFound as i32 => {
            Kk360Error::session_not_found(message)
        }
        _ => match status {
            StatusCode::UNAUTHORIZED => Kk360Error::authentication(message),
            StatusCode::FORBIDDEN => Kk360Error::authorization(message),
            StatusCode::NOT_FOUND => Kk360Error::not_found(message),
            _ => Kk360Error::http(format!("{status}: {message}")),
        },
    }
}

#[async_trait]
impl ClassSessionApi for ApiClient {
    async fn start_class(
        &self,
        class_id: i64,
        session_link: Option<String>,
    ) -> Result<SessionStartResponse> {
        let body = StartSessionRequest { session_link };
        self.request(
            Method::POST,
            &format!("/api/v1/classes/{class_id}/start"),
            Some(&body),
        )
        .await
    }

    async fn join_class(&self, class_id: i64) -> Result<SessionStartResponse> {
        self.request::<(), _>(
            Method::POST,
            &format!("/api/v1/classes/{class_id}/join"),
            None,
        )
        .await
    }

    async fn log_session(&self, session_id: i64, action: SessionAction) -> Result<()> {
        let body = LogSessionRequest { action };
        self.request::<_, serde_json::Value>(
            Method::POST,
            &format!("/api/v1/classes/session/{session_id}/log"),
            Some(&body),
        )
        .await
        .map(|_| ())
    }

    async fn heartbeat(&self, session_id: i64) -> Result<()> {
        self.request::<(), serde_json::Value>(
            Method::POST,
            &format!("/api/v1/classes/session/{session_id}/heartbeat"),
            None,
        )
        .await
        .map(|_| ())
    }
}
