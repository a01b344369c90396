pub mod get;
pub mod heartbeat;
pub mod join;
pub mod logs;
pub mod reaper;
pub mod start;
pub mod state;
pub mod tracker;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use std::sync::Arc;
use tracing::error;

use crate::config::AppConfig;
use crate::errors::Kk360Error;
use crate::middlewares::RequireJWT;
use crate::models::class_sessions::requests::{LogSessionRequest, StartSessionRequest};
use crate::models::users::entities::User;
use crate::models::{ApiResponse, ErrorCode};
use crate::storage::Storage;

pub use tracker::SessionTracker;

pub struct ClassSessionService {
    storage: Option<Arc<dyn Storage>>,
}

impl ClassSessionService {
    pub fn new_lazy() -> Self {
        Self { storage: None }
    }

    pub(crate) fn get_storage(&self, request: &HttpRequest) -> Arc<dyn Storage> {
        if let Some(storage) = &self.storage {
            storage.clone()
        } else {
            request
                .app_data::<actix_web::web::Data<Arc<dyn Storage>>>()
                .expect("Storage not found in app data")
                .get_ref()
                .clone()
        }
    }

    pub(crate) fn get_config(&self) -> &AppConfig {
        AppConfig::get()
    }

    // 开始课堂
    pub async fn start_session(
        &self,
        request: &HttpRequest,
        class_id: i64,
        start_request: StartSessionRequest,
    ) -> ActixResult<HttpResponse> {
        start::start_session(self, request, class_id, start_request).await
    }

    // 加入课堂
    pub async fn join_session(
        &self,
        request: &HttpRequest,
        class_id: i64,
    ) -> ActixResult<HttpResponse> {
        join::join_session(self, request, class_id).await
    }

    // 记录加入/离开
    pub async fn log_session(
        &self,
        request: &HttpRequest,
        session_id: i64,
        log_request: LogSessionRequest,
    ) -> ActixResult<HttpResponse> {
        logs::log_session(self, request, session_id, log_request).await
    }

    // 心跳
    pub async fn heartbeat(
        &self,
        request: &HttpRequest,
        session_id: i64,
    ) -> ActixResult<HttpResponse> {
        heartbeat::heartbeat(self, request, session_id).await
    }

    // 会话详情
    pub async fn get_session(
        &self,
        request: &HttpRequest,
        session_id: i64,
    ) -> ActixResult<HttpResponse> {
        get::get_session(self, request, session_id).await
    }
}

/// 从请求扩展中取出当前用户
fn current_user(request: &HttpRequest) -> Result<User, HttpResponse> {
    RequireJWT::extract_user_claims(request).ok_or_else(|| {
        HttpResponse::Unauthorized().json(ApiResponse::error_empty(
            ErrorCode::Unauthorized,
            "Unauthorized: missing user id",
        ))
    })
}

/// 错误响应辅助函数
fn session_error_response(e: Kk360Error, fallback: ErrorCode) -> HttpResponse {
    match e {
        Kk360Error::NotFound(msg) => {
            HttpResponse::NotFound().json(ApiResponse::error_empty(ErrorCode::ClassNotFound, msg))
        }
        Kk360Error::SessionNotFound(msg) => {
            HttpResponse::NotFound().json(ApiResponse::error_empty(ErrorCode::SessionNotFound, msg))
        }
        Kk360Error::Authorization(msg) => HttpResponse::Forbidden().json(
            ApiResponse::error_empty(ErrorCode::ClassPermissionDenied, msg),
        ),
        Kk360Error::NotStarted(msg) => {
            HttpResponse::Conflict().json(ApiResponse::error_empty(ErrorCode::ClassNotStarted, msg))
        }
        Kk360Error::SessionEnded(msg) => {
            HttpResponse::Conflict().json(ApiResponse::error_empty(ErrorCode::SessionEnded, msg))
        }
        e => {
            error!("Class session operation failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::error_empty(
                fallback,
                "Class session operation failed",
            ))
        }
    }
}
