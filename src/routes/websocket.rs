use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, rt, web};
use serde::Deserialize;
use tracing::{error, info};

use crate::middlewares;
use crate::middlewares::require_jwt::authenticate_token;
use crate::models::{ApiResponse, ErrorCode};
use crate::services::WebSocketService;
use crate::storage::Storage;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket 握手，token 通过查询参数传递，校验失败时在升级前返回 401
pub async fn websocket(
    req: HttpRequest,
    body: web::Payload,
    query: web::Query<WsQuery>,
    storage: web::Data<Arc<dyn Storage>>,
) -> ActixResult<HttpResponse> {
    let storage = storage.get_ref().clone();

    let Some(token) = query.into_inner().token.filter(|t| !t.is_empty()) else {
        return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
            ErrorCode::Unauthorized,
            "Unauthorized: missing token",
        )));
    };

    let user = match authenticate_token(&storage, &token).await {
        Ok(user) => user,
        Err(err) => {
            info!("WebSocket authentication failed: {}", err);
            return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
                ErrorCode::Unauthorized,
                format!("Unauthorized: {err}"),
            )));
        }
    };

    let (response, session, stream) = match actix_ws::handle(&req, body) {
        Ok(parts) => parts,
        Err(e) => {
            error!("WebSocket handshake failed for user {}: {}", user.id, e);
            return Err(e);
        }
    };

    rt::spawn(WebSocketService::handle_connection(
        storage, user, session, stream,
    ));

    Ok(response)
}

// 配置路由
pub fn configure_websocket_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/ws")
            .wrap(middlewares::RateLimit::ws_handshake())
            .route(web::get().to(websocket)),
    );
}
