use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::debug;

use super::{ClassSessionService, SessionTracker, current_user, session_error_response};
use crate::models::class_sessions::requests::LogSessionRequest;
use crate::models::{ApiResponse, ErrorCode};

pub async fn log_session(
    service: &ClassSessionService,
    request: &HttpRequest,
    session_id: i64,
    log_request: LogSessionRequest,
) -> ActixResult<HttpResponse> {
    let actor = match current_user(request) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let storage = service.get_storage(request);
    let config = service.get_config();
    let tracker = SessionTracker::new(&storage, &config.meeting, &config.session);

    match tracker.log(session_id, &actor, log_request.action).await {
        Ok(entry) => {
            debug!(
                "Session {} log: user {} {}",
                session_id, actor.id, entry.action
            );
            Ok(HttpResponse::Created().json(ApiResponse::success(entry, "Session log recorded")))
        }
        Err(e) => Ok(session_error_response(e, ErrorCode::SessionLogFailed)),
    }
}
