use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{ClassSessionService, SessionTracker, current_user, session_error_response};
use crate::models::{ApiResponse, ErrorCode};

pub async fn heartbeat(
    service: &ClassSessionService,
    request: &HttpRequest,
    session_id: i64,
) -> ActixResult<HttpResponse> {
    let actor = match current_user(request) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let storage = service.get_storage(request);
    let config = service.get_config();
    let tracker = SessionTracker::new(&storage, &config.meeting, &config.session);

    match tracker.heartbeat(session_id, &actor).await {
        Ok(session) => Ok(HttpResponse::Ok().json(ApiResponse::success(session, "Heartbeat received"))),
        Err(e) => Ok(session_error_response(e, ErrorCode::HeartbeatFailed)),
    }
}
