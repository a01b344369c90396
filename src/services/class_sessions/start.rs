use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::info;

use super::{ClassSessionService, SessionTracker, current_user, session_error_response};
use crate::models::class_sessions::requests::StartSessionRequest;
use crate::models::{ApiResponse, ErrorCode};

pub async fn start_session(
    service: &ClassSessionService,
    request: &HttpRequest,
    class_id: i64,
    start_request: StartSessionRequest,
) -> ActixResult<HttpResponse> {
    let actor = match current_user(request) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let storage = service.get_storage(request);
    let config = service.get_config();
    let tracker = SessionTracker::new(&storage, &config.meeting, &config.session);

    match tracker
        .start(class_id, &actor, start_request.session_link)
        .await
    {
        Ok(response) => {
            info!(
                "Session {} ready for class {} ({})",
                response.session_id, class_id, response.session_link
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(response, "Class started successfully")))
        }
        Err(e) => Ok(session_error_response(e, ErrorCode::SessionStartFailed)),
    }
}
