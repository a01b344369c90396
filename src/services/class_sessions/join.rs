use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{ClassSessionService, SessionTracker, current_user, session_error_response};
use crate::models::{ApiResponse, ErrorCode};

pub async fn join_session(
    service: &ClassSessionService,
    request: &HttpRequest,
    class_id: i64,
) -> ActixResult<HttpResponse> {
    let actor = match current_user(request) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let storage = service.get_storage(request);
    let config = service.get_config();
    let tracker = SessionTracker::new(&storage, &config.meeting, &config.session);

    match tracker.join(class_id, &actor).await {
        Ok(response) => {
            Ok(HttpResponse::Ok().json(ApiResponse::success(response, "Joined class successfully")))
        }
        Err(e) => Ok(session_error_response(e, ErrorCode::SessionStartFailed)),
    }
}
