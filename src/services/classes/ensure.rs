use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::{error, info};

use super::{ClassResolver, ClassService};
use crate::errors::Kk360Error;
use crate::models::classes::requests::EnsureClassRequest;
use crate::models::{ApiResponse, ErrorCode};

pub async fn ensure_class(
    service: &ClassService,
    request: &HttpRequest,
    ensure_request: EnsureClassRequest,
) -> ActixResult<HttpResponse> {
    let storage = service.get_storage(request);
    let config = service.get_config();
    let resolver = ClassResolver::new(&storage, &config.meeting);

    let tutor_id = ensure_request.tutor_id;
    let student_id = ensure_request.student_id;

    match resolver.ensure_class(ensure_request).await {
        Ok(class) => {
            info!(
                "Class {} ensured for tutor {} and student {}",
                class.id, tutor_id, student_id
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(class, "Class ensured successfully")))
        }
        Err(e) => Ok(handle_ensure_error(e)),
    }
}

/// 错误响应辅助函数
fn handle_ensure_error(e: Kk360Error) -> HttpResponse {
    match e {
        Kk360Error::Validation(msg) => HttpResponse::BadRequest().json(ApiResponse::error_empty(
            ErrorCode::ClassScheduleInvalid,
            msg,
        )),
        Kk360Error::NotFound(msg) => {
            HttpResponse::NotFound().json(ApiResponse::error_empty(ErrorCode::UserNotFound, msg))
        }
        e => {
            error!("Class ensure failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::error_empty(
                ErrorCode::ClassEnsureFailed,
                "Class ensure failed",
            ))
        }
    }
}
