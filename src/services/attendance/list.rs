use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};

use super::{AttendanceBook, AttendanceService, attendance_error_response};
use crate::middlewares::RequireJWT;
use crate::models::attendance::requests::AttendanceQuery;
use crate::models::attendance::responses::AttendanceListResponse;
use crate::models::{ApiResponse, ErrorCode};

pub async fn list_attendance(
    service: &AttendanceService,
    request: &HttpRequest,
    class_id: i64,
    query: AttendanceQuery,
) -> ActixResult<HttpResponse> {
    let Some(actor) = RequireJWT::extract_user_claims(request) else {
        return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
            ErrorCode::Unauthorized,
            "Unauthorized: missing user id",
        )));
    };
    let storage = service.get_storage(request);
    let date = query.date.as_deref().map(str::trim).filter(|d| !d.is_empty());

    match AttendanceBook::new(&storage).list(class_id, &actor, date).await {
        Ok(items) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            AttendanceListResponse { class_id, items },
            "Attendance retrieved successfully",
        ))),
        Err(e) => Ok(attendance_error_response(e)),
    }
}
