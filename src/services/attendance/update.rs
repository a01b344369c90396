use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::info;

use super::{AttendanceBook, AttendanceService, attendance_error_response};
use crate::middlewares::RequireJWT;
use crate::models::attendance::entities::attendance_date;
use crate::models::attendance::requests::UpdateAttendanceRequest;
use crate::models::attendance::responses::AttendanceListResponse;
use crate::models::{ApiResponse, ErrorCode};

pub async fn update_attendance(
    service: &AttendanceService,
    request: &HttpRequest,
    class_id: i64,
    update_request: UpdateAttendanceRequest,
) -> ActixResult<HttpResponse> {
    let Some(actor) = RequireJWT::extract_user_claims(request) else {
        return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
            ErrorCode::Unauthorized,
            "Unauthorized: missing user id",
        )));
    };
    let storage = service.get_storage(request);
    let today = attendance_date(chrono::Utc::now());

    match AttendanceBook::new(&storage)
        .update(class_id, &actor, update_request, &today)
        .await
    {
        Ok(items) => {
            info!(
                "Attendance of class {} updated by user {} ({} record(s))",
                class_id,
                actor.id,
                items.len()
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(
                AttendanceListResponse { class_id, items },
                "Attendance updated successfully",
            )))
        }
        Err(e) => Ok(attendance_error_response(e)),
    }
}
