use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::error;

use super::ClassService;
use crate::{
    middlewares::RequireJWT,
    models::{ApiResponse, ErrorCode, classes::responses::ClassListResponse},
};

pub async fn list_classes(
    service: &ClassService,
    request: &HttpRequest,
) -> ActixResult<HttpResponse> {
    let storage = service.get_storage(request);

    let (uid, role) = match (
        RequireJWT::extract_user_id(request),
        RequireJWT::extract_user_role(request),
    ) {
        (Some(uid), Some(role)) => (uid, role),
        _ => {
            return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
                ErrorCode::Unauthorized,
                "Unauthorized: missing user id",
            )));
        }
    };

    // 管理员可查全部班级，教师查自己的班级，学生查已加入的班级
    match storage.list_classes_for_user(uid, &role).await {
        Ok(items) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            ClassListResponse { items },
            "Class list retrieved successfully",
        ))),
        Err(e) => {
            error!("Failed to retrieve class list for user {}: {}", uid, e);
            Ok(
                HttpResponse::InternalServerError().json(ApiResponse::error_empty(
                    ErrorCode::InternalServerError,
                    "Failed to retrieve class list",
                )),
            )
        }
    }
}
