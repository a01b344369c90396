pub mod book;
pub mod list;
pub mod update;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use std::sync::Arc;
use tracing::error;

use crate::errors::Kk360Error;
use crate::models::attendance::requests::{AttendanceQuery, UpdateAttendanceRequest};
use crate::models::{ApiResponse, ErrorCode};
use crate::storage::Storage;

pub use book::AttendanceBook;

pub struct AttendanceService {
    storage: Option<Arc<dyn Storage>>,
}

impl AttendanceService {
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

    // 查看班级考勤
    pub async fn list_attendance(
        &self,
        request: &HttpRequest,
        class_id: i64,
        query: AttendanceQuery,
    ) -> ActixResult<HttpResponse> {
        list::list_attendance(self, request, class_id, query).await
    }

    // 修改班级考勤
    pub async fn update_attendance(
        &self,
        request: &HttpRequest,
        class_id: i64,
        update_request: UpdateAttendanceRequest,
    ) -> ActixResult<HttpResponse> {
        update::update_attendance(self, request, class_id, update_request).await
    }
}

/// 错误响应辅助函数
fn attendance_error_response(e: Kk360Error) -> HttpResponse {
    match e {
        Kk360Error::Validation(msg) => HttpResponse::BadRequest().json(ApiResponse::error_empty(
            ErrorCode::AttendanceInvalid,
            msg,
        )),
        Kk360Error::NotFound(msg) => {
            HttpResponse::NotFound().json(ApiResponse::error_empty(ErrorCode::ClassNotFound, msg))
        }
        Kk360Error::Authorization(msg) => HttpResponse::Forbidden().json(
            ApiResponse::error_empty(ErrorCode::ClassPermissionDenied, msg),
        ),
        e => {
            error!("Attendance operation failed: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::error_empty(
                ErrorCode::AttendanceFailed,
                "Attendance operation failed",
            ))
        }
    }
}
