use actix_web::{HttpRequest, HttpResponse, Result as ActixResult, web};
use once_cell::sync::Lazy;

use crate::middlewares;
use crate::models::attendance::requests::{AttendanceQuery, UpdateAttendanceRequest};
use crate::models::class_sessions::requests::{LogSessionRequest, StartSessionRequest};
use crate::models::classes::requests::{EnsureClassRequest, UpdateScheduleRequest};
use crate::models::users::entities::UserRole;
use crate::services::{AttendanceService, ClassService, ClassSessionService};
use crate::utils::{SafeClassIdI64, SafeSessionIdI64};

// 懒加载的全局服务实例
static CLASS_SERVICE: Lazy<ClassService> = Lazy::new(ClassService::new_lazy);
static CLASS_SESSION_SERVICE: Lazy<ClassSessionService> =
    Lazy::new(ClassSessionService::new_lazy);
static ATTENDANCE_SERVICE: Lazy<AttendanceService> = Lazy::new(AttendanceService::new_lazy);

// HTTP处理程序
pub async fn list_classes(req: HttpRequest) -> ActixResult<HttpResponse> {
    CLASS_SERVICE.list_classes(&req).await
}

pub async fn ensure_class(
    req: HttpRequest,
    ensure_data: web::Json<EnsureClassRequest>,
) -> ActixResult<HttpResponse> {
    CLASS_SERVICE
        .ensure_class(&req, ensure_data.into_inner())
        .await
}

pub async fn update_schedule(
    req: HttpRequest,
    class_id: SafeClassIdI64,
    update_data: web::Json<UpdateScheduleRequest>,
) -> ActixResult<HttpResponse> {
    CLASS_SERVICE
        .update_schedule(&req, class_id.0, update_data.into_inner())
        .await
}

pub async fn list_attendance(
    req: HttpRequest,
    class_id: SafeClassIdI64,
    query: web::Query<AttendanceQuery>,
) -> ActixResult<HttpResponse> {
    ATTENDANCE_SERVICE
        .list_attendance(&req, class_id.0, query.into_inner())
        .await
}

pub async fn update_attendance(
    req: HttpRequest,
    class_id: SafeClassIdI64,
    update_data: web::Json<UpdateAttendanceRequest>,
) -> ActixResult<HttpResponse> {
    ATTENDANCE_SERVICE
        .update_attendance(&req, class_id.0, update_data.into_inner())
        .await
}

pub async fn start_session(
    req: HttpRequest,
    class_id: SafeClassIdI64,
    body: Option<web::Json<StartSessionRequest>>,
) -> ActixResult<HttpResponse> {
    let start_request = body.map(|b| b.into_inner()).unwrap_or_default();
    CLASS_SESSION_SERVICE
        .start_session(&req, class_id.0, start_request)
        .await
}

pub async fn join_session(req: HttpRequest, class_id: SafeClassIdI64) -> ActixResult<HttpResponse> {
    CLASS_SESSION_SERVICE.join_session(&req, class_id.0).await
}

pub async fn log_session(
    req: HttpRequest,
    session_id: SafeSessionIdI64,
    log_data: web::Json<LogSessionRequest>,
) -> ActixResult<HttpResponse> {
    CLASS_SESSION_SERVICE
        .log_session(&req, session_id.0, log_data.into_inner())
        .await
}

pub async fn heartbeat(
    req: HttpRequest,
    session_id: SafeSessionIdI64,
) -> ActixResult<HttpResponse> {
    CLASS_SESSION_SERVICE.heartbeat(&req, session_id.0).await
}

pub async fn get_session(
    req: HttpRequest,
    session_id: SafeSessionIdI64,
) -> ActixResult<HttpResponse> {
    CLASS_SESSION_SERVICE.get_session(&req, session_id.0).await
}

// 配置路由
pub fn configure_classes_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/classes")
            .wrap(middlewares::RequireJWT)
            // 教师查询自己的班级，学生查询已加入的班级，管理员查询全部
            .route("", web::get().to(list_classes))
            .service(
                web::resource("/ensure")
                    // 仅管理员可用，排课时查找或创建班级
                    .wrap(middlewares::RequireRole::new_any(UserRole::admin_roles()))
                    .wrap(middlewares::RateLimit::class_ensure())
                    .route(web::post().to(ensure_class)),
            )
            .service(
                web::resource("/{class_id}/start")
                    // 班级教师或管理员开始课堂
                    .wrap(middlewares::RequireRole::new_any(UserRole::tutor_roles()))
                    .route(web::post().to(start_session)),
            )
            .service(
                web::resource("/{class_id}/schedule")
                    // 班级教师或管理员修改时间和状态
                    .wrap(middlewares::RequireRole::new_any(UserRole::tutor_roles()))
                    .route(web::put().to(update_schedule)),
            )
            // 成员可查看，班级教师或管理员可修改
            .service(
                web::resource("/{class_id}/attendance")
                    .route(web::get().to(list_attendance))
                    .route(web::put().to(update_attendance)),
            )
            .route("/{class_id}/join", web::post().to(join_session))
            .route("/session/{session_id}/log", web::post().to(log_session))
            .route(
                "/session/{session_id}/heartbeat",
                web::post().to(heartbeat),
            )
            .route("/session/{session_id}", web::get().to(get_session)),
    );
}
