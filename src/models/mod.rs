//! 数据模型定义
//!
//! - `entities`: 业务实体
//! - `requests`: HTTP 请求体
//! - `responses`: HTTP 响应体
//!
//! `realtime` 为服务端与客户端共用的实时通信帧定义。

pub mod attendance;
pub mod auth;
pub mod class_sessions;
pub mod classes;
pub mod common;
pub mod messages;
pub mod realtime;
pub mod users;

pub use common::response::ApiResponse;

/// 程序启动时间
#[derive(Debug, Clone)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

/// 业务错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,

    // 通用错误
    BadRequest = 1000,
    Unauthorized = 1001,
    Forbidden = 1002,
    NotFound = 1003,
    InternalServerError = 1004,
    RateLimitExceeded = 1005,

    // 认证与用户
    AuthFailed = 2000,
    UserNotFound = 2001,
    UserAlreadyExists = 2002,
    UserNameInvalid = 2003,
    UserEmailInvalid = 2004,
    UserPasswordInvalid = 2005,
    UserCreationFailed = 2006,

    // 班级
    ClassNotFound = 3000,
    ClassEnsureFailed = 3001,
    ClassPermissionDenied = 3002,
    ClassNotStarted = 3003,
    ClassScheduleInvalid = 3004,
    ClassScheduleConflict = 3005,
    ClassUpdateFailed = 3006,
    AttendanceInvalid = 3007,
    AttendanceFailed = 3008,

    // 课堂会话
    SessionNotFound = 4000,
    SessionEnded = 4001,
    SessionStartFailed = 4002,
    SessionLogFailed = 4003,
    HeartbeatFailed = 4004,
}
