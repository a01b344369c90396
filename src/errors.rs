//! 统一错误处理模块
//!
//! 使用宏自动生成错误类型，支持错误代码和类型名称。
//! 服务端与客户端（`client` 模块）共用同一个错误类型。

use std::fmt;

/// 定义错误类型的宏
///
/// 自动生成：
/// - enum 定义
/// - code() 方法 - 返回错误代码
/// - error_type() 方法 - 返回错误类型名称
/// - message() 方法 - 返回错误详情
/// - 便捷构造函数
macro_rules! define_kk360_errors {
    ($(
        $variant:ident($code:literal, $type_name:literal)
    ),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Kk360Error {
            $($variant(String),)*
        }

        impl Kk360Error {
            /// 获取错误代码
            pub fn code(&self) -> &'static str {
                match self {
                    $(Kk360Error::$variant(_) => $code,)*
                }
            }

            /// 获取错误类型名称
            pub fn error_type(&self) -> &'static str {
                match self {
                    $(Kk360Error::$variant(_) => $type_name,)*
                }
            }

            /// 获取错误详情
            pub fn message(&self) -> &str {
                match self {
                    $(Kk360Error::$variant(msg) => msg,)*
                }
            }
        }

        // 生成便捷构造函数
        paste::paste! {
            impl Kk360Error {
                $(
                    pub fn [<$variant:snake>]<T: Into<String>>(msg: T) -> Self {
                        Kk360Error::$variant(msg.into())
                    }
                )*
            }
        }
    };
}

define_kk360_errors! {
    DatabaseConfig("E001", "Database Configuration Error"),
    DatabaseConnection("E002", "Database Connection Error"),
    DatabaseOperation("E003", "Database Operation Error"),
    Conflict("E004", "Unique Constraint Conflict"),
    Validation("E005", "Validation Error"),
    NotFound("E006", "Resource Not Found"),
    Serialization("E007", "Serialization Error"),
    DateParse("E008", "Date Parse Error"),
    Authentication("E009", "Authentication Error"),
    Authorization("E010", "Authorization Error"),
    SessionEnded("E011", "Session Ended"),
    Io("E012", "IO Error"),
    Transport("E013", "Realtime Transport Error"),
    Http("E014", "HTTP Client Error"),
    SessionExpired("E015", "Session Expired"),
    NotStarted("E016", "Class Not Started"),
    SessionNotFound("E017", "Class Session Not Found"),
}

impl Kk360Error {
    /// 格式化为彩色输出（用于开发环境）
    #[cfg(debug_assertions)]
    pub fn format_colored(&self) -> String {
        format!(
            "\x1b[1;31m[ERROR]\x1b[0m \x1b[33m{}\x1b[0m \x1b[31m{}\x1b[0m\n  {}",
            self.code(),
            self.error_type(),
            self.message()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }

    /// 是否为唯一约束冲突（用于并发创建时重新查询）
    pub fn is_conflict(&self) -> bool {
        matches!(self, Kk360Error::Conflict(_))
    }
}

impl fmt::Display for Kk360Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for Kk360Error {}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for Kk360Error {
    fn from(err: sea_orm::DbErr) -> Self {
        if let Some(sea_orm::SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return Kk360Error::Conflict(msg);
        }
        Kk360Error::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for Kk360Error {
    fn from(err: std::io::Error) -> Self {
        Kk360Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Kk360Error {
    fn from(err: serde_json::Error) -> Self {
        Kk360Error::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for Kk360Error {
    fn from(err: chrono::ParseError) -> Self {
        Kk360Error::DateParse(err.to_string())
    }
}

impl From<reqwest::Error> for Kk360Error {
    fn from(err: reqwest::Error) -> Self {
        Kk360Error::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Kk360Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Kk360Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Kk360Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Kk360Error::database_config("test").code(), "E001");
        assert_eq!(Kk360Error::conflict("test").code(), "E004");
        assert_eq!(Kk360Error::validation("test").code(), "E005");
        assert_eq!(Kk360Error::session_expired("test").code(), "E015");
        assert_eq!(Kk360Error::not_started("test").code(), "E016");
        assert_eq!(Kk360Error::session_not_found("test").code(), "E017");
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            Kk360Error::session_ended("test").error_type(),
            "Session Ended"
        );
        assert_eq!(
            Kk360Error::transport("test").error_type(),
            "Realtime Transport Error"
        );
    }

    #[test]
    fn test_format_simple() {
        let err = Kk360Error::validation("Invalid time");
        let formatted = err.format_simple();
        assert!(formatted.contains("Validation Error"));
        assert!(formatted.contains("Invalid time"));
    }

    #[test]
    fn test_db_err_maps_to_operation() {
        let err: Kk360Error = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert_eq!(err.code(), "E003");
        assert!(!err.is_conflict());
    }
}
