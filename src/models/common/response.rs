use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::models::ErrorCode;

// 统一的API响应结构
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/api.ts")]
pub struct ApiResponse<T: TS> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T: TS> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Success as i32,
            message: message.into(),
            data: Some(data),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(code: ErrorCode, data: T, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: Some(data),
            timestamp: chrono::Utc::now(),
        }
    }

    /// 是否为成功响应
    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success as i32
    }

    /// 取出数据，失败响应或缺少数据时返回错误消息（客户端使用）
    pub fn into_data(self) -> Result<T, String> {
        if !self.is_success() {
            return Err(format!("[{}] {}", self.code, self.message));
        }
        self.data
            .ok_or_else(|| format!("响应缺少数据: {}", self.message))
    }
}

impl ApiResponse<()> {
    pub fn success_empty(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Success as i32,
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error_empty(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_data_success() {
        let resp = ApiResponse::success(42i32, "ok");
        assert!(resp.is_success());
        assert_eq!(resp.into_data(), Ok(42));
    }

    #[test]
    fn test_into_data_error() {
        let resp: ApiResponse<i32> = ApiResponse {
            code: ErrorCode::ClassNotStarted as i32,
            message: "课堂尚未开始".to_string(),
            data: None,
            timestamp: chrono::Utc::now(),
        };
        let err = resp.into_data().unwrap_err();
        assert!(err.contains("3003"));
    }
}
