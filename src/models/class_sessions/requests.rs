use super::entities::SessionAction;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 开始课堂请求（可选指定会议链接）
#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct StartSessionRequest {
    pub session_link: Option<String>,
}

// 会话日志请求
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct LogSessionRequest {
    pub action: SessionAction,
}
