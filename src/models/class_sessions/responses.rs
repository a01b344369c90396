use super::entities::{ClassSession, SessionLog, SessionState};
use crate::models::classes::entities::Class;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 开始/加入课堂响应
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct SessionStartResponse {
    pub session_link: String,
    pub session_id: i64,
    pub class: Class,
}

// 会话详情响应
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct SessionDetailResponse {
    pub session: ClassSession,
    pub state: SessionState,
    pub logs: Vec<SessionLog>,
}
