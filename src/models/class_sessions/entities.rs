use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 会话日志动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub enum SessionAction {
    Join,
    Leave,
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::Join => write!(f, "join"),
            SessionAction::Leave => write!(f, "leave"),
        }
    }
}

impl std::str::FromStr for SessionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(SessionAction::Join),
            "leave" => Ok(SessionAction::Leave),
            _ => Err(format!("Invalid session action: {s}")),
        }
    }
}

/// 会话状态
///
/// `Active` 与 `Stale` 之间可以来回切换（心跳恢复即回到 `Active`），
/// `Ended` 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub enum SessionState {
    Active,
    Stale,
    Ended,
}

// 课堂会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct ClassSession {
    pub id: i64,
    pub class_id: i64,
    pub started_by: i64,
    pub meeting_link: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub active_participants: i32,
}

// 会话日志
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class_session.ts")]
pub struct SessionLog {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub role: String,
    pub action: SessionAction,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
