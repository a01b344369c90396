use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 消息类型
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../frontend/src/types/generated/message.ts")]
pub enum MessageType {
    #[default]
    Text,
    File,
    Image,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::File => write!(f, "file"),
            MessageType::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "file" => Ok(MessageType::File),
            "image" => Ok(MessageType::Image),
            _ => Err(format!("Invalid message type: {s}")),
        }
    }
}

// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/message.ts")]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
}

// 新消息（写入存储前）
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<i64>,
}
