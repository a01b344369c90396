//! 实时通信帧
//!
//! 双向均为 JSON 文本帧：`{"event": "<name>", "data": {...}}`。
//! 服务端 (`services::websocket`) 与客户端 (`client::realtime`) 共用这些定义。

use serde::{Deserialize, Serialize};

use crate::models::messages::entities::{Message, MessageType};

/// 历史消息默认条数
pub const DEFAULT_HISTORY_LIMIT: u64 = 50;
/// 历史消息最大条数
pub const MAX_HISTORY_LIMIT: u64 = 100;

fn default_history_limit() -> u64 {
    DEFAULT_HISTORY_LIMIT
}

/// 客户端发往服务端的命令
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        content: String,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        reply_to: Option<i64>,
    },
    MarkAsRead {
        message_id: i64,
        conversation_id: String,
    },
    Typing {
        conversation_id: String,
    },
    StopTyping {
        conversation_id: String,
    },
    EditMessage {
        message_id: i64,
        content: String,
    },
    DeleteMessage {
        message_id: i64,
    },
    GetConversationHistory {
        conversation_id: String,
        #[serde(default = "default_history_limit")]
        limit: u64,
        #[serde(default)]
        before: Option<i64>,
    },
    GetOnlineUsers,
    Ping,
}

/// 在线用户
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineUser {
    pub user_id: i64,
    pub full_name: String,
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(Message),
    MessageRead {
        message_id: i64,
        conversation_id: String,
        user_id: i64,
        read_at: chrono::DateTime<chrono::Utc>,
    },
    UserTyping {
        conversation_id: String,
        user_id: i64,
        full_name: String,
    },
    UserStopTyping {
        conversation_id: String,
        user_id: i64,
    },
    MessageEdited(Message),
    MessageDeleted {
        message_id: i64,
        conversation_id: String,
    },
    UserOnline(OnlineUser),
    UserOffline {
        user_id: i64,
    },
    ConversationHistory {
        conversation_id: String,
        messages: Vec<Message>,
    },
    OnlineUsers {
        users: Vec<OnlineUser>,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerEvent {
    /// 事件名（与帧中的 `event` 字段一致）
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageRead { .. } => "message_read",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
            ServerEvent::MessageEdited(_) => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::UserOnline(_) => "user_online",
            ServerEvent::UserOffline { .. } => "user_offline",
            ServerEvent::ConversationHistory { .. } => "conversation_history",
            ServerEvent::OnlineUsers { .. } => "online_users",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_shape() {
        let cmd = ClientCommand::Typing {
            conversation_id: "c1".to_string(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["event"], "typing");
        assert_eq!(json["data"]["conversation_id"], "c1");
    }

    #[test]
    fn test_history_defaults() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"event":"get_conversation_history","data":{"conversation_id":"c1"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::GetConversationHistory {
                conversation_id: "c1".to_string(),
                limit: 50,
                before: None,
            }
        );
    }

    #[test]
    fn test_unit_command_without_data() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"event":"get_online_users"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::GetOnlineUsers);
    }

    #[test]
    fn test_event_name_matches_tag() {
        let event = ServerEvent::UserStopTyping {
            conversation_id: "c1".to_string(),
            user_id: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
    }
}
