//! 本地事件
//!
//! 服务端事件以 `socket_<event>` 的名字转发给界面，另有连接状态事件。

use serde::Serialize;

use crate::models::messages::entities::Message;
use crate::models::realtime::{OnlineUser, ServerEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LocalEvent {
    ConnectionStatus {
        connected: bool,
    },
    SocketNewMessage(Message),
    SocketMessageRead {
        message_id: i64,
        conversation_id: String,
        user_id: i64,
        read_at: chrono::DateTime<chrono::Utc>,
    },
    SocketUserTyping {
        conversation_id: String,
        user_id: i64,
        full_name: String,
    },
    SocketUserStopTyping {
        conversation_id: String,
        user_id: i64,
    },
    SocketMessageEdited(Message),
    SocketMessageDeleted {
        message_id: i64,
        conversation_id: String,
    },
    SocketUserOnline(OnlineUser),
    SocketUserOffline {
        user_id: i64,
    },
    SocketConversationHistory {
        conversation_id: String,
        messages: Vec<Message>,
    },
    SocketOnlineUsers {
        users: Vec<OnlineUser>,
    },
    SocketError {
        message: String,
    },
}

impl LocalEvent {
    /// 服务端事件转为本地事件，`pong` 不转发
    pub fn from_server(event: ServerEvent) -> Option<Self> {
        let local = match event {
            ServerEvent::NewMessage(message) => LocalEvent::SocketNewMessage(message),
            ServerEvent::MessageRead {
                message_id,
                conversation_id,
                user_id,
                read_at,
            } => LocalEvent::SocketMessageRead {
                message_id,
                conversation_id,
                user_id,
                read_at,
            },
            ServerEvent::UserTyping {
                conversation_id,
                user_id,
                full_name,
            } => LocalEvent::SocketUserTyping {
                conversation_id,
                user_id,
                full_name,
            },
            ServerEvent::UserStopTyping {
                conversation_id,
                user_id,
            } => LocalEvent::SocketUserStopTyping {
                conversation_id,
                user_id,
            },
            ServerEvent::MessageEdited(message) => LocalEvent::SocketMessageEdited(message),
            ServerEvent::MessageDeleted {
                message_id,
                conversation_id,
            } => LocalEvent::SocketMessageDeleted {
                message_id,
                conversation_id,
            },
            ServerEvent::UserOnline(user) => LocalEvent::SocketUserOnline(user),
            ServerEvent::UserOffline { user_id } => LocalEvent::SocketUserOffline { user_id },
            ServerEvent::ConversationHistory {
                conversation_id,
                messages,
            } => LocalEvent::SocketConversationHistory {
                conversation_id,
                messages,
            },
            ServerEvent::OnlineUsers { users } => LocalEvent::SocketOnlineUsers { users },
            ServerEvent::Error { message } => LocalEvent::SocketError { message },
            ServerEvent::Pong => return None,
        };
        Some(local)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocalEvent::ConnectionStatus { .. } => "connection_status",
            LocalEvent::SocketNewMessage(_) => "socket_new_message",
            LocalEvent::SocketMessageRead { .. } => "socket_message_read",
            LocalEvent::SocketUserTyping { .. } => "socket_user_typing",
            LocalEvent::SocketUserStopTyping { .. } => "socket_user_stop_typing",
            LocalEvent::SocketMessageEdited(_) => "socket_message_edited",
            LocalEvent::SocketMessageDeleted { .. } => "socket_message_deleted",
            LocalEvent::SocketUserOnline(_) => "socket_user_online",
            LocalEvent::SocketUserOffline { .. } => "socket_user_offline",
            LocalEvent::SocketConversationHistory { .. } => "socket_conversation_history",
            LocalEvent::SocketOnlineUsers { .. } => "socket_online_users",
            LocalEvent::SocketError { .. } => "socket_error",
        }
    }
}
