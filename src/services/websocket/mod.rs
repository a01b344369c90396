/*!
 * WebSocket 实时聊天服务
 *
 * 客户端通过以下 URL 连接：
 * ```text
 * ws://host/api/v1/ws?token=<access_token>
 * ```
 *
 * ## 帧格式
 *
 * 双向均为 JSON 文本帧：
 * ```json
 * {"event": "send_message", "data": {"conversation_id": "class-7", "content": "hi"}}
 * {"event": "new_message", "data": {"id": 1, "conversation_id": "class-7", ...}}
 * ```
 *
 * 只有会话参与者可以加入会话（规则见 `access`），加入后才能收发消息、
 * 查看历史和输入状态。命令出错时只向发送者回复 `error` 事件，不会关闭连接。
 */

pub mod access;

use std::collections::HashSet;
use std::sync::Arc;

use actix_ws::Message as WsFrame;
use dashmap::DashMap;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::models::messages::entities::NewMessage;
use crate::models::realtime::{ClientCommand, MAX_HISTORY_LIMIT, OnlineUser, ServerEvent};
use crate::models::users::entities::User;
use crate::storage::Storage;

/// 全局聊天中心
static CHAT_HUB: Lazy<ChatHub> = Lazy::new(ChatHub::new);

/// 每个用户的推送缓冲
const CHANNEL_CAPACITY: usize = 100;

/// 服务端 ping 间隔（秒）
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// 聊天中心：在线连接、会话房间与显示名
pub struct ChatHub {
    /// 用户 ID -> 广播发送器（同一用户的多个连接共享）
    connections: DashMap<i64, broadcast::Sender<ServerEvent>>,
    /// 会话 ID -> 成员
    rooms: DashMap<String, HashSet<i64>>,
    /// 用户 ID -> 显示名
    names: DashMap<i64, String>,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// 获取全局实例
    pub fn get() -> &'static Self {
        &CHAT_HUB
    }

    /// 注册用户连接，用户首次上线时通知其他在线用户
    pub fn register(&self, user: &User) -> broadcast::Receiver<ServerEvent> {
        let (rx, first_connection) = {
            let entry = self.connections.entry(user.id).or_insert_with(|| {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                tx
            });
            (entry.subscribe(), entry.receiver_count() == 1)
        };
        self.names.insert(user.id, user.full_name());

        if first_connection {
            info!("User {} is online", user.id);
            self.broadcast_except(
                user.id,
                ServerEvent::UserOnline(OnlineUser {
                    user_id: user.id,
                    full_name: user.full_name(),
                }),
            );
        }
        rx
    }

    /// 移除用户连接（接收端已释放后调用），最后一个连接断开时离开全部房间并通知下线
    pub fn unregister(&self, user_id: i64) {
        let removed = self
            .connections
            .remove_if(&user_id, |_, tx| tx.receiver_count() == 0)
            .is_some();
        if !removed {
            return;
        }

        self.names.remove(&user_id);
        for mut room in self.rooms.iter_mut() {
            room.value_mut().remove(&user_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());

        info!("User {} is offline", user_id);
        self.broadcast_except(user_id, ServerEvent::UserOffline { user_id });
    }

    /// 向指定用户的全部连接推送
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) -> bool {
        if let Some(sender) = self.connections.get(&user_id) {
            sender.send(event).is_ok()
        } else {
            false
        }
    }

    /// 检查用户是否在线
    pub fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .get(&user_id)
            .is_some_and(|s| s.receiver_count() > 0)
    }

    /// 当前在线用户列表
    pub fn online_users(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .names
            .iter()
            .filter(|entry| self.is_online(*entry.key()))
            .map(|entry| OnlineUser {
                user_id: *entry.key(),
                full_name: entry.value().clone(),
            })
            .collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    pub fn join_room(&self, conversation_id: &str, user_id: i64) {
        self.rooms
            .entry(conversation_id.to_string())
            .or_default()
            .insert(user_id);
    }

    pub fn leave_room(&self, conversation_id: &str, user_id: i64) {
        if let Some(mut members) = self.rooms.get_mut(conversation_id) {
            members.remove(&user_id);
        }
        self.rooms
            .remove_if(conversation_id, |_, members| members.is_empty());
    }

    pub fn is_member(&self, conversation_id: &str, user_id: i64) -> bool {
        self.rooms
            .get(conversation_id)
            .is_some_and(|members| members.contains(&user_id))
    }

    fn room_members(&self, conversation_id: &str) -> Vec<i64> {
        self.rooms
            .get(conversation_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 向房间成员推送，`except` 指定的用户除外
    fn send_to_room(&self, conversation_id: &str, event: ServerEvent, except: Option<i64>) {
        for user_id in self.room_members(conversation_id) {
            if Some(user_id) != except {
                self.send_to_user(user_id, event.clone());
            }
        }
    }

    fn broadcast_except(&self, except: i64, event: ServerEvent) {
        let targets: Vec<i64> = self
            .connections
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| *id != except)
            .collect();
        for user_id in targets {
            self.send_to_user(user_id, event.clone());
        }
    }

    fn display_name(&self, user: &User) -> String {
        self.names
            .get(&user.id)
            .map(|name| name.value().clone())
            .unwrap_or_else(|| user.full_name())
    }

    /// 处理客户端命令
    ///
    /// 广播类结果通过各用户的推送通道发送；返回值为只回复给当前连接的事件。
    pub async fn handle_command(
        &self,
        storage: &Arc<dyn Storage>,
        user: &User,
        command: ClientCommand,
    ) -> Option<ServerEvent> {
        match command {
            ClientCommand::JoinConversation { conversation_id } => {
                match access::can_access(storage, user, &conversation_id).await {
                    Ok(true) => {
                        self.join_room(&conversation_id, user.id);
                        debug!("User {} joined conversation {}", user.id, conversation_id);
                        None
                    }
                    Ok(false) => {
                        warn!(
                            "User {} denied access to conversation {}",
                            user.id, conversation_id
                        );
                        Some(error_event("You are not a participant of this conversation"))
                    }
                    Err(e) => {
                        error!("Failed to check access to {}: {}", conversation_id, e);
                        Some(error_event("Failed to join conversation"))
                    }
                }
            }
            ClientCommand::LeaveConversation { conversation_id } => {
                self.leave_room(&conversation_id, user.id);
                debug!("User {} left conversation {}", user.id, conversation_id);
                None
            }
            ClientCommand::SendMessage {
                conversation_id,
                content,
                message_type,
                reply_to,
            } => {
                if !self.is_member(&conversation_id, user.id) {
                    return Some(error_event("Join the conversation before sending messages"));
                }
                let content = content.trim().to_string();
                if content.is_empty() {
                    return Some(error_event("Message content must not be empty"));
                }

                let new_message = NewMessage {
                    conversation_id: conversation_id.clone(),
                    sender_id: user.id,
                    content,
                    message_type,
                    reply_to,
                };
                match storage.create_message(new_message).await {
                    Ok(message) => {
                        self.send_to_room(&conversation_id, ServerEvent::NewMessage(message), None);
                        None
                    }
                    Err(e) => {
                        error!("Failed to persist message from user {}: {}", user.id, e);
                        Some(error_event("Failed to send message"))
                    }
                }
            }
            ClientCommand::MarkAsRead {
                message_id,
                conversation_id,
            } => {
                if !self.is_member(&conversation_id, user.id) {
                    return Some(error_event("Join the conversation first"));
                }
                match storage.get_message_by_id(message_id).await {
                    Ok(Some(message)) if message.conversation_id == conversation_id => {}
                    Ok(_) => return Some(error_event("Message not found")),
                    Err(e) => {
                        error!("Failed to load message {}: {}", message_id, e);
                        return Some(error_event("Failed to mark message as read"));
                    }
                }
                match storage.mark_message_read(message_id, user.id).await {
                    Ok(read_at) => {
                        self.send_to_room(
                            &conversation_id,
                            ServerEvent::MessageRead {
                                message_id,
                                conversation_id: conversation_id.clone(),
                                user_id: user.id,
                                read_at,
                            },
                            None,
                        );
                        None
                    }
                    Err(e) => {
                        error!("Failed to mark message {} as read: {}", message_id, e);
                        Some(error_event("Failed to mark message as read"))
                    }
                }
            }
            ClientCommand::Typing { conversation_id } => {
                if self.is_member(&conversation_id, user.id) {
                    let event = ServerEvent::UserTyping {
                        conversation_id: conversation_id.clone(),
                        user_id: user.id,
                        full_name: self.display_name(user),
                    };
                    self.send_to_room(&conversation_id, event, Some(user.id));
                }
                None
            }
            ClientCommand::StopTyping { conversation_id } => {
                if self.is_member(&conversation_id, user.id) {
                    let event = ServerEvent::UserStopTyping {
                        conversation_id: conversation_id.clone(),
                        user_id: user.id,
                    };
                    self.send_to_room(&conversation_id, event, Some(user.id));
                }
                None
            }
            ClientCommand::EditMessage {
                message_id,
                content,
            } => {
                let content = content.trim().to_string();
                if content.is_empty() {
                    return Some(error_event("Message content must not be empty"));
                }
                if let Err(reply) = self.check_sender(storage, user, message_id).await {
                    return Some(reply);
                }
                match storage.edit_message(message_id, &content).await {
                    Ok(Some(message)) => {
                        let conversation_id = message.conversation_id.clone();
                        self.send_to_room(&conversation_id, ServerEvent::MessageEdited(message), None);
                        None
                    }
                    Ok(None) => Some(error_event("Message not found")),
                    Err(e) => {
                        error!("Failed to edit message {}: {}", message_id, e);
                        Some(error_event("Failed to edit message"))
                    }
                }
            }
            ClientCommand::DeleteMessage { message_id } => {
                let conversation_id = match self.check_sender(storage, user, message_id).await {
                    Ok(conversation_id) => conversation_id,
                    Err(reply) => return Some(reply),
                };
                match storage.delete_message(message_id).await {
                    Ok(true) => {
                        self.send_to_room(
                            &conversation_id,
                            ServerEvent::MessageDeleted {
                                message_id,
                                conversation_id: conversation_id.clone(),
                            },
                            None,
                        );
                        None
                    }
                    Ok(false) => Some(error_event("Message not found")),
                    Err(e) => {
                        error!("Failed to delete message {}: {}", message_id, e);
                        Some(error_event("Failed to delete message"))
                    }
                }
            }
            ClientCommand::GetConversationHistory {
                conversation_id,
                limit,
                before,
            } => {
                if !self.is_member(&conversation_id, user.id) {
                    return Some(error_event("Join the conversation first"));
                }
                let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
                match storage
                    .list_conversation_messages(&conversation_id, limit, before)
                    .await
                {
                    Ok(messages) => Some(ServerEvent::ConversationHistory {
                        conversation_id,
                        messages,
                    }),
                    Err(e) => {
                        error!("Failed to load history for {}: {}", conversation_id, e);
                        Some(error_event("Failed to load conversation history"))
                    }
                }
            }
            ClientCommand::GetOnlineUsers => Some(ServerEvent::OnlineUsers {
                users: self.online_users(),
            }),
            ClientCommand::Ping => Some(ServerEvent::Pong),
        }
    }

    /// 只有发送者可以修改消息，返回消息所在会话
    async fn check_sender(
        &self,
        storage: &Arc<dyn Storage>,
        user: &User,
        message_id: i64,
    ) -> Result<String, ServerEvent> {
        match storage.get_message_by_id(message_id).await {
            Ok(Some(message)) if message.deleted_at.is_some() => {
                Err(error_event("Message not found"))
            }
            Ok(Some(message)) if message.sender_id != user.id => {
                Err(error_event("Only the sender can modify this message"))
            }
            Ok(Some(message)) => Ok(message.conversation_id),
            Ok(None) => Err(error_event("Message not found")),
            Err(e) => {
                error!("Failed to load message {}: {}", message_id, e);
                Err(error_event("Failed to load message"))
            }
        }
    }
}

fn error_event(message: &str) -> ServerEvent {
    ServerEvent::Error {
        message: message.to_string(),
    }
}

async fn send_event(session: &mut actix_ws::Session, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => session.text(json).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.name(), e);
            true
        }
    }
}

/// WebSocket 服务
pub struct WebSocketService;

impl WebSocketService {
    /// 处理 WebSocket 连接
    pub async fn handle_connection(
        storage: Arc<dyn Storage>,
        user: User,
        mut session: actix_ws::Session,
        mut stream: actix_ws::MessageStream,
    ) {
        let user_id = user.id;
        info!("WebSocket connected for user: {}", user_id);

        let hub = ChatHub::get();
        let mut rx = hub.register(&user);

        let heartbeat_interval = std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS);
        let mut heartbeat = tokio::time::interval(heartbeat_interval);

        loop {
            tokio::select! {
                // 处理来自客户端的消息
                msg = stream.next() => {
                    match msg {
                        Some(Ok(WsFrame::Text(text))) => {
                            let reply = match serde_json::from_str::<ClientCommand>(&text) {
                                Ok(command) => hub.handle_command(&storage, &user, command).await,
                                Err(e) => {
                                    debug!("Invalid frame from user {}: {}", user_id, e);
                                    Some(error_event("Invalid frame"))
                                }
                            };
                            if let Some(event) = reply
                                && !send_event(&mut session, &event).await
                            {
                                break;
                            }
                        }
                        Some(Ok(WsFrame::Ping(data))) => {
                            if session.pong(&data).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsFrame::Close(_))) | None => {
                            info!("WebSocket closed for user: {}", user_id);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for user {}: {:?}", user_id, e);
                            break;
                        }
                        _ => {}
                    }
                }

                // 处理来自聊天中心的推送
                msg = rx.recv() => {
                    match msg {
                        Ok(event) => {
                            if !send_event(&mut session, &event).await {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("WebSocket for user {} lagged by {} messages", user_id, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }

                // 心跳
                _ = heartbeat.tick() => {
                    if session.ping(b"").await.is_err() {
                        break;
                    }
                }
            }
        }

        // 先释放接收端，再清理连接
        drop(rx);
        hub.unregister(user_id);
        let _ = session.close(None).await;
        info!("WebSocket disconnected for user: {}", user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::access::{class_conversation_id, direct_conversation_id};
    use super::*;
    use crate::models::classes::requests::EnsureClassRequest;
    use crate::models::users::entities::UserRole;
    use crate::services::classes::ClassResolver;
    use crate::services::classes::resolver::tests::{create_user, meeting_config, memory_storage};
    use tokio::sync::broadcast::error::TryRecvError;

    fn drain(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    fn join(conversation_id: &str) -> ClientCommand {
        ClientCommand::JoinConversation {
            conversation_id: conversation_id.to_string(),
        }
    }

    fn send(conversation_id: &str, content: &str) -> ClientCommand {
        ClientCommand::SendMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            message_type: Default::default(),
            reply_to: None,
        }
    }

    fn history(conversation_id: &str, limit: u64) -> ClientCommand {
        ClientCommand::GetConversationHistory {
            conversation_id: conversation_id.to_string(),
            limit,
            before: None,
        }
    }

    #[tokio::test]
    async fn test_presence_on_first_and_last_connection() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, Some("Alice")).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, Some("Bob")).await;

        let mut alice_rx = hub.register(&alice);
        let bob_rx = hub.register(&bob);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::UserOnline(OnlineUser {
                user_id: bob.id,
                full_name: "Bob".to_string(),
            })]
        );

        // 第二个连接不会重复通知
        let bob_rx2 = hub.register(&bob);
        assert!(drain(&mut alice_rx).is_empty());

        drop(bob_rx);
        hub.unregister(bob.id);
        assert!(drain(&mut alice_rx).is_empty());
        assert!(hub.is_online(bob.id));

        drop(bob_rx2);
        hub.unregister(bob.id);
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::UserOffline { user_id: bob.id }]
        );
        assert!(!hub.is_online(bob.id));
    }

    #[tokio::test]
    async fn test_typing_relayed_to_others_only() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, Some("Alice")).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, Some("Bob")).await;
        let dm = direct_conversation_id(alice.id, bob.id);

        let mut alice_rx = hub.register(&alice);
        let mut bob_rx = hub.register(&bob);
        hub.handle_command(&storage, &alice, join(&dm)).await;
        hub.handle_command(&storage, &bob, join(&dm)).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let reply = hub
            .handle_command(
                &storage,
                &alice,
                ClientCommand::Typing {
                    conversation_id: dm.clone(),
                },
            )
            .await;
        assert!(reply.is_none());
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::UserTyping {
                conversation_id: dm.clone(),
                user_id: alice.id,
                full_name: "Alice".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_send_requires_membership_and_reaches_room() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, None).await;
        let dm = direct_conversation_id(alice.id, bob.id);

        let mut alice_rx = hub.register(&alice);
        let mut bob_rx = hub.register(&bob);

        let reply = hub.handle_command(&storage, &alice, send(&dm, "hello")).await;
        assert!(matches!(reply, Some(ServerEvent::Error { .. })));

        hub.handle_command(&storage, &alice, join(&dm)).await;
        hub.handle_command(&storage, &bob, join(&dm)).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let reply = hub.handle_command(&storage, &alice, send(&dm, "hello")).await;
        assert!(reply.is_none());
        let alice_events = drain(&mut alice_rx);
        let bob_events = drain(&mut bob_rx);
        assert_eq!(alice_events.len(), 1);
        assert_eq!(alice_events, bob_events);
        match &bob_events[0] {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.sender_id, alice.id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_outsider_cannot_join_or_read_direct_conversation() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, None).await;
        let mallory = create_user(&storage, "mallory", UserRole::Student, None).await;
        let dm = direct_conversation_id(alice.id, bob.id);

        let _alice_rx = hub.register(&alice);
        let mut mallory_rx = hub.register(&mallory);
        hub.handle_command(&storage, &alice, join(&dm)).await;
        hub.handle_command(&storage, &alice, send(&dm, "secret")).await;

        let read = hub.handle_command(&storage, &mallory, history(&dm, 10)).await;
        assert!(matches!(read, Some(ServerEvent::Error { .. })));

        let joined = hub.handle_command(&storage, &mallory, join(&dm)).await;
        assert!(matches!(joined, Some(ServerEvent::Error { .. })));
        assert!(!hub.is_member(&dm, mallory.id));

        // 不在会话中的用户收不到新消息
        drain(&mut mallory_rx);
        hub.handle_command(&storage, &alice, send(&dm, "secret2")).await;
        assert!(
            drain(&mut mallory_rx)
                .iter()
                .all(|event| !matches!(event, ServerEvent::NewMessage(_)))
        );

        // 无法识别的会话 ID 一律拒绝
        let unknown = hub.handle_command(&storage, &mallory, join("private-c")).await;
        assert!(matches!(unknown, Some(ServerEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_class_conversation_follows_class_membership() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let outsider = create_user(&storage, "student02", UserRole::Student, None).await;
        let admin = create_user(&storage, "admin01", UserRole::Admin, None).await;
        let class = ClassResolver::new(&storage, &meeting_config())
            .ensure_class(EnsureClassRequest {
                tutor_id: tutor.id,
                student_id: student.id,
                subject: "Physics".to_string(),
                slot: None,
            })
            .await
            .unwrap();
        let room = class_conversation_id(class.id);

        for member in [&tutor, &student, &admin] {
            let reply = hub.handle_command(&storage, member, join(&room)).await;
            assert!(reply.is_none());
            assert!(hub.is_member(&room, member.id));
        }

        let denied = hub.handle_command(&storage, &outsider, join(&room)).await;
        assert!(matches!(denied, Some(ServerEvent::Error { .. })));

        let missing = hub
            .handle_command(&storage, &tutor, join(&class_conversation_id(class.id + 100)))
            .await;
        assert!(matches!(missing, Some(ServerEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_only_sender_can_edit_or_delete() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, None).await;
        let dm = direct_conversation_id(alice.id, bob.id);
        let mut bob_rx = hub.register(&bob);
        let _alice_rx = hub.register(&alice);

        hub.handle_command(&storage, &alice, join(&dm)).await;
        hub.handle_command(&storage, &bob, join(&dm)).await;
        hub.handle_command(&storage, &alice, send(&dm, "draft")).await;
        let message_id = match drain(&mut bob_rx).pop() {
            Some(ServerEvent::NewMessage(message)) => message.id,
            other => panic!("unexpected event: {other:?}"),
        };

        let denied = hub
            .handle_command(
                &storage,
                &bob,
                ClientCommand::EditMessage {
                    message_id,
                    content: "hijack".to_string(),
                },
            )
            .await;
        assert!(matches!(denied, Some(ServerEvent::Error { .. })));

        hub.handle_command(
            &storage,
            &alice,
            ClientCommand::EditMessage {
                message_id,
                content: "final".to_string(),
            },
        )
        .await;
        match drain(&mut bob_rx).pop() {
            Some(ServerEvent::MessageEdited(message)) => {
                assert_eq!(message.content, "final");
                assert!(message.edited_at.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        hub.handle_command(&storage, &alice, ClientCommand::DeleteMessage { message_id })
            .await;
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::MessageDeleted {
                message_id,
                conversation_id: dm.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn test_history_and_ping_reply_to_sender() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, Some("Alice")).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, None).await;
        let dm = direct_conversation_id(alice.id, bob.id);
        let _rx = hub.register(&alice);
        hub.handle_command(&storage, &alice, join(&dm)).await;

        for i in 0..3 {
            hub.handle_command(&storage, &alice, send(&dm, &format!("m{i}")))
                .await;
        }

        match hub.handle_command(&storage, &alice, history(&dm, 2)).await {
            Some(ServerEvent::ConversationHistory { messages, .. }) => {
                let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
                assert_eq!(contents, vec!["m1", "m2"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let online = hub
            .handle_command(&storage, &alice, ClientCommand::GetOnlineUsers)
            .await;
        assert_eq!(
            online,
            Some(ServerEvent::OnlineUsers {
                users: vec![OnlineUser {
                    user_id: alice.id,
                    full_name: "Alice".to_string(),
                }],
            })
        );

        let pong = hub.handle_command(&storage, &alice, ClientCommand::Ping).await;
        assert_eq!(pong, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_rooms() {
        let storage = memory_storage().await;
        let hub = ChatHub::new();
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Tutor, None).await;
        let dm = direct_conversation_id(alice.id, bob.id);
        let rx = hub.register(&alice);
        hub.handle_command(&storage, &alice, join(&dm)).await;
        assert!(hub.is_member(&dm, alice.id));

        drop(rx);
        hub.unregister(alice.id);
        assert!(!hub.is_member(&dm, alice.id));
    }
}
