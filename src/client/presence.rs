//! 在线状态与输入状态聚合
//!
//! 订阅本地事件总线，维护在线用户集合和每个会话的“正在输入”列表，
//! 通过 `watch` 通道把快照推给界面。会话的输入列表在最后一次变化
//! 之后超过 `typing_expiry` 会被整体清空。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::realtime::{EventBus, LocalEvent, RealtimeClient};
use crate::config::RealtimeConfig;

#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub typing_expiry: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            typing_expiry: Duration::from_secs(5),
        }
    }
}

impl From<&RealtimeConfig> for PresenceSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            typing_expiry: Duration::from_millis(config.typing_expiry_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: i64,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// user_id -> 显示名
    pub online: BTreeMap<i64, String>,
    /// conversation_id -> 正在输入的用户
    pub typing: HashMap<String, Vec<TypingUser>>,
}

impl PresenceSnapshot {
    pub fn is_online(&self, user_id: i64) -> bool {
        self.online.contains_key(&user_id)
    }

    /// 某个会话中除自己以外正在输入的用户名
    pub fn typing_in(&self, conversation_id: &str, own_user_id: i64) -> Vec<String> {
        self.typing
            .get(conversation_id)
            .map(|users| {
                users
                    .iter()
                    .filter(|u| u.user_id != own_user_id)
                    .map(|u| u.full_name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 生成输入提示文本
pub fn typing_indicator(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [name] => Some(format!("{name} is typing...")),
        [a, b] => Some(format!("{a} and {b} are typing...")),
        _ => Some(format!("{} people are typing...", names.len())),
    }
}

#[derive(Debug, Default)]
struct PresenceState {
    snapshot: PresenceSnapshot,
    touched: HashMap<String, Instant>,
}

impl PresenceState {
    /// 应用事件，返回快照是否变化
    fn apply(&mut self, event: &LocalEvent, now: Instant) -> bool {
        match event {
            LocalEvent::SocketUserOnline(user) => {
                self.snapshot
                    .online
                    .insert(user.user_id, user.full_name.clone());
                true
            }
            LocalEvent::SocketUserOffline { user_id } => {
                self.snapshot.online.remove(user_id).is_some()
            }
            LocalEvent::SocketOnlineUsers { users } => {
                self.snapshot.online = users
                    .iter()
                    .map(|u| (u.user_id, u.full_name.clone()))
                    .collect();
                true
            }
            LocalEvent::SocketUserTyping {
                conversation_id,
                user_id,
                full_name,
            } => {
                let users = self
                    .snapshot
                    .typing
                    .entry(conversation_id.clone())
                    .or_default();
                match users.iter_mut().find(|u| u.user_id == *user_id) {
                    Some(existing) => existing.full_name = full_name.clone(),
                    None => users.push(TypingUser {
                        user_id: *user_id,
                        full_name: full_name.clone(),
                    }),
                }
                self.touched.insert(conversation_id.clone(), now);
                true
            }
            LocalEvent::SocketUserStopTyping {
                conversation_id,
                user_id,
            } => {
                let Some(users) = self.snapshot.typing.get_mut(conversation_id) else {
                    return false;
                };
                let before = users.len();
                users.retain(|u| u.user_id != *user_id);
                if users.len() == before {
                    return false;
                }
                if users.is_empty() {
                    self.snapshot.typing.remove(conversation_id);
                    self.touched.remove(conversation_id);
                } else {
                    self.touched.insert(conversation_id.clone(), now);
                }
                true
            }
            LocalEvent::ConnectionStatus { connected: false } => {
                // 断线后的状态不可信
                let changed =
                    !self.snapshot.online.is_empty() || !self.snapshot.typing.is_empty();
                self.snapshot = PresenceSnapshot::default();
                self.touched.clear();
                changed
            }
            _ => false,
        }
    }

    /// 清空超时的输入列表
    fn expire(&mut self, now: Instant, expiry: Duration) -> bool {
        let expired: Vec<String> = self
            .touched
            .iter()
            .filter(|(_, at)| **at + expiry <= now)
            .map(|(conversation_id, _)| conversation_id.clone())
            .collect();
        for conversation_id in &expired {
            self.touched.remove(conversation_id);
            self.snapshot.typing.remove(conversation_id);
        }
        !expired.is_empty()
    }

    fn next_expiry(&self, expiry: Duration) -> Option<Instant> {
        self.touched.values().min().map(|at| *at + expiry)
    }
}

pub struct PresenceTracker {
    snapshot: watch::Receiver<PresenceSnapshot>,
    task: JoinHandle<()>,
}

impl PresenceTracker {
    /// 只订阅事件总线
    pub fn spawn(bus: &EventBus, settings: PresenceSettings) -> Self {
        Self::start(bus, settings, None)
    }

    /// 挂载到实时客户端：立即请求在线用户，之后每次连上都重新请求
    pub fn mount(client: Arc<RealtimeClient>, settings: PresenceSettings) -> Self {
        let tracker = Self::start(client.bus(), settings, Some(client.clone()));
        client.get_online_users();
        tracker
    }

    fn start(
        bus: &EventBus,
        settings: PresenceSettings,
        client: Option<Arc<RealtimeClient>>,
    ) -> Self {
        let (tx, rx) = watch::channel(PresenceSnapshot::default());
        let events = bus.subscribe();
        let task = tokio::spawn(track(events, tx, settings, client));
        Self { snapshot: rx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshot.borrow().clone()
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn track(
    mut events: broadcast::Receiver<LocalEvent>,
    tx: watch::Sender<PresenceSnapshot>,
    settings: PresenceSettings,
    client: Option<Arc<RealtimeClient>>,
) {
    let mut state = PresenceState::default();
    loop {
        let deadline = state.next_expiry(settings.typing_expiry);
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let (LocalEvent::ConnectionStatus { connected: true }, Some(client)) =
                        (&event, &client)
                    {
                        client.get_online_users();
                    }
                    if state.apply(&event, Instant::now()) {
                        tx.send_replace(state.snapshot.clone());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Presence tracker lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, presence tracker stopping");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if state.expire(Instant::now(), settings.typing_expiry) {
                    tx.send_replace(state.snapshot.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::realtime::tests::{FakeConnector, client_with};
    use crate::models::realtime::{ClientCommand, OnlineUser, ServerEvent};

    fn typing(conversation_id: &str, user_id: i64, name: &str) -> LocalEvent {
        LocalEvent::SocketUserTyping {
            conversation_id: conversation_id.to_string(),
            user_id,
            full_name: name.to_string(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_typing_indicator_text() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(typing_indicator(&[]), None);
        assert_eq!(
            typing_indicator(&names(&["Ada"])).as_deref(),
            Some("Ada is typing...")
        );
        assert_eq!(
            typing_indicator(&names(&["Ada", "Bob"])).as_deref(),
            Some("Ada and Bob are typing...")
        );
        assert_eq!(
            typing_indicator(&names(&["Ada", "Bob", "Cy"])).as_deref(),
            Some("3 people are typing...")
        );
    }

    #[test]
    fn test_typing_list_add_rename_remove() {
        let mut state = PresenceState::default();
        let now = Instant::now();
        assert!(state.apply(&typing("c1", 2, "Ada"), now));
        assert!(state.apply(&typing("c1", 2, "Ada L."), now));
        assert!(state.apply(&typing("c1", 3, "Bob"), now));
        assert!(state.apply(&typing("c2", 4, "Cy"), now));

        assert_eq!(state.snapshot.typing_in("c1", 1), vec!["Ada L.", "Bob"]);
        // 自己不显示
        assert_eq!(state.snapshot.typing_in("c1", 3), vec!["Ada L."]);

        let stop = LocalEvent::SocketUserStopTyping {
            conversation_id: "c1".to_string(),
            user_id: 2,
        };
        assert!(state.apply(&stop, now));
        assert!(!state.apply(&stop, now));
        assert_eq!(state.snapshot.typing_in("c1", 1), vec!["Bob"]);
        assert_eq!(state.snapshot.typing_in("c2", 1), vec!["Cy"]);
    }

    #[test]
    fn test_online_set() {
        let mut state = PresenceState::default();
        let now = Instant::now();
        state.apply(
            &LocalEvent::SocketOnlineUsers {
                users: vec![
                    OnlineUser {
                        user_id: 1,
                        full_name: "Ada".to_string(),
                    },
                    OnlineUser {
                        user_id: 2,
                        full_name: "Bob".to_string(),
                    },
                ],
            },
            now,
        );
        state.apply(&LocalEvent::SocketUserOffline { user_id: 1 }, now);
        state.apply(
            &LocalEvent::SocketUserOnline(OnlineUser {
                user_id: 3,
                full_name: "Cy".to_string(),
            }),
            now,
        );
        assert!(!state.snapshot.is_online(1));
        assert!(state.snapshot.is_online(2));
        assert!(state.snapshot.is_online(3));

        assert!(state.apply(&LocalEvent::ConnectionStatus { connected: false }, now));
        assert!(state.snapshot.online.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_cleared_after_expiry() {
        let bus = EventBus::new(16);
        let tracker = PresenceTracker::spawn(&bus, PresenceSettings::default());
        let mut updates = tracker.subscribe();

        bus.publish(typing("c1", 2, "Ada"));
        settle().await;
        assert_eq!(tracker.snapshot().typing_in("c1", 1), vec!["Ada"]);
        updates.mark_unchanged();

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(tracker.snapshot().typing_in("c1", 1), vec!["Ada"]);
        assert!(!updates.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(tracker.snapshot().typing.is_empty());
        assert!(updates.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_typing_extends_expiry() {
        let bus = EventBus::new(16);
        let tracker = PresenceTracker::spawn(&bus, PresenceSettings::default());

        bus.publish(typing("c1", 2, "Ada"));
        settle().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        bus.publish(typing("c1", 3, "Bob"));
        settle().await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(tracker.snapshot().typing_in("c1", 1), vec!["Ada", "Bob"]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(tracker.snapshot().typing_in("c1", 1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_requests_online_users_on_connect() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let client = Arc::new(client_with(connector.clone()));
        let tracker = PresenceTracker::mount(client.clone(), PresenceSettings::default());

        client.connect("token");
        settle().await;
        settle().await;

        let sent = link.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![ClientCommand::GetOnlineUsers]);

        link.events
            .send(Ok(ServerEvent::OnlineUsers {
                users: vec![OnlineUser {
                    user_id: 9,
                    full_name: "Tutor".to_string(),
                }],
            }))
            .unwrap();
        settle().await;
        assert!(tracker.snapshot().is_online(9));

        client.disconnect().await;
        settle().await;
        assert!(tracker.snapshot().online.is_empty());
    }
}
