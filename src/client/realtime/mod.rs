//! 实时通信客户端
//!
//! 维护与服务端的 WebSocket 连接，把服务端事件转发到本地 [`EventBus`]，
//! 并提供发送命令的方法。连接失败时按 [`ReconnectPolicy`] 指数退避重试，
//! 超过次数后发布最终的断开状态并停止；连接意外断开时重新进入重连流程。

pub mod backoff;
pub mod bus;
pub mod events;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use bus::EventBus;
pub use events::LocalEvent;
pub use transport::{Connector, Transport, WsConnector};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::session_store::{SessionStore, TokenProvider, resolve_token};
use crate::config::RealtimeConfig;
use crate::errors::Kk360Error;
use crate::models::messages::entities::MessageType;
use crate::models::realtime::{ClientCommand, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub server_url: String,
    pub reconnect: ReconnectPolicy,
    pub event_buffer: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080".to_string(),
            reconnect: ReconnectPolicy::default(),
            event_buffer: 256,
        }
    }
}

impl From<&RealtimeConfig> for RealtimeSettings {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            reconnect: ReconnectPolicy::from(config),
            event_buffer: config.event_buffer,
        }
    }
}

#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    connecting: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
}

impl LinkState {
    fn attach(&self, tx: mpsc::UnboundedSender<ClientCommand>) {
        if let Ok(mut guard) = self.outbound.lock() {
            *guard = Some(tx);
        }
        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
    }

    /// 连接断开，`retrying` 表示仍在重连
    fn detach(&self, retrying: bool) {
        if let Ok(mut guard) = self.outbound.lock() {
            guard.take();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.connecting.store(retrying, Ordering::SeqCst);
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<ClientCommand>> {
        self.outbound.lock().ok().and_then(|guard| guard.clone())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LinkEnd {
    Stopped,
    Lost,
}

pub struct RealtimeClient {
    connector: Arc<dyn Connector>,
    bus: EventBus,
    settings: RealtimeSettings,
    state: Arc<LinkState>,
    supervisor: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl RealtimeClient {
    /// 使用 WebSocket 连接器创建客户端
    pub fn new(settings: RealtimeSettings) -> Self {
        let connector = Arc::new(WsConnector::new(settings.server_url.clone()));
        Self::with_connector(connector, settings)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, settings: RealtimeSettings) -> Self {
        Self {
            connector,
            bus: EventBus::new(settings.event_buffer),
            settings,
            state: Arc::new(LinkState::default()),
            supervisor: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// 建立连接。已连接或正在连接时不做任何事，返回 `false`
    pub fn connect(&self, token: impl Into<String>) -> bool {
        if self.is_connected() || self.state.connecting.swap(true, Ordering::SeqCst) {
            debug!("Realtime client already connected or connecting");
            return false;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(
            self.connector.clone(),
            self.bus.clone(),
            self.settings.reconnect.clone(),
            self.state.clone(),
            token.into(),
            stop_rx,
        ));
        if let Ok(mut guard) = self.supervisor.lock() {
            // 旧的监督任务已经结束，直接替换
            *guard = Some((stop_tx, handle));
        }
        true
    }

    /// 从会话存储（或后备来源）取 token 后连接
    pub async fn connect_with_session(
        &self,
        store: &dyn SessionStore,
        fallback: Option<&dyn TokenProvider>,
    ) -> bool {
        match resolve_token(store, fallback).await {
            Some(token) => self.connect(token),
            None => {
                warn!("No access token available, realtime connection skipped");
                false
            }
        }
    }

    /// 主动断开，可重复调用。只有断开前处于已连接状态才会发布断开事件
    pub async fn disconnect(&self) {
        let running = self.supervisor.lock().ok().and_then(|mut guard| guard.take());
        let Some((stop, handle)) = running else {
            return;
        };
        let _ = stop.send(());
        if let Err(e) = handle.await {
            debug!("Realtime supervisor ended abnormally: {}", e);
        }
        self.state.detach(false);
    }

    fn dispatch(&self, command: ClientCommand) -> bool {
        if !self.is_connected() {
            debug!("Not connected, dropping command {:?}", command);
            return false;
        }
        match self.state.sender() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    pub fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        message_type: MessageType,
        reply_to: Option<i64>,
    ) -> bool {
        self.dispatch(ClientCommand::SendMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            message_type,
            reply_to,
        })
    }

    pub fn mark_as_read(&self, message_id: i64, conversation_id: &str) -> bool {
        self.dispatch(ClientCommand::MarkAsRead {
            message_id,
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn start_typing(&self, conversation_id: &str) -> bool {
        self.dispatch(ClientCommand::Typing {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn stop_typing(&self, conversation_id: &str) -> bool {
        self.dispatch(ClientCommand::StopTyping {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn edit_message(&self, message_id: i64, content: &str) -> bool {
        self.dispatch(ClientCommand::EditMessage {
            message_id,
            content: content.to_string(),
        })
    }

    pub fn delete_message(&self, message_id: i64) -> bool {
        self.dispatch(ClientCommand::DeleteMessage { message_id })
    }

    pub fn join_conversation(&self, conversation_id: &str) -> bool {
        self.dispatch(ClientCommand::JoinConversation {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        self.dispatch(ClientCommand::LeaveConversation {
            conversation_id: conversation_id.to_string(),
        })
    }

    pub fn get_conversation_history(
        &self,
        conversation_id: &str,
        limit: Option<u64>,
        before: Option<i64>,
    ) -> bool {
        self.dispatch(ClientCommand::GetConversationHistory {
            conversation_id: conversation_id.to_string(),
            limit: limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT),
            before,
        })
    }

    pub fn get_online_users(&self) -> bool {
        self.dispatch(ClientCommand::GetOnlineUsers)
    }
}

async fn supervise(
    connector: Arc<dyn Connector>,
    bus: EventBus,
    policy: ReconnectPolicy,
    state: Arc<LinkState>,
    token: String,
    mut stop: oneshot::Receiver<()>,
) {
    let mut failures = 0u32;
    loop {
        let attempt = tokio::select! {
            _ = &mut stop => break,
            result = connector.connect(&token) => result,
        };

        match attempt {
            Ok(mut transport) => {
                failures = 0;
                let (tx, mut rx) = mpsc::unbounded_channel();
                state.attach(tx);
                info!("Realtime connection established");
                bus.publish(LocalEvent::ConnectionStatus { connected: true });

                let end = run_link(transport.as_mut(), &mut rx, &mut stop, &bus).await;
                state.detach(end == LinkEnd::Lost);
                bus.publish(LocalEvent::ConnectionStatus { connected: false });
                if end == LinkEnd::Stopped {
                    info!("Realtime connection closed");
                    break;
                }
                warn!("Realtime connection lost, reconnecting");
            }
            Err(e) => {
                failures += 1;
                let Some(delay) = policy.delay_for(failures) else {
                    error!(
                        "Realtime connection failed {} times, giving up: {}",
                        failures, e
                    );
                    state.detach(false);
                    bus.publish(LocalEvent::ConnectionStatus { connected: false });
                    return;
                };
                warn!(
                    "Realtime connection attempt {} failed: {}, retrying in {:?}",
                    failures, e, delay
                );
                tokio::select! {
                    _ = &mut stop => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    state.detach(false);
}

async fn run_link(
    transport: &mut dyn Transport,
    outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
    stop: &mut oneshot::Receiver<()>,
    bus: &EventBus,
) -> LinkEnd {
    loop {
        tokio::select! {
            _ = &mut *stop => {
                transport.close().await;
                return LinkEnd::Stopped;
            }
            Some(command) = outbound.recv() => {
                if let Err(e) = transport.send(&command).await {
                    warn!("Failed to send realtime command: {}", e);
                    return LinkEnd::Lost;
                }
            }
            incoming = transport.recv() => match incoming {
                Some(Ok(event)) => {
                    if let Some(local) = LocalEvent::from_server(event) {
                        bus.publish(local);
                    }
                }
                Some(Err(Kk360Error::Serialization(msg))) => {
                    warn!("Ignoring malformed realtime frame: {}", msg);
                }
                Some(Err(e)) => {
                    warn!("Realtime transport error: {}", e);
                    return LinkEnd::Lost;
                }
                None => return LinkEnd::Lost,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::models::realtime::{OnlineUser, ServerEvent};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    /// 测试用连接的远端句柄
    pub(crate) struct FakeLink {
        pub events: mpsc::UnboundedSender<Result<ServerEvent>>,
        pub sent: Arc<Mutex<Vec<ClientCommand>>>,
        pub closed: Arc<AtomicBool>,
    }

    struct FakeTransport {
        events: mpsc::UnboundedReceiver<Result<ServerEvent>>,
        sent: Arc<Mutex<Vec<ClientCommand>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&mut self, command: &ClientCommand) -> Result<()> {
            self.sent.lock().unwrap().push(command.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<ServerEvent>> {
            self.events.recv().await
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// 按计划依次返回成功或失败；计划用完后一律失败
    #[derive(Default)]
    pub(crate) struct FakeConnector {
        plan: Mutex<VecDeque<Option<FakeTransport>>>,
        pub attempts: Mutex<Vec<Instant>>,
    }

    impl FakeConnector {
        pub fn push_link(&self) -> FakeLink {
            let (events, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            self.plan.lock().unwrap().push_back(Some(FakeTransport {
                events: rx,
                sent: sent.clone(),
                closed: closed.clone(),
            }));
            FakeLink {
                events,
                sent,
                closed,
            }
        }

        pub fn push_failure(&self) {
            self.plan.lock().unwrap().push_back(None);
        }

        fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _token: &str) -> Result<Box<dyn Transport>> {
            self.attempts.lock().unwrap().push(Instant::now());
            match self.plan.lock().unwrap().pop_front().flatten() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(Kk360Error::transport("connection refused")),
            }
        }
    }

    pub(crate) fn client_with(connector: Arc<FakeConnector>) -> RealtimeClient {
        RealtimeClient::with_connector(connector, RealtimeSettings::default())
    }

    async fn next_status(rx: &mut broadcast::Receiver<LocalEvent>) -> bool {
        loop {
            if let LocalEvent::ConnectionStatus { connected } = rx.recv().await.unwrap() {
                return connected;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_final_disconnect() {
        let connector = Arc::new(FakeConnector::default());
        let client = client_with(connector.clone());
        let mut rx = client.bus().subscribe();

        assert!(client.connect("token"));
        assert!(!next_status(&mut rx).await);

        let attempts = connector.attempts.lock().unwrap().clone();
        let gaps: Vec<u128> = attempts
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000]);
        assert!(!client.is_connected());

        // 放弃之后不再尝试
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempt_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_forwarded_and_commands_sent() {
        let connector = Arc::new(FakeConnector::default());
        let link = connector.push_link();
        let client = client_with(connector.clone());
        let mut rx = client.bus().subscribe();

        client.connect("token");
        assert!(next_status(&mut rx).await);
        assert!(client.is_connected());

        assert!(client.send_message("c1", "hello", MessageType::Text, None));
        assert!(client.get_conversation_history("c1", Some(500), None));

        let user = OnlineUser {
            user_id: 2,
            full_name: "Ada".to_string(),
        };
        link.events
            .send(Ok(ServerEvent::UserOnline(user.clone())))
            .unwrap();
        link.events.send(Ok(ServerEvent::Pong)).unwrap();
        link.events
            .send(Err(Kk360Error::serialization("bad frame")))
            .unwrap();
        link.events
            .send(Ok(ServerEvent::UserOffline { user_id: 2 }))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), LocalEvent::SocketUserOnline(user));
        assert_eq!(
            rx.recv().await.unwrap(),
            LocalEvent::SocketUserOffline { user_id: 2 }
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        let sent = link.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], ClientCommand::SendMessage { .. }));
        assert!(matches!(
            sent[1],
            ClientCommand::GetConversationHistory { limit: 100, .. }
        ));

        client.disconnect().await;
        assert!(!next_status(&mut rx).await);
        assert!(link.closed.load(Ordering::SeqCst));
        assert!(!client.is_connected());
        assert!(!client.start_typing("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_dropped_while_disconnected() {
        let client = client_with(Arc::new(FakeConnector::default()));
        assert!(!client.send_message("c1", "hi", MessageType::Text, None));
        assert!(!client.get_online_users());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_unexpected_disconnect() {
        let connector = Arc::new(FakeConnector::default());
        let first = connector.push_link();
        connector.push_failure();
        let _second = connector.push_link();
        let client = client_with(connector.clone());
        let mut rx = client.bus().subscribe();

        client.connect("token");
        assert!(next_status(&mut rx).await);

        drop(first);
        assert!(!next_status(&mut rx).await);
        assert!(next_status(&mut rx).await);

        let attempts = connector.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 3);
        assert_eq!((attempts[1] - attempts[0]).as_millis(), 0);
        assert_eq!((attempts[2] - attempts[1]).as_millis(), 1000);

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connected() {
        let connector = Arc::new(FakeConnector::default());
        let _link = connector.push_link();
        let client = client_with(connector.clone());
        let mut rx = client.bus().subscribe();

        assert!(client.connect("token"));
        assert!(!client.connect("token"));
        assert!(next_status(&mut rx).await);
        assert!(!client.connect("token"));
        assert_eq!(connector.attempt_count(), 1);

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_retrying_is_silent() {
        let client = client_with(Arc::new(FakeConnector::default()));
        let mut rx = client.bus().subscribe();

        client.connect("token");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        client.disconnect().await;
        client.disconnect().await;

        assert!(rx.try_recv().is_err());
        assert!(!client.is_connected());
        // 断开后可以重新连接
        assert!(client.connect("token"));
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_session_requires_token() {
        use crate::client::session_store::MemorySessionStore;

        let connector = Arc::new(FakeConnector::default());
        let client = client_with(connector.clone());
        assert!(!client.connect_with_session(&MemorySessionStore::new(), None).await);
        assert_eq!(connector.attempt_count(), 0);

        let _link = connector.push_link();
        let store = MemorySessionStore::with_token("stored");
        assert!(client.connect_with_session(&store, None).await);
        client.disconnect().await;
    }
}
