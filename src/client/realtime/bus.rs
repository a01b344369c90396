//! 本地事件总线

use tokio::sync::broadcast;
use tracing::debug;

use super::events::LocalEvent;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LocalEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalEvent> {
        self.tx.subscribe()
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn publish(&self, event: LocalEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No subscribers for {}", name);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let event = LocalEvent::ConnectionStatus { connected: true };
        assert_eq!(bus.publish(event.clone()), 2);
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(LocalEvent::ConnectionStatus { connected: false }), 0);
    }
}
