//! 输入防抖
//!
//! 一次连续输入只发送一次 `typing`，最后一次按键后 `debounce` 时间内
//! 没有新输入则发送 `stop_typing`。发送消息会立即结束输入状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::realtime::RealtimeClient;
use crate::config::RealtimeConfig;

pub trait TypingSink: Send + Sync {
    fn start_typing(&self, conversation_id: &str) -> bool;
    fn stop_typing(&self, conversation_id: &str) -> bool;
}

impl TypingSink for RealtimeClient {
    fn start_typing(&self, conversation_id: &str) -> bool {
        RealtimeClient::start_typing(self, conversation_id)
    }

    fn stop_typing(&self, conversation_id: &str) -> bool {
        RealtimeClient::stop_typing(self, conversation_id)
    }
}

pub fn debounce_from(config: &RealtimeConfig) -> Duration {
    Duration::from_millis(config.typing_debounce_ms)
}

pub struct TypingDebouncer {
    sink: Arc<dyn TypingSink>,
    conversation_id: String,
    debounce: Duration,
    typing: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl TypingDebouncer {
    pub fn new(
        sink: Arc<dyn TypingSink>,
        conversation_id: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            sink,
            conversation_id: conversation_id.into(),
            debounce,
            typing: Arc::new(AtomicBool::new(false)),
            timer: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    /// 每次按键调用，`typing` 未送出（例如连接断开）时下一次按键重试
    pub fn keystroke(&mut self) {
        if !self.is_typing() {
            if !self.sink.start_typing(&self.conversation_id) {
                return;
            }
            self.typing.store(true, Ordering::SeqCst);
        }
        self.cancel_timer();

        let sink = self.sink.clone();
        let typing = self.typing.clone();
        let conversation_id = self.conversation_id.clone();
        let debounce = self.debounce;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if typing.swap(false, Ordering::SeqCst) {
                sink.stop_typing(&conversation_id);
            }
        }));
    }

    /// 消息发出后调用
    pub fn message_sent(&mut self) {
        self.cancel_timer();
        if self.typing.swap(false, Ordering::SeqCst) {
            self.sink.stop_typing(&self.conversation_id);
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<String>>,
        offline: AtomicBool,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TypingSink for RecordingSink {
        fn start_typing(&self, conversation_id: &str) -> bool {
            if self.offline.load(Ordering::SeqCst) {
                return false;
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("typing:{conversation_id}"));
            true
        }

        fn stop_typing(&self, conversation_id: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("stop:{conversation_id}"));
            true
        }
    }

    fn debouncer(sink: &Arc<RecordingSink>) -> TypingDebouncer {
        TypingDebouncer::new(sink.clone(), "c1", Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_start_per_burst_and_delayed_stop() {
        let sink = Arc::new(RecordingSink::default());
        let mut typing = debouncer(&sink);

        for _ in 0..5 {
            typing.keystroke();
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(sink.calls(), vec!["typing:c1"]);

        // 最后一次按键在 1200ms，停止应在 2200ms
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.calls(), vec!["typing:c1"]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.calls(), vec!["typing:c1", "stop:c1"]);
        assert!(!typing.is_typing());

        typing.keystroke();
        assert_eq!(sink.calls(), vec!["typing:c1", "stop:c1", "typing:c1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_sent_stops_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let mut typing = debouncer(&sink);

        typing.keystroke();
        typing.message_sent();
        assert_eq!(sink.calls(), vec!["typing:c1", "stop:c1"]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.calls().len(), 2);

        // 没在输入时不发送
        typing.message_sent();
        assert_eq!(sink.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_start_is_retried_on_next_keystroke() {
        let sink = Arc::new(RecordingSink::default());
        sink.offline.store(true, Ordering::SeqCst);
        let mut typing = debouncer(&sink);

        typing.keystroke();
        assert!(!typing.is_typing());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.calls().is_empty());

        sink.offline.store(false, Ordering::SeqCst);
        typing.keystroke();
        assert!(typing.is_typing());
        assert_eq!(sink.calls(), vec!["typing:c1"]);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(sink.calls(), vec!["typing:c1", "stop:c1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let sink = Arc::new(RecordingSink::default());
        let mut typing = debouncer(&sink);
        typing.keystroke();
        drop(typing);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.calls(), vec!["typing:c1"]);
    }
}
