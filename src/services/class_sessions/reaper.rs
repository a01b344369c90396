use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::SessionTracker;
use crate::config::{MeetingConfig, SessionConfig};
use crate::storage::Storage;

/// 启动后台任务，定期结束心跳静默超时的会话
pub fn spawn_session_reaper(
    storage: Arc<dyn Storage>,
    meeting: MeetingConfig,
    settings: SessionConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(settings.reaper_interval_secs.max(1)));
        info!(
            "Session reaper started (interval: {}s, end after: {}s)",
            settings.reaper_interval_secs, settings.end_after_secs
        );

        loop {
            interval.tick().await;
            let tracker = SessionTracker::new(&storage, &meeting, &settings);
            match tracker.reap(chrono::Utc::now()).await {
                Ok(0) => debug!("Session reaper: nothing to end"),
                Ok(count) => info!("Session reaper ended {} silent session(s)", count),
                Err(e) => error!("Session reaper failed: {}", e),
            }
        }
    })
}
