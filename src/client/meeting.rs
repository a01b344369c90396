//! 会议页面驱动
//!
//! 打开会议：教师开始课堂，其他角色加入课堂；随后记录 `join` 并启动心跳。
//! 离开会议：停止心跳并记录 `leave`。日志和心跳失败都不影响会议本身。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::api::ClassSessionApi;
use crate::config::SessionConfig;
use crate::errors::Result;
use crate::models::class_sessions::entities::SessionAction;
use crate::models::classes::entities::Class;
use crate::models::users::entities::UserRole;

#[derive(Debug, Clone)]
pub struct MeetingSettings {
    pub heartbeat_interval: Duration,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl From<&SessionConfig> for MeetingSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
        }
    }
}

pub struct MeetingSession {
    api: Arc<dyn ClassSessionApi>,
    session_id: i64,
    session_link: String,
    class: Class,
    heartbeat: Option<JoinHandle<()>>,
    left: bool,
}

impl MeetingSession {
    pub async fn open(
        api: Arc<dyn ClassSessionApi>,
        class_id: i64,
        role: &UserRole,
        settings: MeetingSettings,
    ) -> Result<Self> {
        let response = match role {
            UserRole::Tutor => api.start_class(class_id, None).await?,
            _ => api.join_class(class_id).await?,
        };
        info!(
            "Meeting opened for class {} (session {})",
            class_id, response.session_id
        );

        if let Err(e) = api.log_session(response.session_id, SessionAction::Join).await {
            debug!("Failed to log join for session {}: {}", response.session_id, e);
        }

        let heartbeat = spawn_heartbeat(api.clone(), response.session_id, settings.heartbeat_interval);

        Ok(Self {
            api,
            session_id: response.session_id,
            session_link: response.session_link,
            class: response.class,
            heartbeat: Some(heartbeat),
            left: false,
        })
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn session_link(&self) -> &str {
        &self.session_link
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    /// 离开会议
    pub async fn leave(mut self) {
        self.stop_heartbeat();
        self.left = true;
        if let Err(e) = self
            .api
            .log_session(self.session_id, SessionAction::Leave)
            .await
        {
            debug!("Failed to log leave for session {}: {}", self.session_id, e);
        }
        info!("Meeting left (session {})", self.session_id);
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

impl Drop for MeetingSession {
    // 未调用 leave 直接释放时，尽力补发 leave
    fn drop(&mut self) {
        self.stop_heartbeat();
        if self.left {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let api = self.api.clone();
            let session_id = self.session_id;
            runtime.spawn(async move {
                if let Err(e) = api.log_session(session_id, SessionAction::Leave).await {
                    debug!("Failed to log leave for session {}: {}", session_id, e);
                }
            });
        }
    }
}

fn spawn_heartbeat(
    api: Arc<dyn ClassSessionApi>,
    session_id: i64,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 第一次 tick 立即返回，跳过
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = api.heartbeat(session_id).await {
                warn!("Heartbeat failed for session {}: {}", session_id, e);
            }
        }
    })
}
