//! 课堂会话生命周期
//!
//! `NotStarted -> Active -> (Stale <-> Active) -> Ended`
//!
//! 教师（或管理员）开始课堂时确定会议链接并同步到同科目的其他班级；
//! 学生加入时从不修改链接。两者都复用班级当前存活的会话。
//!
//! 开始课堂时写入当天的缺勤记录，学生加入或记录 join 时改为出勤。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::state::evaluate;
use crate::config::{MeetingConfig, SessionConfig};
use crate::errors::{Kk360Error, Result};
use crate::models::attendance::entities::attendance_date;
use crate::models::class_sessions::entities::{
    ClassSession, SessionAction, SessionLog, SessionState,
};
use crate::models::class_sessions::responses::{SessionDetailResponse, SessionStartResponse};
use crate::models::classes::entities::Class;
use crate::models::users::entities::{User, UserRole};
use crate::services::attendance::AttendanceBook;
use crate::storage::Storage;
use crate::utils::meeting::{generate_meeting_link, link_needs_backfill};

pub struct SessionTracker<'a> {
    storage: &'a Arc<dyn Storage>,
    meeting: &'a MeetingConfig,
    settings: &'a SessionConfig,
}

impl<'a> SessionTracker<'a> {
    pub fn new(
        storage: &'a Arc<dyn Storage>,
        meeting: &'a MeetingConfig,
        settings: &'a SessionConfig,
    ) -> Self {
        Self {
            storage,
            meeting,
            settings,
        }
    }

    /// 开始课堂，重复调用保持同一链接
    pub async fn start(
        &self,
        class_id: i64,
        actor: &User,
        session_link: Option<String>,
    ) -> Result<SessionStartResponse> {
        let mut class = self.load_class(class_id).await?;
        let owns = actor.role == UserRole::Admin
            || (actor.role == UserRole::Tutor && class.tutor_id == actor.id);
        if !owns {
            return Err(Kk360Error::authorization(
                "Only the class tutor can start this class",
            ));
        }

        let host = &self.meeting.provider_host;
        // 只接受会议服务的链接作为覆盖值
        let requested = session_link
            .map(|link| link.trim().to_string())
            .filter(|link| !link_needs_backfill(Some(link.as_str()), host))
            .or_else(|| class.meeting_link.clone());
        let link = match requested {
            Some(link) if !link_needs_backfill(Some(&link), host) => link,
            _ => generate_meeting_link(
                &self.meeting.provider_host,
                &self.meeting.room_prefix,
                &class.subject_key,
                Utc::now().timestamp_millis(),
            ),
        };

        if class.meeting_link.as_deref() != Some(link.as_str()) {
            let synced = self
                .storage
                .sync_meeting_link_for_subject(class.tutor_id, &class.subject_key, &link)
                .await?;
            info!(
                "Meeting link for class {} updated, {} class(es) synced",
                class.id, synced
            );
            class.meeting_link = Some(link.clone());
        }

        let session = match self.live_session(class.id).await? {
            Some(session) if session.meeting_link == link => session,
            Some(session) => {
                // 链接已变更，旧会话不再有效
                self.storage.end_session(session.id).await?;
                self.storage.create_session(class.id, actor.id, &link).await?
            }
            None => self.storage.create_session(class.id, actor.id, &link).await?,
        };

        AttendanceBook::new(self.storage)
            .open_day(&class, &attendance_date(Utc::now()))
            .await?;

        info!(
            "Class {} started by user {} (session {})",
            class.id, actor.id, session.id
        );
        Ok(SessionStartResponse {
            session_link: link,
            session_id: session.id,
            class,
        })
    }

    /// 加入课堂，班级尚无链接时返回 NotStarted
    pub async fn join(&self, class_id: i64, actor: &User) -> Result<SessionStartResponse> {
        let class = self.load_class(class_id).await?;
        self.ensure_member(&class, actor)?;

        let link = class
            .meeting_link
            .clone()
            .filter(|link| !link.trim().is_empty())
            .ok_or_else(|| {
                Kk360Error::not_started(format!("Class {class_id} has not been started yet"))
            })?;

        let session = match self.live_session(class.id).await? {
            Some(session) => session,
            None => self.storage.create_session(class.id, actor.id, &link).await?,
        };

        AttendanceBook::new(self.storage)
            .mark_present(&class, actor, &attendance_date(Utc::now()))
            .await?;

        debug!("User {} joined class {} (session {})", actor.id, class.id, session.id);
        Ok(SessionStartResponse {
            session_link: link,
            session_id: session.id,
            class,
        })
    }

    /// 记录加入/离开并调整在线人数
    pub async fn log(
        &self,
        session_id: i64,
        actor: &User,
        action: SessionAction,
    ) -> Result<SessionLog> {
        let session = self.load_session(session_id).await?;
        let class = self.load_class(session.class_id).await?;
        self.ensure_member(&class, actor)?;

        let entry = self
            .storage
            .append_session_log(session.id, actor.id, &actor.role, action)
            .await?;
        if action == SessionAction::Join {
            AttendanceBook::new(self.storage)
                .mark_present(&class, actor, &attendance_date(Utc::now()))
                .await?;
        }
        Ok(entry)
    }

    /// 刷新心跳，已结束的会话返回 SessionEnded
    pub async fn heartbeat(&self, session_id: i64, actor: &User) -> Result<ClassSession> {
        let session = self.load_session(session_id).await?;
        let class = self.load_class(session.class_id).await?;
        self.ensure_member(&class, actor)?;

        if self.state_of(&session, Utc::now()) == SessionState::Ended {
            if session.ended_at.is_none() {
                self.storage.end_session(session.id).await?;
            }
            return Err(Kk360Error::session_ended(format!(
                "Session {session_id} has ended"
            )));
        }

        self.storage
            .touch_session_heartbeat(session.id)
            .await?
            .ok_or_else(|| Kk360Error::session_ended(format!("Session {session_id} has ended")))
    }

    /// 会话详情及当前状态
    pub async fn detail(&self, session_id: i64, actor: &User) -> Result<SessionDetailResponse> {
        let session = self.load_session(session_id).await?;
        let class = self.load_class(session.class_id).await?;
        self.ensure_member(&class, actor)?;

        let logs = self.storage.list_session_logs(session.id).await?;
        let state = self.state_of(&session, Utc::now());
        Ok(SessionDetailResponse {
            session,
            state,
            logs,
        })
    }

    /// 结束在 `now` 时已静默超过 `end_after_secs` 的会话
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - chrono::Duration::seconds(self.settings.end_after_secs);
        self.storage.end_silent_sessions(cutoff).await
    }

    pub fn state_of(&self, session: &ClassSession, now: DateTime<Utc>) -> SessionState {
        evaluate(
            session,
            now,
            self.settings.stale_after_secs,
            self.settings.end_after_secs,
        )
    }

    /// 班级当前存活的会话，静默超时的会话在此处落库结束
    async fn live_session(&self, class_id: i64) -> Result<Option<ClassSession>> {
        let Some(session) = self.storage.get_open_session_for_class(class_id).await? else {
            return Ok(None);
        };
        if self.state_of(&session, Utc::now()) == SessionState::Ended {
            debug!("Session {} expired, closing", session.id);
            self.storage.end_session(session.id).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn load_class(&self, class_id: i64) -> Result<Class> {
        self.storage
            .get_class_by_id(class_id)
            .await?
            .ok_or_else(|| Kk360Error::not_found(format!("Class {class_id} not found")))
    }

    async fn load_session(&self, session_id: i64) -> Result<ClassSession> {
        self.storage
            .get_session_by_id(session_id)
            .await?
            .ok_or_else(|| {
                Kk360Error::session_not_found(format!("Session {session_id} not found"))
            })
    }

    fn ensure_member(&self, class: &Class, actor: &User) -> Result<()> {
        if actor.role == UserRole::Admin || class.is_member(actor.id) {
            Ok(())
        } else {
            Err(Kk360Error::authorization(format!(
                "User {} is not a member of class {}",
                actor.id, class.id
            )))
        }
    }
}
