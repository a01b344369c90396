//! 会话状态判定
//!
//! 状态由 `ended_at` 和心跳静默时长推导，不单独存储：
//! 静默达到 `end_after` 视为结束，达到 `stale_after` 视为失活。

use chrono::{DateTime, Utc};

use crate::models::class_sessions::entities::{ClassSession, SessionState};

pub fn evaluate(
    session: &ClassSession,
    now: DateTime<Utc>,
    stale_after_secs: i64,
    end_after_secs: i64,
) -> SessionState {
    if session.ended_at.is_some() {
        return SessionState::Ended;
    }

    let silence = (now - session.last_heartbeat_at).num_seconds();
    if silence >= end_after_secs {
        SessionState::Ended
    } else if silence >= stale_after_secs {
        SessionState::Stale
    } else {
        SessionState::Active
    }
}
