//! 课堂会话存储操作

use super::{SeaOrmStorage, db_error};
use crate::entity::class_session_logs::{
    ActiveModel as LogActiveModel, Column as LogColumn, Entity as ClassSessionLogs,
};
use crate::entity::class_sessions::{ActiveModel, Column, Entity as ClassSessions};
use crate::errors::{Kk360Error, Result};
use crate::models::{
    class_sessions::entities::{ClassSession, SessionAction, SessionLog},
    users::entities::UserRole,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};

impl SeaOrmStorage {
    /// 获取班级最近一个未结束的会话
    pub async fn get_open_session_for_class_impl(
        &self,
        class_id: i64,
    ) -> Result<Option<ClassSession>> {
        let result = ClassSessions::find()
            .filter(
                Condition::all()
                    .add(Column::ClassId.eq(class_id))
                    .add(Column::EndedAt.is_null()),
            )
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询课堂会话失败", e))?;

        Ok(result.map(|m| m.into_session()))
    }

    /// 创建会话
    pub async fn create_session_impl(
        &self,
        class_id: i64,
        started_by: i64,
        meeting_link: &str,
    ) -> Result<ClassSession> {
        let now = chrono::Utc::now().timestamp();

        let model = ActiveModel {
            class_id: Set(class_id),
            started_by: Set(started_by),
            meeting_link: Set(meeting_link.to_string()),
            started_at: Set(now),
            last_heartbeat_at: Set(now),
            ended_at: Set(None),
            active_participants: Set(0),
            ..Default::default()
        };

        let result = model
            .insert(&self.db)
            .await
            .map_err(|e| db_error("创建课堂会话失败", e))?;

        Ok(result.into_session())
    }

    /// 通过 ID 获取会话
    pub async fn get_session_by_id_impl(&self, session_id: i64) -> Result<Option<ClassSession>> {
        let result = ClassSessions::find_by_id(session_id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询课堂会话失败", e))?;

        Ok(result.map(|m| m.into_session()))
    }

    /// 追加会话日志，join 增加在线人数，leave 减少（不低于 0）
    pub async fn append_session_log_impl(
        &self,
        session_id: i64,
        user_id: i64,
        role: &UserRole,
        action: SessionAction,
    ) -> Result<SessionLog> {
        let now = chrono::Utc::now().timestamp();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| db_error("开启事务失败", e))?;

        let session = ClassSessions::find_by_id(session_id)
            .one(&txn)
            .await
            .map_err(|e| db_error("查询课堂会话失败", e))?
            .ok_or_else(|| Kk360Error::not_found(format!("课堂会话不存在: {session_id}")))?;

        let participants = match action {
            SessionAction::Join => session.active_participants.saturating_add(1),
            SessionAction::Leave => (session.active_participants - 1).max(0),
        };

        let mut session_model: ActiveModel = session.into();
        session_model.active_participants = Set(participants);
        session_model
            .update(&txn)
            .await
            .map_err(|e| db_error("更新在线人数失败", e))?;

        let log = LogActiveModel {
            session_id: Set(session_id),
            user_id: Set(user_id),
            role: Set(role.to_string()),
            action: Set(action.to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| db_error("写入会话日志失败", e))?;

        txn.commit()
            .await
            .map_err(|e| db_error("提交事务失败", e))?;

        Ok(log.into_log())
    }

    /// 列出会话日志（按时间正序）
    pub async fn list_session_logs_impl(&self, session_id: i64) -> Result<Vec<SessionLog>> {
        let logs = ClassSessionLogs::find()
            .filter(LogColumn::SessionId.eq(session_id))
            .order_by_asc(LogColumn::Id)
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询会话日志失败", e))?;

        Ok(logs.into_iter().map(|m| m.into_log()).collect())
    }

    /// 刷新心跳时间（已结束的会话不更新）
    pub async fn touch_session_heartbeat_impl(
        &self,
        session_id: i64,
    ) -> Result<Option<ClassSession>> {
        ClassSessions::update_many()
            .col_expr(
                Column::LastHeartbeatAt,
                Expr::value(chrono::Utc::now().timestamp()),
            )
            .filter(
                Condition::all()
                    .add(Column::Id.eq(session_id))
                    .add(Column::EndedAt.is_null()),
            )
            .exec(&self.db)
            .await
            .map_err(|e| db_error("更新心跳失败", e))?;

        self.get_session_by_id_impl(session_id).await
    }

    /// 结束会话
    pub async fn end_session_impl(&self, session_id: i64) -> Result<bool> {
        let result = ClassSessions::update_many()
            .col_expr(Column::EndedAt, Expr::value(chrono::Utc::now().timestamp()))
            .filter(
                Condition::all()
                    .add(Column::Id.eq(session_id))
                    .add(Column::EndedAt.is_null()),
            )
            .exec(&self.db)
            .await
            .map_err(|e| db_error("结束课堂会话失败", e))?;

        Ok(result.rows_affected > 0)
    }

    /// 结束心跳时间不晚于 cutoff 的全部未结束会话
    pub async fn end_silent_sessions_impl(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64> {
        let result = ClassSessions::update_many()
            .col_expr(Column::EndedAt, Expr::value(chrono::Utc::now().timestamp()))
            .filter(
                Condition::all()
                    .add(Column::EndedAt.is_null())
                    .add(Column::LastHeartbeatAt.lte(cutoff.timestamp())),
            )
            .exec(&self.db)
            .await
            .map_err(|e| db_error("清理超时会话失败", e))?;

        Ok(result.rows_affected)
    }
}
