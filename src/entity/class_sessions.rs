//! 课堂会话实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "class_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub class_id: i64,
    pub started_by: i64,
    pub meeting_link: String,
    pub started_at: i64,
    pub last_heartbeat_at: i64,
    pub ended_at: Option<i64>,
    pub active_participants: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::classes::Entity",
        from = "Column::ClassId",
        to = "super::classes::Column::Id"
    )]
    Class,
    #[sea_orm(has_many = "super::class_session_logs::Entity")]
    Logs,
}

impl Related<super::classes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Class.def()
    }
}

impl Related<super::class_session_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Logs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// 从数据库模型转换为业务模型
impl Model {
    pub fn into_session(self) -> crate::models::class_sessions::entities::ClassSession {
        use crate::models::class_sessions::entities::ClassSession;
        use chrono::{DateTime, Utc};

        ClassSession {
            id: self.id,
            class_id: self.class_id,
            started_by: self.started_by,
            meeting_link: self.meeting_link,
            started_at: DateTime::<Utc>::from_timestamp(self.started_at, 0).unwrap_or_default(),
            last_heartbeat_at: DateTime::<Utc>::from_timestamp(self.last_heartbeat_at, 0)
                .unwrap_or_default(),
            ended_at: self
                .ended_at
                .map(|ts| DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()),
            active_participants: self.active_participants.max(0),
        }
    }
}
