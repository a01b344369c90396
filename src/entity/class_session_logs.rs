//! 课堂会话日志实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "class_session_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub role: String,
    pub action: String,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class_sessions::Entity",
        from = "Column::SessionId",
        to = "super::class_sessions::Column::Id"
    )]
    Session,
}

impl Related<super::class_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_log(self) -> crate::models::class_sessions::entities::SessionLog {
        use crate::models::class_sessions::entities::{SessionAction, SessionLog};
        use chrono::{DateTime, Utc};

        SessionLog {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            role: self.role,
            action: self
                .action
                .parse::<SessionAction>()
                .unwrap_or(SessionAction::Join),
            created_at: DateTime::<Utc>::from_timestamp(self.created_at, 0).unwrap_or_default(),
        }
    }
}
