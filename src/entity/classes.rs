//! 班级实体
//!
//! `subject_key` 为科目的规范化形式（去除首尾空白并转小写），用于查找；
//! (`tutor_id`, `subject_key`, `schedule_day`, `schedule_start`) 上有唯一索引。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "classes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tutor_id: i64,
    pub title: Option<String>,
    pub subject: String,
    pub subject_key: String,
    pub schedule_day: String,
    pub schedule_start: String,
    pub schedule_end: String,
    pub meeting_link: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::TutorId",
        to = "super::users::Column::Id"
    )]
    Tutor,
    #[sea_orm(has_many = "super::class_students::Entity")]
    ClassStudents,
    #[sea_orm(has_many = "super::class_sessions::Entity")]
    ClassSessions,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tutor.def()
    }
}

impl Related<super::class_students::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassStudents.def()
    }
}

impl Related<super::class_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// 从数据库模型转换为业务模型
impl Model {
    pub fn into_class(self, student_ids: Vec<i64>) -> crate::models::classes::entities::Class {
        use crate::models::classes::entities::{Class, ClassStatus, Schedule, Weekday};
        use chrono::{DateTime, Utc};

        Class {
            id: self.id,
            title: self.title,
            subject: self.subject,
            subject_key: self.subject_key,
            tutor_id: self.tutor_id,
            student_ids,
            schedule: Schedule {
                day: self.schedule_day.parse::<Weekday>().unwrap_or(Weekday::Monday),
                start_time: self.schedule_start,
                end_time: self.schedule_end,
            },
            meeting_link: self.meeting_link,
            status: self
                .status
                .parse::<ClassStatus>()
                .unwrap_or(ClassStatus::Scheduled),
            created_at: DateTime::<Utc>::from_timestamp(self.created_at, 0).unwrap_or_default(),
            updated_at: DateTime::<Utc>::from_timestamp(self.updated_at, 0).unwrap_or_default(),
        }
    }
}
