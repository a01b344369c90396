//! 班级存储操作

use std::collections::HashMap;

use super::{SeaOrmStorage, db_error};
use crate::entity::class_students::{
    ActiveModel as ClassStudentActiveModel, Column as ClassStudentColumn,
    Entity as ClassStudents,
};
use crate::entity::classes::{ActiveModel, Column, Entity as Classes, Model};
use crate::errors::{Kk360Error, Result};
use crate::models::{
    classes::entities::{Class, ClassBackfill, ClassStatus, NewClass, Schedule, Weekday},
    users::entities::UserRole,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait, Set, sea_query::Expr,
};

impl SeaOrmStorage {
    /// 查询多个班级的学生 ID
    async fn load_student_ids(&self, class_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
        if class_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = ClassStudents::find()
            .filter(ClassStudentColumn::ClassId.is_in(class_ids.iter().copied()))
            .order_by_asc(ClassStudentColumn::Id)
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询班级学生失败", e))?;

        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in rows {
            map.entry(row.class_id).or_default().push(row.student_id);
        }
        Ok(map)
    }

    async fn hydrate_class(&self, model: Model) -> Result<Class> {
        let mut students = self.load_student_ids(&[model.id]).await?;
        let student_ids = students.remove(&model.id).unwrap_or_default();
        Ok(model.into_class(student_ids))
    }

    async fn hydrate_classes(&self, models: Vec<Model>) -> Result<Vec<Class>> {
        let ids: Vec<i64> = models.iter().map(|m| m.id).collect();
        let mut students = self.load_student_ids(&ids).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let student_ids = students.remove(&m.id).unwrap_or_default();
                m.into_class(student_ids)
            })
            .collect())
    }

    /// 通过 ID 获取班级
    pub async fn get_class_by_id_impl(&self, class_id: i64) -> Result<Option<Class>> {
        let result = Classes::find_by_id(class_id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询班级失败", e))?;

        match result {
            Some(model) => Ok(Some(self.hydrate_class(model).await?)),
            None => Ok(None),
        }
    }

    /// 按时段查找班级（结束时间不参与比较）
    pub async fn find_class_by_slot_impl(
        &self,
        tutor_id: i64,
        subject_key: &str,
        day: Weekday,
        start_time: &str,
    ) -> Result<Option<Class>> {
        let result = Classes::find()
            .filter(
                Condition::all()
                    .add(Column::TutorId.eq(tutor_id))
                    .add(Column::SubjectKey.eq(subject_key))
                    .add(Column::ScheduleDay.eq(day.as_str()))
                    .add(Column::ScheduleStart.eq(start_time)),
            )
            .order_by_asc(Column::Id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("按时段查询班级失败", e))?;

        match result {
            Some(model) => Ok(Some(self.hydrate_class(model).await?)),
            None => Ok(None),
        }
    }

    /// 按科目查找最早创建的班级
    pub async fn find_oldest_class_by_subject_impl(
        &self,
        tutor_id: i64,
        subject_key: &str,
    ) -> Result<Option<Class>> {
        let result = Classes::find()
            .filter(
                Condition::all()
                    .add(Column::TutorId.eq(tutor_id))
                    .add(Column::SubjectKey.eq(subject_key)),
            )
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("按科目查询班级失败", e))?;

        match result {
            Some(model) => Ok(Some(self.hydrate_class(model).await?)),
            None => Ok(None),
        }
    }

    /// 创建班级并加入首个学生
    pub async fn create_class_impl(&self, class: NewClass) -> Result<Class> {
        let now = chrono::Utc::now().timestamp();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| db_error("开启事务失败", e))?;

        let model = ActiveModel {
            tutor_id: Set(class.tutor_id),
            title: Set(Some(class.title)),
            subject: Set(class.subject),
            subject_key: Set(class.subject_key),
            schedule_day: Set(class.schedule.day.as_str().to_string()),
            schedule_start: Set(class.schedule.start_time),
            schedule_end: Set(class.schedule.end_time),
            meeting_link: Set(Some(class.meeting_link)),
            status: Set(ClassStatus::Scheduled.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = model
            .insert(&txn)
            .await
            .map_err(|e| db_error("创建班级失败", e))?;

        ClassStudentActiveModel {
            class_id: Set(created.id),
            student_id: Set(class.student_id),
            joined_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| db_error("添加班级学生失败", e))?;

        txn.commit()
            .await
            .map_err(|e| db_error("提交事务失败", e))?;

        Ok(created.into_class(vec![class.student_id]))
    }

    /// 学生加入班级并回填字段，两者在同一事务中提交
    ///
    /// 班级不存在时返回 `None`；学生已在班级中时只做回填。
    pub async fn enroll_student_impl(
        &self,
        class_id: i64,
        student_id: i64,
        backfill: ClassBackfill,
    ) -> Result<Option<Class>> {
        let now = chrono::Utc::now().timestamp();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| db_error("开启事务失败", e))?;

        let Some(mut model) = Classes::find_by_id(class_id)
            .one(&txn)
            .await
            .map_err(|e| db_error("查询班级失败", e))?
        else {
            txn.rollback()
                .await
                .map_err(|e| db_error("回滚事务失败", e))?;
            return Ok(None);
        };

        if !backfill.is_empty() {
            let mut active = ActiveModel {
                id: Set(class_id),
                updated_at: Set(now),
                ..Default::default()
            };
            if let Some(title) = backfill.title {
                active.title = Set(Some(title));
            }
            if let Some(link) = backfill.meeting_link {
                active.meeting_link = Set(Some(link));
            }
            model = active
                .update(&txn)
                .await
                .map_err(|e| db_error("更新班级失败", e))?;
        }

        let existing = ClassStudents::find()
            .filter(
                Condition::all()
                    .add(ClassStudentColumn::ClassId.eq(class_id))
                    .add(ClassStudentColumn::StudentId.eq(student_id)),
            )
            .one(&txn)
            .await
            .map_err(|e| db_error("查询班级学生失败", e))?;

        if existing.is_none() {
            let inserted = ClassStudentActiveModel {
                class_id: Set(class_id),
                student_id: Set(student_id),
                joined_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await;

            if let Err(e) = inserted {
                txn.rollback()
                    .await
                    .map_err(|e| db_error("回滚事务失败", e))?;
                return match db_error("添加班级学生失败", e) {
                    // 并发加入，以对方提交的结果为准
                    Kk360Error::Conflict(_) => self.get_class_by_id_impl(class_id).await,
                    other => Err(other),
                };
            }
        }

        txn.commit()
            .await
            .map_err(|e| db_error("提交事务失败", e))?;

        Ok(Some(self.hydrate_class(model).await?))
    }

    /// 修改时段和状态，时段与其他班级冲突时返回 Conflict
    pub async fn update_class_schedule_impl(
        &self,
        class_id: i64,
        schedule: Option<Schedule>,
        status: Option<ClassStatus>,
    ) -> Result<Option<Class>> {
        let mut model = ActiveModel {
            id: Set(class_id),
            updated_at: Set(chrono::Utc::now().timestamp()),
            ..Default::default()
        };
        if let Some(schedule) = schedule {
            model.schedule_day = Set(schedule.day.as_str().to_string());
            model.schedule_start = Set(schedule.start_time);
            model.schedule_end = Set(schedule.end_time);
        }
        if let Some(status) = status {
            model.status = Set(status.to_string());
        }

        match model.update(&self.db).await {
            Ok(updated) => Ok(Some(self.hydrate_class(updated).await?)),
            Err(sea_orm::DbErr::RecordNotUpdated) => Ok(None),
            Err(e) => Err(db_error("更新班级时间失败", e)),
        }
    }

    /// 同步会议链接到同一教师同科目的全部班级
    pub async fn sync_meeting_link_for_subject_impl(
        &self,
        tutor_id: i64,
        subject_key: &str,
        meeting_link: &str,
    ) -> Result<u64> {
        let result = Classes::update_many()
            .col_expr(Column::MeetingLink, Expr::value(meeting_link))
            .col_expr(Column::UpdatedAt, Expr::value(chrono::Utc::now().timestamp()))
            .filter(
                Condition::all()
                    .add(Column::TutorId.eq(tutor_id))
                    .add(Column::SubjectKey.eq(subject_key))
                    .add(
                        Condition::any()
                            .add(Column::MeetingLink.is_null())
                            .add(Column::MeetingLink.ne(meeting_link)),
                    ),
            )
            .exec(&self.db)
            .await
            .map_err(|e| db_error("同步会议链接失败", e))?;

        Ok(result.rows_affected)
    }

    /// 列出用户可见的班级，按星期和开始时间排序
    pub async fn list_classes_for_user_impl(
        &self,
        user_id: i64,
        role: &UserRole,
    ) -> Result<Vec<Class>> {
        let mut select = Classes::find();

        match role {
            UserRole::Admin => {}
            UserRole::Tutor => {
                select = select.filter(Column::TutorId.eq(user_id));
            }
            UserRole::Student => {
                let class_ids: Vec<i64> = ClassStudents::find()
                    .filter(ClassStudentColumn::StudentId.eq(user_id))
                    .all(&self.db)
                    .await
                    .map_err(|e| db_error("查询学生班级失败", e))?
                    .into_iter()
                    .map(|row| row.class_id)
                    .collect();
                if class_ids.is_empty() {
                    return Ok(Vec::new());
                }
                select = select.filter(Column::Id.is_in(class_ids));
            }
        }

        let models = select
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询班级列表失败", e))?;

        let mut classes = self.hydrate_classes(models).await?;
        // 星期以字符串存储，在内存中排序
        classes.sort_by(|a, b| {
            a.schedule
                .day
                .cmp(&b.schedule.day)
                .then_with(|| a.schedule.start_time.cmp(&b.schedule.start_time))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(classes)
    }
}
