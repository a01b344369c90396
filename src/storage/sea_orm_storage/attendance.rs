//! 考勤存储操作

use std::collections::HashSet;

use super::{SeaOrmStorage, db_error};
use crate::entity::attendance::{ActiveModel, Column, Entity as AttendanceRecords};
use crate::errors::{Kk360Error, Result};
use crate::models::attendance::entities::{Attendance, AttendanceStatus};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};

impl SeaOrmStorage {
    /// 为尚无当天记录的学生写入缺勤记录，返回新增数量
    pub async fn init_attendance_impl(
        &self,
        class_id: i64,
        student_ids: &[i64],
        date: &str,
    ) -> Result<u64> {
        if student_ids.is_empty() {
            return Ok(0);
        }

        let recorded: HashSet<i64> = AttendanceRecords::find()
            .filter(
                Condition::all()
                    .add(Column::ClassId.eq(class_id))
                    .add(Column::Date.eq(date))
                    .add(Column::StudentId.is_in(student_ids.iter().copied())),
            )
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询考勤失败", e))?
            .into_iter()
            .map(|row| row.student_id)
            .collect();

        let now = chrono::Utc::now().timestamp();
        let mut created = 0;
        for &student_id in student_ids {
            if recorded.contains(&student_id) {
                continue;
            }
            let model = ActiveModel {
                class_id: Set(class_id),
                student_id: Set(student_id),
                date: Set(date.to_string()),
                status: Set(AttendanceStatus::Absent.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            match model.insert(&self.db).await {
                Ok(_) => created += 1,
                Err(e) => match db_error("创建考勤失败", e) {
                    // 同一天重复开始课堂
                    Kk360Error::Conflict(_) => {}
                    other => return Err(other),
                },
            }
        }
        Ok(created)
    }

    /// 设置某个学生某天的考勤状态（不存在则创建）
    pub async fn mark_attendance_impl(
        &self,
        class_id: i64,
        student_id: i64,
        date: &str,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        let now = chrono::Utc::now().timestamp();

        if let Some(existing) = self.find_attendance(class_id, student_id, date).await? {
            let mut model: ActiveModel = existing.into();
            model.status = Set(status.to_string());
            model.updated_at = Set(now);
            let updated = model
                .update(&self.db)
                .await
                .map_err(|e| db_error("更新考勤失败", e))?;
            return Ok(updated.into_attendance());
        }

        let model = ActiveModel {
            class_id: Set(class_id),
            student_id: Set(student_id),
            date: Set(date.to_string()),
            status: Set(status.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        match model.insert(&self.db).await {
            Ok(created) => Ok(created.into_attendance()),
            Err(e) => match db_error("创建考勤失败", e) {
                // 并发写入同一条记录，改为更新
                Kk360Error::Conflict(_) => {
                    let existing = self
                        .find_attendance(class_id, student_id, date)
                        .await?
                        .ok_or_else(|| {
                            Kk360Error::database_operation("考勤记录冲突后仍未找到")
                        })?;
                    let mut model: ActiveModel = existing.into();
                    model.status = Set(status.to_string());
                    model.updated_at = Set(now);
                    let updated = model
                        .update(&self.db)
                        .await
                        .map_err(|e| db_error("更新考勤失败", e))?;
                    Ok(updated.into_attendance())
                }
                other => Err(other),
            },
        }
    }

    /// 列出班级考勤，可按日期过滤
    pub async fn list_attendance_impl(
        &self,
        class_id: i64,
        date: Option<&str>,
    ) -> Result<Vec<Attendance>> {
        let mut select = AttendanceRecords::find().filter(Column::ClassId.eq(class_id));
        if let Some(date) = date {
            select = select.filter(Column::Date.eq(date));
        }

        let rows = select
            .order_by_asc(Column::Date)
            .order_by_asc(Column::StudentId)
            .all(&self.db)
            .await
            .map_err(|e| db_error("查询考勤列表失败", e))?;

        Ok(rows.into_iter().map(|row| row.into_attendance()).collect())
    }

    async fn find_attendance(
        &self,
        class_id: i64,
        student_id: i64,
        date: &str,
    ) -> Result<Option<crate::entity::attendance::Model>> {
        AttendanceRecords::find()
            .filter(
                Condition::all()
                    .add(Column::ClassId.eq(class_id))
                    .add(Column::StudentId.eq(student_id))
                    .add(Column::Date.eq(date)),
            )
            .one(&self.db)
            .await
            .map_err(|e| db_error("查询考勤失败", e))
    }
}
