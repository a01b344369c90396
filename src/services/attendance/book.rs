//! 考勤记录
//!
//! 教师开始课堂时，为该教师同科目全部班级的学生写入当天的缺勤记录
//! （已有记录的不覆盖）；学生加入课堂时标记为出勤。日期按 UTC 计算。

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::errors::{Kk360Error, Result};
use crate::models::attendance::entities::{Attendance, AttendanceStatus};
use crate::models::attendance::requests::UpdateAttendanceRequest;
use crate::models::classes::entities::Class;
use crate::models::users::entities::{User, UserRole};
use crate::storage::Storage;

pub struct AttendanceBook<'a> {
    storage: &'a Arc<dyn Storage>,
}

impl<'a> AttendanceBook<'a> {
    pub fn new(storage: &'a Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// 写入当天缺勤记录，返回新增数量
    pub async fn open_day(&self, class: &Class, date: &str) -> Result<u64> {
        let classes = self
            .storage
            .list_classes_for_user(class.tutor_id, &UserRole::Tutor)
            .await?;

        let mut created = 0;
        for sibling in classes
            .iter()
            .filter(|sibling| sibling.subject_key == class.subject_key)
        {
            created += self
                .storage
                .init_attendance(sibling.id, &sibling.student_ids, date)
                .await?;
        }
        debug!(
            "Attendance opened for {} ({}): {} record(s) created",
            class.subject_key, date, created
        );
        Ok(created)
    }

    /// 学生进入课堂时记为出勤，其他角色忽略
    pub async fn mark_present(&self, class: &Class, actor: &User, date: &str) -> Result<()> {
        if actor.role != UserRole::Student || !class.has_student(actor.id) {
            return Ok(());
        }
        self.storage
            .mark_attendance(class.id, actor.id, date, AttendanceStatus::Present)
            .await?;
        Ok(())
    }

    /// 教师和管理员查看全部记录，学生只能看到自己的
    pub async fn list(
        &self,
        class_id: i64,
        actor: &User,
        date: Option<&str>,
    ) -> Result<Vec<Attendance>> {
        let class = self.load_class(class_id).await?;
        if let Some(date) = date {
            parse_date(date)?;
        }

        let records = self.storage.list_attendance(class.id, date).await?;
        if owns(&class, actor) {
            return Ok(records);
        }
        if class.has_student(actor.id) {
            return Ok(records
                .into_iter()
                .filter(|record| record.student_id == actor.id)
                .collect());
        }
        Err(Kk360Error::authorization(format!(
            "User {} is not a member of class {}",
            actor.id, class.id
        )))
    }

    /// 批量修改考勤，仅班级教师和管理员可用
    pub async fn update(
        &self,
        class_id: i64,
        actor: &User,
        request: UpdateAttendanceRequest,
        today: &str,
    ) -> Result<Vec<Attendance>> {
        let class = self.load_class(class_id).await?;
        if !owns(&class, actor) {
            return Err(Kk360Error::authorization(
                "Only the class tutor can update attendance",
            ));
        }

        let date = match request.date.as_deref().map(str::trim) {
            Some(date) if !date.is_empty() => {
                parse_date(date)?;
                date.to_string()
            }
            _ => today.to_string(),
        };
        if request.records.is_empty() {
            return Err(Kk360Error::validation("Attendance records must not be empty"));
        }
        if let Some(mark) = request
            .records
            .iter()
            .find(|mark| !class.has_student(mark.student_id))
        {
            return Err(Kk360Error::validation(format!(
                "Student {} is not enrolled in class {}",
                mark.student_id, class.id
            )));
        }

        let mut updated = Vec::with_capacity(request.records.len());
        for mark in request.records {
            updated.push(
                self.storage
                    .mark_attendance(class.id, mark.student_id, &date, mark.status)
                    .await?,
            );
        }
        Ok(updated)
    }

    async fn load_class(&self, class_id: i64) -> Result<Class> {
        self.storage
            .get_class_by_id(class_id)
            .await?
            .ok_or_else(|| Kk360Error::not_found(format!("Class {class_id} not found")))
    }
}

fn owns(class: &Class, actor: &User) -> bool {
    actor.role == UserRole::Admin || (actor.role == UserRole::Tutor && class.tutor_id == actor.id)
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| Kk360Error::validation(format!("Invalid date: {date}, expected YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::requests::AttendanceMark;
    use crate::models::classes::entities::{NewClass, Schedule, Weekday};
    use crate::models::classes::requests::EnsureClassRequest;
    use crate::services::classes::ClassResolver;
    use crate::services::classes::resolver::tests::{create_user, meeting_config, memory_storage};

    const DAY: &str = "2026-03-02";

    struct Fixture {
        storage: Arc<dyn Storage>,
        tutor: User,
        alice: User,
        bob: User,
        class: Class,
    }

    async fn fixture() -> Fixture {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Student, None).await;
        let class = ClassResolver::new(&storage, &meeting_config())
            .ensure_class(EnsureClassRequest {
                tutor_id: tutor.id,
                student_id: alice.id,
                subject: "Physics".to_string(),
                slot: None,
            })
            .await
            .unwrap();
        Fixture {
            storage,
            tutor,
            alice,
            bob,
            class,
        }
    }

    #[tokio::test]
    async fn test_open_day_covers_same_subject_classes_once() {
        let f = fixture().await;
        let friday = f
            .storage
            .create_class(NewClass {
                tutor_id: f.tutor.id,
                title: "Physics - Group".to_string(),
                subject: "Physics".to_string(),
                subject_key: "physics".to_string(),
                schedule: Schedule {
                    day: Weekday::Friday,
                    start_time: "15:00".to_string(),
                    end_time: "16:00".to_string(),
                },
                meeting_link: "https://meet.jit.si/KK360-physics-1".to_string(),
                student_id: f.bob.id,
            })
            .await
            .unwrap();
        let book = AttendanceBook::new(&f.storage);

        assert_eq!(book.open_day(&f.class, DAY).await.unwrap(), 2);
        // 同一天再次开始不重复写入
        assert_eq!(book.open_day(&f.class, DAY).await.unwrap(), 0);

        let records = book.list(friday.id, &f.tutor, Some(DAY)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, f.bob.id);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_mark_present_keeps_single_record() {
        let f = fixture().await;
        let book = AttendanceBook::new(&f.storage);
        book.open_day(&f.class, DAY).await.unwrap();

        book.mark_present(&f.class, &f.alice, DAY).await.unwrap();
        // 教师进入课堂不产生记录
        book.mark_present(&f.class, &f.tutor, DAY).await.unwrap();

        let records = book.list(f.class.id, &f.tutor, Some(DAY)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_update_requires_owner_and_enrolled_students() {
        let f = fixture().await;
        let book = AttendanceBook::new(&f.storage);
        let request = |student_id| UpdateAttendanceRequest {
            date: Some(DAY.to_string()),
            records: vec![AttendanceMark {
                student_id,
                status: AttendanceStatus::Excused,
            }],
        };

        let denied = book
            .update(f.class.id, &f.alice, request(f.alice.id), DAY)
            .await;
        assert!(matches!(denied, Err(Kk360Error::Authorization(_))));

        let stranger = book
            .update(f.class.id, &f.tutor, request(f.bob.id), DAY)
            .await;
        assert!(matches!(stranger, Err(Kk360Error::Validation(_))));

        let updated = book
            .update(f.class.id, &f.tutor, request(f.alice.id), DAY)
            .await
            .unwrap();
        assert_eq!(updated[0].status, AttendanceStatus::Excused);
        assert_eq!(updated[0].date, DAY);
    }

    #[tokio::test]
    async fn test_students_only_see_their_own_records() {
        let f = fixture().await;
        let book = AttendanceBook::new(&f.storage);
        f.storage
            .enroll_student(f.class.id, f.bob.id, Default::default())
            .await
            .unwrap();
        let class = f.storage.get_class_by_id(f.class.id).await.unwrap().unwrap();
        book.open_day(&class, DAY).await.unwrap();

        let own = book.list(class.id, &f.alice, None).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].student_id, f.alice.id);

        let all = book.list(class.id, &f.tutor, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let outsider = create_user(&f.storage, "carol01", UserRole::Student, None).await;
        let denied = book.list(class.id, &outsider, None).await;
        assert!(matches!(denied, Err(Kk360Error::Authorization(_))));

        let bad_date = book.list(class.id, &f.tutor, Some("02/03/2026")).await;
        assert!(matches!(bad_date, Err(Kk360Error::Validation(_))));
    }
}
