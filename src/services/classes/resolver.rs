//! 班级查找或创建
//!
//! 同一教师 + 同一科目（规范化后比较）优先复用已有班级：
//! 1. 指定时段时先按 (星期, 开始时间) 精确匹配，结束时间不参与比较；
//! 2. 否则按科目匹配最早创建的班级；
//! 3. 仍未找到时创建新班级。
//!
//! 复用时把学生加入班级，并回填缺失或旧格式的标题、缺失或非会议服务的链接，
//! 只有发生变化时才写回存储。并发创建由唯一索引兜底，冲突后重新查询。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MeetingConfig;
use crate::errors::{Kk360Error, Result};
use crate::models::classes::entities::{Class, ClassBackfill, NewClass, Schedule, Weekday};
use crate::models::classes::requests::{EnsureClassRequest, SlotRequest};
use crate::models::users::entities::{User, UserRole};
use crate::storage::Storage;
use crate::utils::meeting::{
    class_title, generate_meeting_link, link_needs_backfill, normalize_subject,
    title_needs_backfill,
};
use crate::utils::validate::{add_minutes, validate_time};

/// 未给出结束时间时的默认课时（分钟）
const DEFAULT_SLOT_MINUTES: u32 = 60;

pub struct ClassResolver<'a> {
    storage: &'a Arc<dyn Storage>,
    meeting: &'a MeetingConfig,
}

impl<'a> ClassResolver<'a> {
    pub fn new(storage: &'a Arc<dyn Storage>, meeting: &'a MeetingConfig) -> Self {
        Self { storage, meeting }
    }

    /// 查找或创建班级，返回的班级一定包含该学生
    pub async fn ensure_class(&self, request: EnsureClassRequest) -> Result<Class> {
        let subject = request.subject.trim().to_string();
        if subject.is_empty() {
            return Err(Kk360Error::validation("Subject must not be blank"));
        }
        let subject_key = normalize_subject(&subject);
        let slot = request
            .slot
            .as_ref()
            .map(resolve_slot)
            .transpose()?;

        let tutor = self.load_user(request.tutor_id, UserRole::Tutor).await?;
        self.load_user(request.student_id, UserRole::Student).await?;

        if let Some(class) = self.lookup(tutor.id, &subject_key, slot.as_ref()).await? {
            return self.reconcile(class, &tutor, request.student_id).await;
        }

        let schedule = match slot {
            Some(schedule) => schedule,
            None => self.default_schedule()?,
        };

        let new_class = NewClass {
            tutor_id: tutor.id,
            title: class_title(&subject, &tutor.tutor_name()),
            subject: subject.clone(),
            subject_key: subject_key.clone(),
            schedule: schedule.clone(),
            meeting_link: self.new_link(&subject_key),
            student_id: request.student_id,
        };

        match self.storage.create_class(new_class).await {
            Ok(class) => {
                info!(
                    "Created class {} ({}) for tutor {}",
                    class.id, subject_key, tutor.id
                );
                Ok(class)
            }
            Err(Kk360Error::Conflict(msg)) => {
                // 其他请求刚刚创建了同一时段的班级
                debug!("Concurrent class creation detected: {}", msg);
                let class = self
                    .lookup(tutor.id, &subject_key, Some(&schedule))
                    .await?
                    .ok_or_else(|| {
                        Kk360Error::database_operation(format!(
                            "班级创建冲突后仍未找到班级: {subject_key}"
                        ))
                    })?;
                self.reconcile(class, &tutor, request.student_id).await
            }
            Err(e) => Err(e),
        }
    }

    async fn load_user(&self, user_id: i64, role: UserRole) -> Result<User> {
        match self.storage.get_user_by_id(user_id).await? {
            Some(user) if user.role == role => Ok(user),
            Some(user) => Err(Kk360Error::not_found(format!(
                "User {user_id} is a {}, expected {role}",
                user.role
            ))),
            None => Err(Kk360Error::not_found(format!("User {user_id} not found"))),
        }
    }

    async fn lookup(
        &self,
        tutor_id: i64,
        subject_key: &str,
        slot: Option<&Schedule>,
    ) -> Result<Option<Class>> {
        if let Some(slot) = slot
            && let Some(class) = self
                .storage
                .find_class_by_slot(tutor_id, subject_key, slot.day, &slot.start_time)
                .await?
        {
            return Ok(Some(class));
        }
        self.storage
            .find_oldest_class_by_subject(tutor_id, subject_key)
            .await
    }

    /// 复用已有班级：加入学生并回填标题和链接，两者同一事务提交
    async fn reconcile(&self, class: Class, tutor: &User, student_id: i64) -> Result<Class> {
        let mut backfill = ClassBackfill::default();
        if title_needs_backfill(class.title.as_deref()) {
            backfill.title = Some(class_title(&class.subject, &tutor.tutor_name()));
        }
        if link_needs_backfill(class.meeting_link.as_deref(), &self.meeting.provider_host) {
            backfill.meeting_link = Some(self.new_link(&class.subject_key));
        }

        if class.has_student(student_id) && backfill.is_empty() {
            return Ok(class);
        }

        if !backfill.is_empty() {
            debug!("Backfilling class {}: {:?}", class.id, backfill);
        }
        match self
            .storage
            .enroll_student(class.id, student_id, backfill)
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                warn!("Class {} disappeared while enrolling student {}", class.id, student_id);
                Err(Kk360Error::not_found(format!("Class {} not found", class.id)))
            }
        }
    }

    fn default_schedule(&self) -> Result<Schedule> {
        let day = self
            .meeting
            .default_day
            .parse::<Weekday>()
            .map_err(Kk360Error::validation)?;
        Ok(Schedule {
            day,
            start_time: self.meeting.default_start.clone(),
            end_time: self.meeting.default_end.clone(),
        })
    }

    pub(crate) fn new_link(&self, subject_key: &str) -> String {
        generate_meeting_link(
            &self.meeting.provider_host,
            &self.meeting.room_prefix,
            subject_key,
            chrono::Utc::now().timestamp_millis(),
        )
    }
}

/// 校验时段，缺少结束时间时取开始时间后 60 分钟
fn resolve_slot(slot: &SlotRequest) -> Result<Schedule> {
    let start_time = slot.start_time.trim().to_string();
    validate_time(&start_time).map_err(Kk360Error::validation)?;

    let end_time = match slot.end_time.as_deref().map(str::trim) {
        Some(end) if !end.is_empty() => {
            validate_time(end).map_err(Kk360Error::validation)?;
            end.to_string()
        }
        _ => add_minutes(&start_time, DEFAULT_SLOT_MINUTES).map_err(Kk360Error::validation)?,
    };

    Ok(Schedule {
        day: slot.day,
        start_time,
        end_time,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::attendance::entities::{Attendance, AttendanceStatus};
    use crate::models::class_sessions::entities::{ClassSession, SessionAction, SessionLog};
    use crate::models::classes::entities::ClassStatus;
    use crate::models::messages::entities::{Message, NewMessage};
    use crate::models::users::requests::CreateUserRequest;
    use crate::storage::sea_orm_storage::SeaOrmStorage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) fn meeting_config() -> MeetingConfig {
        MeetingConfig {
            provider_host: "meet.jit.si".to_string(),
            room_prefix: "KK360".to_string(),
            default_day: "Monday".to_string(),
            default_start: "10:00".to_string(),
            default_end: "11:00".to_string(),
        }
    }

    pub(crate) async fn memory_storage() -> Arc<dyn Storage> {
        Arc::new(SeaOrmStorage::new_in_memory().await.unwrap())
    }

    pub(crate) async fn create_user(
        storage: &Arc<dyn Storage>,
        username: &str,
        role: UserRole,
        display_name: Option<&str>,
    ) -> User {
        storage
            .create_user(CreateUserRequest {
                username: username.to_string(),
                email: format!("{username}@kk360.test"),
                password: "hash".to_string(),
                role,
                display_name: display_name.map(str::to_string),
            })
            .await
            .unwrap()
    }

    fn request(tutor: &User, student: &User, subject: &str, slot: Option<SlotRequest>) -> EnsureClassRequest {
        EnsureClassRequest {
            tutor_id: tutor.id,
            student_id: student.id,
            subject: subject.to_string(),
            slot,
        }
    }

    fn slot(day: Weekday, start: &str) -> Option<SlotRequest> {
        Some(SlotRequest {
            day,
            start_time: start.to_string(),
            end_time: None,
        })
    }

    #[tokio::test]
    async fn test_same_request_twice_returns_same_class() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("Ada Lovelace")).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;

        let first = resolver
            .ensure_class(request(&tutor, &student, "Physics", slot(Weekday::Monday, "10:00")))
            .await
            .unwrap();
        let second = resolver
            .ensure_class(request(&tutor, &student, "Physics", slot(Weekday::Monday, "10:00")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.student_ids, vec![student.id]);
        assert_eq!(first.title.as_deref(), Some("Physics - Ada Lovelace"));
        assert_eq!(first.schedule.end_time, "11:00");
    }

    #[tokio::test]
    async fn test_different_slot_falls_back_to_subject_match() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Student, None).await;

        let first = resolver
            .ensure_class(request(&tutor, &alice, "physics", slot(Weekday::Monday, "10:00")))
            .await
            .unwrap();
        let second = resolver
            .ensure_class(request(&tutor, &bob, "  PHYSICS ", slot(Weekday::Friday, "15:00")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.has_student(alice.id));
        assert!(second.has_student(bob.id));
        // 原时段保持不变
        assert_eq!(second.schedule.day, Weekday::Monday);
    }

    #[tokio::test]
    async fn test_stale_title_and_foreign_link_are_backfilled() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("Grace")).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;

        let class = resolver
            .ensure_class(request(&tutor, &student, "Physics", None))
            .await
            .unwrap();
        storage
            .enroll_student(
                class.id,
                student.id,
                ClassBackfill {
                    title: Some("Physics - 507f1f77bcf86cd799439011".to_string()),
                    meeting_link: Some("https://zoom.us/j/42".to_string()),
                },
            )
            .await
            .unwrap();

        let repaired = resolver
            .ensure_class(request(&tutor, &student, "Physics", None))
            .await
            .unwrap();
        assert_eq!(repaired.id, class.id);
        assert_eq!(repaired.title.as_deref(), Some("Physics - Grace"));
        let link = repaired.meeting_link.unwrap();
        assert!(link.starts_with("https://meet.jit.si/KK360-physics-"));
    }

    #[tokio::test]
    async fn test_human_title_and_provider_link_untouched() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("Grace")).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;

        let class = resolver
            .ensure_class(request(&tutor, &student, "Physics", None))
            .await
            .unwrap();
        let custom_link = "https://meet.jit.si/custom-room";
        storage
            .enroll_student(
                class.id,
                student.id,
                ClassBackfill {
                    title: Some("Evening Physics Club".to_string()),
                    meeting_link: Some(custom_link.to_string()),
                },
            )
            .await
            .unwrap();

        let again = resolver
            .ensure_class(request(&tutor, &student, "Physics", None))
            .await
            .unwrap();
        assert_eq!(again.title.as_deref(), Some("Evening Physics Club"));
        assert_eq!(again.meeting_link.as_deref(), Some(custom_link));
    }

    #[tokio::test]
    async fn test_default_schedule_and_fallback_tutor_name() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("   ")).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;

        let class = resolver
            .ensure_class(request(&tutor, &student, "Further Maths", None))
            .await
            .unwrap();
        assert_eq!(class.title.as_deref(), Some("Further Maths - Group"));
        assert_eq!(class.schedule.day, Weekday::Monday);
        assert_eq!(class.schedule.start_time, "10:00");
        assert_eq!(class.schedule.end_time, "11:00");
        assert!(
            class
                .meeting_link
                .unwrap()
                .starts_with("https://meet.jit.si/KK360-furthermaths-")
        );
    }

    #[tokio::test]
    async fn test_validation_and_unknown_users() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;

        let blank = resolver
            .ensure_class(request(&tutor, &student, "   ", None))
            .await;
        assert!(matches!(blank, Err(Kk360Error::Validation(_))));

        let bad_time = resolver
            .ensure_class(request(&tutor, &student, "Physics", slot(Weekday::Monday, "25:00")))
            .await;
        assert!(matches!(bad_time, Err(Kk360Error::Validation(_))));

        // 角色不匹配视为不存在
        let swapped = resolver
            .ensure_class(request(&student, &tutor, "Physics", None))
            .await;
        assert!(matches!(swapped, Err(Kk360Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_enroll_keeps_backfill_uncommitted() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let resolver = ClassResolver::new(&storage, &meeting);
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("Grace")).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let class = resolver
            .ensure_class(request(&tutor, &student, "Physics", None))
            .await
            .unwrap();

        // 学生不存在，外键约束使插入失败
        let result = storage
            .enroll_student(
                class.id,
                999_999,
                ClassBackfill {
                    title: Some("Renamed".to_string()),
                    meeting_link: None,
                },
            )
            .await;
        assert!(result.is_err());

        let stored = storage.get_class_by_id(class.id).await.unwrap().unwrap();
        assert_eq!(stored.title, class.title);
        assert_eq!(stored.student_ids, vec![student.id]);
    }

    #[tokio::test]
    async fn test_enroll_unknown_class_returns_none() {
        let storage = memory_storage().await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let result = storage
            .enroll_student(42, student.id, ClassBackfill::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    /// 第一次查找必定落空的存储，模拟另一个请求在查找之后、创建之前插入了班级
    struct LateLookupStorage {
        inner: Arc<dyn Storage>,
        slot_missed: AtomicBool,
        subject_missed: AtomicBool,
        creates: AtomicUsize,
    }

    impl LateLookupStorage {
        fn new(inner: Arc<dyn Storage>) -> Self {
            Self {
                inner,
                slot_missed: AtomicBool::new(false),
                subject_missed: AtomicBool::new(false),
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Storage for LateLookupStorage {
        async fn create_user(&self, user: CreateUserRequest) -> Result<User> {
            self.inner.create_user(user).await
        }
        async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
            self.inner.get_user_by_id(id).await
        }
        async fn get_user_by_username_or_email(&self, identifier: &str) -> Result<Option<User>> {
            self.inner.get_user_by_username_or_email(identifier).await
        }
        async fn update_last_login(&self, id: i64) -> Result<bool> {
            self.inner.update_last_login(id).await
        }
        async fn get_class_by_id(&self, class_id: i64) -> Result<Option<Class>> {
            self.inner.get_class_by_id(class_id).await
        }
        async fn find_class_by_slot(
            &self,
            tutor_id: i64,
            subject_key: &str,
            day: Weekday,
            start_time: &str,
        ) -> Result<Option<Class>> {
            if !self.slot_missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner
                .find_class_by_slot(tutor_id, subject_key, day, start_time)
                .await
        }
        async fn find_oldest_class_by_subject(
            &self,
            tutor_id: i64,
            subject_key: &str,
        ) -> Result<Option<Class>> {
            if !self.subject_missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner
                .find_oldest_class_by_subject(tutor_id, subject_key)
                .await
        }
        async fn create_class(&self, class: NewClass) -> Result<Class> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_class(class).await
        }
        async fn enroll_student(
            &self,
            class_id: i64,
            student_id: i64,
            backfill: ClassBackfill,
        ) -> Result<Option<Class>> {
            self.inner.enroll_student(class_id, student_id, backfill).await
        }
        async fn update_class_schedule(
            &self,
            class_id: i64,
            schedule: Option<Schedule>,
            status: Option<ClassStatus>,
        ) -> Result<Option<Class>> {
            self.inner
                .update_class_schedule(class_id, schedule, status)
                .await
        }
        async fn sync_meeting_link_for_subject(
            &self,
            tutor_id: i64,
            subject_key: &str,
            meeting_link: &str,
        ) -> Result<u64> {
            self.inner
                .sync_meeting_link_for_subject(tutor_id, subject_key, meeting_link)
                .await
        }
        async fn list_classes_for_user(&self, user_id: i64, role: &UserRole) -> Result<Vec<Class>> {
            self.inner.list_classes_for_user(user_id, role).await
        }
        async fn get_open_session_for_class(&self, class_id: i64) -> Result<Option<ClassSession>> {
            self.inner.get_open_session_for_class(class_id).await
        }
        async fn create_session(
            &self,
            class_id: i64,
            started_by: i64,
            meeting_link: &str,
        ) -> Result<ClassSession> {
            self.inner
                .create_session(class_id, started_by, meeting_link)
                .await
        }
        async fn get_session_by_id(&self, session_id: i64) -> Result<Option<ClassSession>> {
            self.inner.get_session_by_id(session_id).await
        }
        async fn append_session_log(
            &self,
            session_id: i64,
            user_id: i64,
            role: &UserRole,
            action: SessionAction,
        ) -> Result<SessionLog> {
            self.inner
                .append_session_log(session_id, user_id, role, action)
                .await
        }
        async fn list_session_logs(&self, session_id: i64) -> Result<Vec<SessionLog>> {
            self.inner.list_session_logs(session_id).await
        }
        async fn touch_session_heartbeat(&self, session_id: i64) -> Result<Option<ClassSession>> {
            self.inner.touch_session_heartbeat(session_id).await
        }
        async fn end_session(&self, session_id: i64) -> Result<bool> {
            self.inner.end_session(session_id).await
        }
        async fn end_silent_sessions(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
            self.inner.end_silent_sessions(cutoff).await
        }
        async fn init_attendance(
            &self,
            class_id: i64,
            student_ids: &[i64],
            date: &str,
        ) -> Result<u64> {
            self.inner.init_attendance(class_id, student_ids, date).await
        }
        async fn mark_attendance(
            &self,
            class_id: i64,
            student_id: i64,
            date: &str,
            status: AttendanceStatus,
        ) -> Result<Attendance> {
            self.inner
                .mark_attendance(class_id, student_id, date, status)
                .await
        }
        async fn list_attendance(
            &self,
            class_id: i64,
            date: Option<&str>,
        ) -> Result<Vec<Attendance>> {
            self.inner.list_attendance(class_id, date).await
        }
        async fn create_message(&self, message: NewMessage) -> Result<Message> {
            self.inner.create_message(message).await
        }
        async fn get_message_by_id(&self, message_id: i64) -> Result<Option<Message>> {
            self.inner.get_message_by_id(message_id).await
        }
        async fn edit_message(&self, message_id: i64, content: &str) -> Result<Option<Message>> {
            self.inner.edit_message(message_id, content).await
        }
        async fn delete_message(&self, message_id: i64) -> Result<bool> {
            self.inner.delete_message(message_id).await
        }
        async fn mark_message_read(
            &self,
            message_id: i64,
            user_id: i64,
        ) -> Result<chrono::DateTime<chrono::Utc>> {
            self.inner.mark_message_read(message_id, user_id).await
        }
        async fn list_conversation_messages(
            &self,
            conversation_id: &str,
            limit: u64,
            before: Option<i64>,
        ) -> Result<Vec<Message>> {
            self.inner
                .list_conversation_messages(conversation_id, limit, before)
                .await
        }
    }

    #[tokio::test]
    async fn test_concurrent_create_falls_back_to_existing_class() {
        let storage = memory_storage().await;
        let meeting = meeting_config();
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, Some("Ada")).await;
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Student, None).await;

        // 另一个请求先创建了班级
        let first = ClassResolver::new(&storage, &meeting)
            .ensure_class(request(&tutor, &alice, "Physics", slot(Weekday::Monday, "10:00")))
            .await
            .unwrap();

        let late = Arc::new(LateLookupStorage::new(storage.clone()));
        let late_storage: Arc<dyn Storage> = late.clone();
        let second = ClassResolver::new(&late_storage, &meeting)
            .ensure_class(request(&tutor, &bob, "Physics", slot(Weekday::Monday, "10:00")))
            .await
            .unwrap();

        assert_eq!(late.creates.load(Ordering::SeqCst), 1);
        assert_eq!(second.id, first.id);
        assert!(second.has_student(alice.id));
        assert!(second.has_student(bob.id));

        let classes = storage
            .list_classes_for_user(tutor.id, &UserRole::Tutor)
            .await
            .unwrap();
        assert_eq!(classes.len(), 1);
    }

    #[test]
    fn test_resolve_slot_end_time() {
        let schedule = resolve_slot(&SlotRequest {
            day: Weekday::Tuesday,
            start_time: "09:30".to_string(),
            end_time: None,
        })
        .unwrap();
        assert_eq!(schedule.end_time, "10:30");

        let schedule = resolve_slot(&SlotRequest {
            day: Weekday::Tuesday,
            start_time: "09:30".to_string(),
            end_time: Some("11:15".to_string()),
        })
        .unwrap();
        assert_eq!(schedule.end_time, "11:15");
    }
}
