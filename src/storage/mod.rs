use std::sync::Arc;

use crate::models::{
    attendance::entities::{Attendance, AttendanceStatus},
    class_sessions::entities::{ClassSession, SessionAction, SessionLog},
    classes::entities::{Class, ClassBackfill, ClassStatus, NewClass, Schedule, Weekday},
    messages::entities::{Message, NewMessage},
    users::{
        entities::{User, UserRole},
        requests::CreateUserRequest,
    },
};

use crate::errors::Result;

pub mod sea_orm_storage;

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// 用户管理方法
    // 创建用户（password 字段为已哈希的密码）
    async fn create_user(&self, user: CreateUserRequest) -> Result<User>;
    // 通过ID获取用户信息
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>>;
    // 通过用户名或邮箱获取用户信息
    async fn get_user_by_username_or_email(&self, identifier: &str) -> Result<Option<User>>;
    // 更新用户最后登录时间
    async fn update_last_login(&self, id: i64) -> Result<bool>;

    /// 班级管理方法
    // 通过ID获取班级信息
    async fn get_class_by_id(&self, class_id: i64) -> Result<Option<Class>>;
    // 按教师、科目和时段查找班级
    async fn find_class_by_slot(
        &self,
        tutor_id: i64,
        subject_key: &str,
        day: Weekday,
        start_time: &str,
    ) -> Result<Option<Class>>;
    // 按教师和科目查找最早创建的班级
    async fn find_oldest_class_by_subject(
        &self,
        tutor_id: i64,
        subject_key: &str,
    ) -> Result<Option<Class>>;
    // 创建班级，唯一索引冲突时返回 Conflict
    async fn create_class(&self, class: NewClass) -> Result<Class>;
    // 学生加入班级（幂等）并回填字段，同一事务提交；班级不存在时返回 None
    async fn enroll_student(
        &self,
        class_id: i64,
        student_id: i64,
        backfill: ClassBackfill,
    ) -> Result<Option<Class>>;
    // 修改时段和状态，时段冲突时返回 Conflict
    async fn update_class_schedule(
        &self,
        class_id: i64,
        schedule: Option<Schedule>,
        status: Option<ClassStatus>,
    ) -> Result<Option<Class>>;
    // 将会议链接同步到教师同科目的全部班级，返回更新数量
    async fn sync_meeting_link_for_subject(
        &self,
        tutor_id: i64,
        subject_key: &str,
        meeting_link: &str,
    ) -> Result<u64>;
    // 列出用户可见的班级
    async fn list_classes_for_user(&self, user_id: i64, role: &UserRole) -> Result<Vec<Class>>;

    /// 课堂会话方法
    // 获取班级最近一个未结束的会话
    async fn get_open_session_for_class(&self, class_id: i64) -> Result<Option<ClassSession>>;
    // 创建会话
    async fn create_session(
        &self,
        class_id: i64,
        started_by: i64,
        meeting_link: &str,
    ) -> Result<ClassSession>;
    // 通过ID获取会话
    async fn get_session_by_id(&self, session_id: i64) -> Result<Option<ClassSession>>;
    // 追加会话日志并更新在线人数
    async fn append_session_log(
        &self,
        session_id: i64,
        user_id: i64,
        role: &UserRole,
        action: SessionAction,
    ) -> Result<SessionLog>;
    // 列出会话日志
    async fn list_session_logs(&self, session_id: i64) -> Result<Vec<SessionLog>>;
    // 刷新心跳时间
    async fn touch_session_heartbeat(&self, session_id: i64) -> Result<Option<ClassSession>>;
    // 结束会话
    async fn end_session(&self, session_id: i64) -> Result<bool>;
    // 结束心跳早于 cutoff 的全部会话，返回数量
    async fn end_silent_sessions(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;

    /// 考勤方法
    // 为尚无当天记录的学生写入缺勤记录，返回新增数量
    async fn init_attendance(
        &self,
        class_id: i64,
        student_ids: &[i64],
        date: &str,
    ) -> Result<u64>;
    // 设置考勤状态（不存在则创建）
    async fn mark_attendance(
        &self,
        class_id: i64,
        student_id: i64,
        date: &str,
        status: AttendanceStatus,
    ) -> Result<Attendance>;
    // 列出班级考勤
    async fn list_attendance(&self, class_id: i64, date: Option<&str>) -> Result<Vec<Attendance>>;

    /// 聊天消息方法
    async fn create_message(&self, message: NewMessage) -> Result<Message>;
    async fn get_message_by_id(&self, message_id: i64) -> Result<Option<Message>>;
    async fn edit_message(&self, message_id: i64, content: &str) -> Result<Option<Message>>;
    // 软删除
    async fn delete_message(&self, message_id: i64) -> Result<bool>;
    // 标记已读（幂等），返回已读时间
    async fn mark_message_read(
        &self,
        message_id: i64,
        user_id: i64,
    ) -> Result<chrono::DateTime<chrono::Utc>>;
    // 获取会话历史，按时间正序返回 before 之前最新的 limit 条
    async fn list_conversation_messages(
        &self,
        conversation_id: &str,
        limit: u64,
        before: Option<i64>,
    ) -> Result<Vec<Message>>;
}

pub async fn create_storage() -> Result<Arc<dyn Storage>> {
    let storage = sea_orm_storage::SeaOrmStorage::new_async().await?;
    Ok(Arc::new(storage))
}
