//! SeaORM 存储实现
//!
//! 统一的数据库存储层，支持 SQLite、PostgreSQL 和 MySQL。

mod attendance;
mod class_sessions;
mod classes;
mod messages;
mod users;

use crate::config::AppConfig;
use crate::errors::{Kk360Error, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::info;

/// SeaORM 存储实现
#[derive(Clone)]
pub struct SeaOrmStorage {
    pub(crate) db: DatabaseConnection,
}

/// 数据库错误转换：唯一约束冲突单独识别，其余附带上下文
pub(crate) fn db_error(context: &str, err: DbErr) -> Kk360Error {
    match Kk360Error::from(err) {
        Kk360Error::Conflict(msg) => Kk360Error::conflict(format!("{context}: {msg}")),
        other => Kk360Error::database_operation(format!("{context}: {}", other.message())),
    }
}

impl SeaOrmStorage {
    /// 创建新的 SeaORM 存储实例
    pub async fn new_async() -> Result<Self> {
        let config = AppConfig::get();
        let db_url = Self::build_database_url(&config.database.url)?;

        // 根据数据库类型选择连接方式
        let db = if db_url.starts_with("sqlite://") {
            Self::connect_sqlite(&db_url, config).await?
        } else {
            Self::connect_generic(&db_url, config).await?
        };

        let storage = Self::from_connection(db).await?;
        info!("SeaORM 存储初始化完成，数据库: {}", db_url);
        Ok(storage)
    }

    /// 使用已有连接创建存储并运行迁移
    pub async fn from_connection(db: DatabaseConnection) -> Result<Self> {
        Migrator::up(&db, None)
            .await
            .map_err(|e| Kk360Error::database_operation(format!("数据库迁移失败: {e}")))?;
        Ok(Self { db })
    }

    /// 内存 SQLite 存储（单连接，测试使用）
    pub async fn new_in_memory() -> Result<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt)
            .await
            .map_err(|e| Kk360Error::database_connection(format!("SQLite 连接失败: {e}")))?;
        Self::from_connection(db).await
    }

    /// SQLite 专用连接（WAL + pragma 优化）
    async fn connect_sqlite(url: &str, config: &AppConfig) -> Result<DatabaseConnection> {
        use sea_orm::SqlxSqliteConnector;
        use sea_orm::sqlx::sqlite::{
            SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
        };
        use std::str::FromStr;

        let opt = SqliteConnectOptions::from_str(url)
            .map_err(|e| Kk360Error::database_config(format!("SQLite URL 解析失败: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database.pool_size)
            .min_connections(1)
            .test_before_acquire(true)
            .acquire_timeout(Duration::from_secs(config.database.timeout))
            .idle_timeout(Duration::from_secs(300))
            .connect_with(opt)
            .await
            .map_err(|e| Kk360Error::database_connection(format!("SQLite 连接失败: {e}")))?;

        Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
    }

    /// 通用连接（PostgreSQL、MySQL 等）
    async fn connect_generic(url: &str, config: &AppConfig) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(url);
        opt.max_connections(config.database.pool_size)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(config.database.timeout))
            .acquire_timeout(Duration::from_secs(config.database.timeout))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .sqlx_logging(false)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        Database::connect(opt)
            .await
            .map_err(|e| Kk360Error::database_connection(format!("无法连接到数据库: {e}")))
    }

    /// 从 URL 自动推断数据库类型并构建连接 URL
    fn build_database_url(url: &str) -> Result<String> {
        if url.starts_with("sqlite://") || url.starts_with("sqlite::memory:") {
            Ok(url.to_string())
        } else if url.ends_with(".db") || url.ends_with(".sqlite") {
            Ok(format!("sqlite://{url}?mode=rwc"))
        } else if url.starts_with("postgres://")
            || url.starts_with("postgresql://")
            || url.starts_with("mysql://")
            || url.starts_with("mariadb://")
        {
            Ok(url.to_string())
        } else {
            Err(Kk360Error::database_config(format!(
                "无法从 URL 推断数据库类型: {url}. 支持: sqlite://, postgres://, mysql://, 或 .db/.sqlite 文件路径"
            )))
        }
    }
}

// Storage trait 实现
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
use crate::storage::Storage;
use async_trait::async_trait;

#[async_trait]
impl Storage for SeaOrmStorage {
    // 用户模块
    async fn create_user(&self, user: CreateUserRequest) -> Result<User> {
        self.create_user_impl(user).await
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.get_user_by_id_impl(id).await
    }

    async fn get_user_by_username_or_email(&self, identifier: &str) -> Result<Option<User>> {
        self.get_user_by_username_or_email_impl(identifier).await
    }

    async fn update_last_login(&self, id: i64) -> Result<bool> {
        self.update_last_login_impl(id).await
    }

    // 班级模块
    async fn get_class_by_id(&self, class_id: i64) -> Result<Option<Class>> {
        self.get_class_by_id_impl(class_id).await
    }

    async fn find_class_by_slot(
        &self,
        tutor_id: i64,
        subject_key: &str,
        day: Weekday,
        start_time: &str,
    ) -> Result<Option<Class>> {
        self.find_class_by_slot_impl(tutor_id, subject_key, day, start_time)
            .await
    }

    async fn find_oldest_class_by_subject(
        &self,
        tutor_id: i64,
        subject_key: &str,
    ) -> Result<Option<Class>> {
        self.find_oldest_class_by_subject_impl(tutor_id, subject_key)
            .await
    }

    async fn create_class(&self, class: NewClass) -> Result<Class> {
        self.create_class_impl(class).await
    }

    async fn enroll_student(
        &self,
        class_id: i64,
        student_id: i64,
        backfill: ClassBackfill,
    ) -> Result<Option<Class>> {
        self.enroll_student_impl(class_id, student_id, backfill)
            .await
    }

    async fn update_class_schedule(
        &self,
        class_id: i64,
        schedule: Option<Schedule>,
        status: Option<ClassStatus>,
    ) -> Result<Option<Class>> {
        self.update_class_schedule_impl(class_id, schedule, status)
            .await
    }

    async fn sync_meeting_link_for_subject(
        &self,
        tutor_id: i64,
        subject_key: &str,
        meeting_link: &str,
    ) -> Result<u64> {
        self.sync_meeting_link_for_subject_impl(tutor_id, subject_key, meeting_link)
            .await
    }

    async fn list_classes_for_user(&self, user_id: i64, role: &UserRole) -> Result<Vec<Class>> {
        self.list_classes_for_user_impl(user_id, role).await
    }

    // 课堂会话模块
    async fn get_open_session_for_class(&self, class_id: i64) -> Result<Option<ClassSession>> {
        self.get_open_session_for_class_impl(class_id).await
    }

    async fn create_session(
        &self,
        class_id: i64,
        started_by: i64,
        meeting_link: &str,
    ) -> Result<ClassSession> {
        self.create_session_impl(class_id, started_by, meeting_link)
            .await
    }

    async fn get_session_by_id(&self, session_id: i64) -> Result<Option<ClassSession>> {
        self.get_session_by_id_impl(session_id).await
    }

    async fn append_session_log(
        &self,
        session_id: i64,
        user_id: i64,
        role: &UserRole,
        action: SessionAction,
    ) -> Result<SessionLog> {
        self.append_session_log_impl(session_id, user_id, role, action)
            .await
    }

    async fn list_session_logs(&self, session_id: i64) -> Result<Vec<SessionLog>> {
        self.list_session_logs_impl(session_id).await
    }

    async fn touch_session_heartbeat(&self, session_id: i64) -> Result<Option<ClassSession>> {
        self.touch_session_heartbeat_impl(session_id).await
    }

    async fn end_session(&self, session_id: i64) -> Result<bool> {
        self.end_session_impl(session_id).await
    }

    async fn end_silent_sessions(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        self.end_silent_sessions_impl(cutoff).await
    }

    // 考勤模块
    async fn init_attendance(
        &self,
        class_id: i64,
        student_ids: &[i64],
        date: &str,
    ) -> Result<u64> {
        self.init_attendance_impl(class_id, student_ids, date).await
    }

    async fn mark_attendance(
        &self,
        class_id: i64,
        student_id: i64,
        date: &str,
        status: AttendanceStatus,
    ) -> Result<Attendance> {
        self.mark_attendance_impl(class_id, student_id, date, status)
            .await
    }

    async fn list_attendance(&self, class_id: i64, date: Option<&str>) -> Result<Vec<Attendance>> {
        self.list_attendance_impl(class_id, date).await
    }

    // 聊天消息模块
    async fn create_message(&self, message: NewMessage) -> Result<Message> {
        self.create_message_impl(message).await
    }

    async fn get_message_by_id(&self, message_id: i64) -> Result<Option<Message>> {
        self.get_message_by_id_impl(message_id).await
    }

    async fn edit_message(&self, message_id: i64, content: &str) -> Result<Option<Message>> {
        self.edit_message_impl(message_id, content).await
    }

    async fn delete_message(&self, message_id: i64) -> Result<bool> {
        self.delete_message_impl(message_id).await
    }

    async fn mark_message_read(
        &self,
        message_id: i64,
        user_id: i64,
    ) -> Result<chrono::DateTime<chrono::Utc>> {
        self.mark_message_read_impl(message_id, user_id).await
    }

    async fn list_conversation_messages(
        &self,
        conversation_id: &str,
        limit: u64,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.list_conversation_messages_impl(conversation_id, limit, before)
            .await
    }
}
