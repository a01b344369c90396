use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub argon2: Argon2Config,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub meeting: MeetingConfig,
    pub session: SessionConfig,
    pub realtime: RealtimeConfig,
}

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub system_name: String,
    pub environment: String,
    pub log_level: String,
    /// 首次启动时创建的管理员
    pub admin_username: String,
    #[serde(skip_serializing, default)]
    pub admin_password: String,
    pub admin_email: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub unix_socket_path: String,
    pub workers: usize,
    pub max_workers: usize,
    pub timeouts: TimeoutConfig,
    pub limits: LimitConfig,
}

/// 超时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub client_request: u64,
    pub client_disconnect: u64,
    pub keep_alive: u64,
}

/// 限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitConfig {
    pub max_payload_size: usize,
}

/// JWT 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(skip_serializing, default)] // 不序列化到JSON响应中
    pub secret: String,
    pub access_token_expiry: i64,
}

/// Argon2 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,    // 数据库连接 URL（从 scheme 自动推断类型）
    pub pool_size: u32, // 连接池大小
    pub timeout: u64,   // 连接超时 (秒)
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age: usize,
}

/// 会议链接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    pub provider_host: String, // 会议服务域名，链接不含该域名时会重新生成
    pub room_prefix: String,
    pub default_day: String,
    pub default_start: String,
    pub default_end: String,
}

/// 课堂会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub heartbeat_interval_secs: u64,
    pub stale_after_secs: i64,
    pub end_after_secs: i64,
    pub reaper_interval_secs: u64,
}

/// 实时通信配置（客户端使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub server_url: String,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub typing_expiry_ms: u64,
    pub typing_debounce_ms: u64,
    pub event_buffer: usize,
}
