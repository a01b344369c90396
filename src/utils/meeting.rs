//! 会议链接与班级标题规则

use once_cell::sync::Lazy;
use regex::Regex;

// 旧数据中以 24 位十六进制 ID 结尾的标题，例如 "Physics - 507f1f77bcf86cd799439011"
static STALE_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i) - [0-9a-f]{24}$").expect("Invalid stale title regex"));

/// 科目规范化：去除首尾空白并转小写
pub fn normalize_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}

/// 由规范化科目生成链接中的 slug，只保留 `[a-z0-9]`
pub fn subject_slug(subject_key: &str) -> String {
    subject_key
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// 班级标题 "{subject} - {tutorName}"
pub fn class_title(subject: &str, tutor_name: &str) -> String {
    format!("{} - {}", subject.trim(), tutor_name)
}

/// 标题缺失或为旧格式时需要重写
pub fn title_needs_backfill(title: Option<&str>) -> bool {
    match title.map(str::trim) {
        None | Some("") => true,
        Some(title) => STALE_TITLE_RE.is_match(title),
    }
}

/// 链接缺失或不属于会议服务时需要重新生成
pub fn link_needs_backfill(link: Option<&str>, provider_host: &str) -> bool {
    match link.map(str::trim) {
        None | Some("") => true,
        Some(link) => !link.contains(provider_host),
    }
}

/// 生成会议链接 `https://{host}/{prefix}-{slug}-{unix_ms}`
pub fn generate_meeting_link(
    provider_host: &str,
    room_prefix: &str,
    subject_key: &str,
    unix_ms: i64,
) -> String {
    format!(
        "https://{}/{}-{}-{}",
        provider_host,
        room_prefix,
        subject_slug(subject_key),
        unix_ms
    )
}
