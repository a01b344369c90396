use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 星期
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<Weekday>().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Weekday {
    type Err = String;

    // 大小写不敏感
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" => Ok(Weekday::Monday),
            "tuesday" => Ok(Weekday::Tuesday),
            "wednesday" => Ok(Weekday::Wednesday),
            "thursday" => Ok(Weekday::Thursday),
            "friday" => Ok(Weekday::Friday),
            "saturday" => Ok(Weekday::Saturday),
            "sunday" => Ok(Weekday::Sunday),
            _ => Err(format!("Invalid weekday: {s}")),
        }
    }
}

// 上课时间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub struct Schedule {
    pub day: Weekday,
    pub start_time: String, // HH:MM
    pub end_time: String,   // HH:MM
}

impl Schedule {
    /// 判断是否为同一时段（只比较星期与开始时间）
    pub fn same_slot(&self, day: Weekday, start_time: &str) -> bool {
        self.day == day && self.start_time == start_time
    }
}

// 班级状态
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub enum ClassStatus {
    Scheduled,
    Cancelled,
    Completed,
    Rescheduled,
}

impl<'de> Deserialize<'de> for ClassStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<ClassStatus>().map_err(|_| {
            serde::de::Error::custom(format!(
                "无效的班级状态: '{s}'. 支持的状态: scheduled, cancelled, completed, rescheduled"
            ))
        })
    }
}

impl std::fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassStatus::Scheduled => write!(f, "scheduled"),
            ClassStatus::Cancelled => write!(f, "cancelled"),
            ClassStatus::Completed => write!(f, "completed"),
            ClassStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

impl std::str::FromStr for ClassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(ClassStatus::Scheduled),
            "cancelled" => Ok(ClassStatus::Cancelled),
            "completed" => Ok(ClassStatus::Completed),
            "rescheduled" => Ok(ClassStatus::Rescheduled),
            _ => Err(format!("Invalid class status: {s}")),
        }
    }
}

// 班级实体
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub struct Class {
    pub id: i64,
    pub title: Option<String>,
    pub subject: String,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub subject_key: String,
    pub tutor_id: i64,
    pub student_ids: Vec<i64>,
    pub schedule: Schedule,
    pub meeting_link: Option<String>,
    pub status: ClassStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Class {
    pub fn has_student(&self, student_id: i64) -> bool {
        self.student_ids.contains(&student_id)
    }

    /// 用户是否可以进入该班级的课堂
    pub fn is_member(&self, user_id: i64) -> bool {
        self.tutor_id == user_id || self.has_student(user_id)
    }
}

// 新建班级（写入存储前）
#[derive(Debug, Clone)]
pub struct NewClass {
    pub tutor_id: i64,
    pub title: String,
    pub subject: String,
    pub subject_key: String,
    pub schedule: Schedule,
    pub meeting_link: String,
    pub student_id: i64,
}

// 班级字段回填，`None` 表示不修改
#[derive(Debug, Clone, Default)]
pub struct ClassBackfill {
    pub title: Option<String>,
    pub meeting_link: Option<String>,
}

impl ClassBackfill {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.meeting_link.is_none()
    }
}
