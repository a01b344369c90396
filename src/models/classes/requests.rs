use super::entities::{ClassStatus, Weekday};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 时段（结束时间可选，缺省为开始时间后 60 分钟）
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub struct SlotRequest {
    pub day: Weekday,
    pub start_time: String,
    pub end_time: Option<String>,
}

// 查找或创建班级请求
//
// 同一教师、同一科目（忽略大小写和首尾空白）优先复用已有班级，
// 并把学生加入该班级。
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub struct EnsureClassRequest {
    pub tutor_id: i64,
    pub student_id: i64,
    pub subject: String,
    pub slot: Option<SlotRequest>,
}

// 修改班级时间或状态
//
// 星期、开始时间和结束时间必须同时给出；时段变化且班级仍为 scheduled 时
// 状态自动变为 rescheduled，显式给出的状态优先。
#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/class.ts")]
pub struct UpdateScheduleRequest {
    pub day: Option<Weekday>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<ClassStatus>,
}
