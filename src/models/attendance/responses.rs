use super::entities::Attendance;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 考勤列表响应
#[derive(Debug, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/attendance.ts")]
pub struct AttendanceListResponse {
    pub class_id: i64,
    pub items: Vec<Attendance>,
}
