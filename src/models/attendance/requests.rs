use super::entities::AttendanceStatus;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// 考勤查询参数
#[derive(Debug, Default, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/attendance.ts")]
pub struct AttendanceQuery {
    pub date: Option<String>,
}

// 单个学生的考勤修改
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/attendance.ts")]
pub struct AttendanceMark {
    pub student_id: i64,
    pub status: AttendanceStatus,
}

// 批量修改考勤，缺省日期为当天（UTC）
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../frontend/src/types/generated/attendance.ts")]
pub struct UpdateAttendanceRequest {
    pub date: Option<String>,
    pub records: Vec<AttendanceMark>,
}
