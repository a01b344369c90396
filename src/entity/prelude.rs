//! 预导入模块，方便使用

pub use super::attendance::{
    ActiveModel as AttendanceActiveModel, Entity as AttendanceRecords, Model as AttendanceModel,
};
pub use super::class_session_logs::{
    ActiveModel as ClassSessionLogActiveModel, Entity as ClassSessionLogs,
    Model as ClassSessionLogModel,
};
pub use super::class_sessions::{
    ActiveModel as ClassSessionActiveModel, Entity as ClassSessions, Model as ClassSessionModel,
};
pub use super::class_students::{
    ActiveModel as ClassStudentActiveModel, Entity as ClassStudents, Model as ClassStudentModel,
};
pub use super::classes::{ActiveModel as ClassActiveModel, Entity as Classes, Model as ClassModel};
pub use super::message_reads::{
    ActiveModel as MessageReadActiveModel, Entity as MessageReads, Model as MessageReadModel,
};
pub use super::messages::{
    ActiveModel as MessageActiveModel, Entity as Messages, Model as MessageModel,
};
pub use super::users::{ActiveModel as UserActiveModel, Entity as Users, Model as UserModel};
