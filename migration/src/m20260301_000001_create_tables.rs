use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建用户表
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::Role).string().not_null())
                    .col(ColumnDef::new(Users::Status).string().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string().null())
                    .col(ColumnDef::new(Users::LastLogin).big_integer().null())
                    .col(ColumnDef::new(Users::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // 创建班级表
        manager
            .create_table(
                Table::create()
                    .table(Classes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Classes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Classes::TutorId).big_integer().not_null())
                    .col(ColumnDef::new(Classes::Title).string().null())
                    .col(ColumnDef::new(Classes::Subject).string().not_null())
                    .col(ColumnDef::new(Classes::SubjectKey).string().not_null())
                    .col(ColumnDef::new(Classes::ScheduleDay).string().not_null())
                    .col(ColumnDef::new(Classes::ScheduleStart).string().not_null())
                    .col(ColumnDef::new(Classes::ScheduleEnd).string().not_null())
                    .col(ColumnDef::new(Classes::MeetingLink).string().null())
                    .col(ColumnDef::new(Classes::Status).string().not_null())
                    .col(ColumnDef::new(Classes::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Classes::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Classes::Table, Classes::TutorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建班级学生关联表
        manager
            .create_table(
                Table::create()
                    .table(ClassStudents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClassStudents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClassStudents::ClassId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassStudents::StudentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassStudents::JoinedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ClassStudents::Table, ClassStudents::ClassId)
                            .to(Classes::Table, Classes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ClassStudents::Table, ClassStudents::StudentId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建课堂会话表
        manager
            .create_table(
                Table::create()
                    .table(ClassSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClassSessions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClassSessions::ClassId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassSessions::StartedBy)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClassSessions::MeetingLink).string().not_null())
                    .col(
                        ColumnDef::new(ClassSessions::StartedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassSessions::LastHeartbeatAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClassSessions::EndedAt).big_integer().null())
                    .col(
                        ColumnDef::new(ClassSessions::ActiveParticipants)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ClassSessions::Table, ClassSessions::ClassId)
                            .to(Classes::Table, Classes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建会话日志表
        manager
            .create_table(
                Table::create()
                    .table(ClassSessionLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClassSessionLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClassSessionLogs::SessionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClassSessionLogs::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClassSessionLogs::Role).string().not_null())
                    .col(ColumnDef::new(ClassSessionLogs::Action).string().not_null())
                    .col(
                        ColumnDef::new(ClassSessionLogs::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ClassSessionLogs::Table, ClassSessionLogs::SessionId)
                            .to(ClassSessions::Table, ClassSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一教师的同一科目在同一时段只能有一个班级
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_classes_tutor_subject_slot")
                    .table(Classes::Table)
                    .col(Classes::TutorId)
                    .col(Classes::SubjectKey)
                    .col(Classes::ScheduleDay)
                    .col(Classes::ScheduleStart)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_classes_tutor_id")
                    .table(Classes::Table)
                    .col(Classes::TutorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_class_students_class_student")
                    .table(ClassStudents::Table)
                    .col(ClassStudents::ClassId)
                    .col(ClassStudents::StudentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_class_students_student_id")
                    .table(ClassStudents::Table)
                    .col(ClassStudents::StudentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_class_sessions_class_id")
                    .table(ClassSessions::Table)
                    .col(ClassSessions::ClassId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_class_session_logs_session_id")
                    .table(ClassSessionLogs::Table)
                    .col(ClassSessionLogs::SessionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 按照创建的相反顺序删除
        manager
            .drop_table(Table::drop().table(ClassSessionLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClassSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClassStudents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Classes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    Role,
    Status,
    DisplayName,
    LastLogin,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Classes {
    #[sea_orm(iden = "classes")]
    Table,
    Id,
    TutorId,
    Title,
    Subject,
    SubjectKey,
    ScheduleDay,
    ScheduleStart,
    ScheduleEnd,
    MeetingLink,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ClassStudents {
    #[sea_orm(iden = "class_students")]
    Table,
    Id,
    ClassId,
    StudentId,
    JoinedAt,
}

#[derive(DeriveIden)]
enum ClassSessions {
    #[sea_orm(iden = "class_sessions")]
    Table,
    Id,
    ClassId,
    StartedBy,
    MeetingLink,
    StartedAt,
    LastHeartbeatAt,
    EndedAt,
    ActiveParticipants,
}

#[derive(DeriveIden)]
enum ClassSessionLogs {
    #[sea_orm(iden = "class_session_logs")]
    Table,
    Id,
    SessionId,
    UserId,
    Role,
    Action,
    CreatedAt,
}
