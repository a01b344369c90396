use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Result as ActixResult};
use tracing::{error, info};

use super::ClassService;
use crate::errors::{Kk360Error, Result};
use crate::middlewares::RequireJWT;
use crate::models::classes::entities::{Class, ClassStatus, Schedule};
use crate::models::classes::requests::UpdateScheduleRequest;
use crate::models::users::entities::{User, UserRole};
use crate::models::{ApiResponse, ErrorCode};
use crate::storage::Storage;
use crate::utils::validate::validate_time;

pub async fn update_schedule(
    service: &ClassService,
    request: &HttpRequest,
    class_id: i64,
    update: UpdateScheduleRequest,
) -> ActixResult<HttpResponse> {
    let Some(actor) = RequireJWT::extract_user_claims(request) else {
        return Ok(HttpResponse::Unauthorized().json(ApiResponse::error_empty(
            ErrorCode::Unauthorized,
            "Unauthorized: missing user id",
        )));
    };
    let storage = service.get_storage(request);

    match apply_schedule_update(&storage, class_id, &actor, update).await {
        Ok(class) => {
            info!(
                "Class {} schedule updated by user {}: {} {}-{} ({})",
                class.id,
                actor.id,
                class.schedule.day,
                class.schedule.start_time,
                class.schedule.end_time,
                class.status
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(class, "Class schedule updated")))
        }
        Err(Kk360Error::Validation(msg)) => Ok(HttpResponse::BadRequest().json(
            ApiResponse::error_empty(ErrorCode::ClassScheduleInvalid, msg),
        )),
        Err(Kk360Error::NotFound(msg)) => Ok(HttpResponse::NotFound()
            .json(ApiResponse::error_empty(ErrorCode::ClassNotFound, msg))),
        Err(Kk360Error::Authorization(msg)) => Ok(HttpResponse::Forbidden().json(
            ApiResponse::error_empty(ErrorCode::ClassPermissionDenied, msg),
        )),
        Err(Kk360Error::Conflict(_)) => Ok(HttpResponse::Conflict().json(
            ApiResponse::error_empty(
                ErrorCode::ClassScheduleConflict,
                "Another class of this tutor and subject already uses that slot",
            ),
        )),
        Err(e) => {
            error!("Failed to update schedule of class {}: {}", class_id, e);
            Ok(HttpResponse::InternalServerError().json(ApiResponse::error_empty(
                ErrorCode::ClassUpdateFailed,
                "Failed to update class schedule",
            )))
        }
    }
}

/// 修改时段或状态，仅班级教师和管理员可用
pub async fn apply_schedule_update(
    storage: &Arc<dyn Storage>,
    class_id: i64,
    actor: &User,
    update: UpdateScheduleRequest,
) -> Result<Class> {
    let class = storage
        .get_class_by_id(class_id)
        .await?
        .ok_or_else(|| Kk360Error::not_found(format!("Class {class_id} not found")))?;

    let owns = actor.role == UserRole::Admin
        || (actor.role == UserRole::Tutor && class.tutor_id == actor.id);
    if !owns {
        return Err(Kk360Error::authorization(
            "Only the class tutor can change its schedule",
        ));
    }

    let schedule = match (update.day, update.start_time, update.end_time) {
        (None, None, None) => None,
        (Some(day), Some(start_time), Some(end_time)) => {
            let start_time = start_time.trim().to_string();
            let end_time = end_time.trim().to_string();
            validate_time(&start_time).map_err(Kk360Error::validation)?;
            validate_time(&end_time).map_err(Kk360Error::validation)?;
            if end_time <= start_time {
                return Err(Kk360Error::validation("End time must be after start time"));
            }
            Some(Schedule {
                day,
                start_time,
                end_time,
            })
        }
        _ => {
            return Err(Kk360Error::validation(
                "day, start_time and end_time must be given together",
            ));
        }
    };

    if schedule.is_none() && update.status.is_none() {
        return Err(Kk360Error::validation("Nothing to update"));
    }

    let moved = schedule
        .as_ref()
        .is_some_and(|schedule| *schedule != class.schedule);
    let status = match update.status {
        Some(status) => Some(status),
        None if moved && class.status == ClassStatus::Scheduled => Some(ClassStatus::Rescheduled),
        None => None,
    };

    storage
        .update_class_schedule(class.id, schedule, status)
        .await?
        .ok_or_else(|| Kk360Error::not_found(format!("Class {class_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classes::entities::Weekday;
    use crate::models::classes::requests::{EnsureClassRequest, SlotRequest};
    use crate::services::classes::ClassResolver;
    use crate::services::classes::resolver::tests::{create_user, meeting_config, memory_storage};

    fn slot(day: Weekday, start: &str, end: &str) -> UpdateScheduleRequest {
        UpdateScheduleRequest {
            day: Some(day),
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            status: None,
        }
    }

    async fn class_at(
        storage: &Arc<dyn Storage>,
        tutor: &User,
        student: &User,
        subject: &str,
        day: Weekday,
        start: &str,
    ) -> Class {
        ClassResolver::new(storage, &meeting_config())
            .ensure_class(EnsureClassRequest {
                tutor_id: tutor.id,
                student_id: student.id,
                subject: subject.to_string(),
                slot: Some(SlotRequest {
                    day,
                    start_time: start.to_string(),
                    end_time: None,
                }),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_moving_slot_marks_rescheduled() {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let class = class_at(&storage, &tutor, &student, "Physics", Weekday::Monday, "10:00").await;

        let updated = apply_schedule_update(
            &storage,
            class.id,
            &tutor,
            slot(Weekday::Wednesday, "14:00", "15:30"),
        )
        .await
        .unwrap();
        assert_eq!(updated.schedule.day, Weekday::Wednesday);
        assert_eq!(updated.schedule.end_time, "15:30");
        assert_eq!(updated.status, ClassStatus::Rescheduled);
        assert_eq!(updated.student_ids, vec![student.id]);

        // 相同时段不改变状态
        let cancelled = apply_schedule_update(
            &storage,
            class.id,
            &tutor,
            UpdateScheduleRequest {
                status: Some(ClassStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cancelled.status, ClassStatus::Cancelled);
        let same = apply_schedule_update(
            &storage,
            class.id,
            &tutor,
            slot(Weekday::Wednesday, "14:00", "15:30"),
        )
        .await
        .unwrap();
        assert_eq!(same.status, ClassStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_explicit_status_wins_over_reschedule() {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let class = class_at(&storage, &tutor, &student, "Physics", Weekday::Monday, "10:00").await;

        let mut update = slot(Weekday::Friday, "09:00", "10:00");
        update.status = Some(ClassStatus::Completed);
        let updated = apply_schedule_update(&storage, class.id, &tutor, update)
            .await
            .unwrap();
        assert_eq!(updated.status, ClassStatus::Completed);
        assert_eq!(updated.schedule.day, Weekday::Friday);
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_can_update() {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let other = create_user(&storage, "tutor02", UserRole::Tutor, None).await;
        let admin = create_user(&storage, "admin01", UserRole::Admin, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let class = class_at(&storage, &tutor, &student, "Physics", Weekday::Monday, "10:00").await;

        for actor in [&other, &student] {
            let result = apply_schedule_update(
                &storage,
                class.id,
                actor,
                slot(Weekday::Tuesday, "10:00", "11:00"),
            )
            .await;
            assert!(matches!(result, Err(Kk360Error::Authorization(_))));
        }

        let updated = apply_schedule_update(
            &storage,
            class.id,
            &admin,
            slot(Weekday::Tuesday, "10:00", "11:00"),
        )
        .await
        .unwrap();
        assert_eq!(updated.schedule.day, Weekday::Tuesday);
    }

    #[tokio::test]
    async fn test_partial_or_empty_update_is_rejected() {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let student = create_user(&storage, "student01", UserRole::Student, None).await;
        let class = class_at(&storage, &tutor, &student, "Physics", Weekday::Monday, "10:00").await;

        let partial = UpdateScheduleRequest {
            day: Some(Weekday::Tuesday),
            ..Default::default()
        };
        let result = apply_schedule_update(&storage, class.id, &tutor, partial).await;
        assert!(matches!(result, Err(Kk360Error::Validation(_))));

        let empty = apply_schedule_update(&storage, class.id, &tutor, Default::default()).await;
        assert!(matches!(empty, Err(Kk360Error::Validation(_))));

        let backwards = apply_schedule_update(
            &storage,
            class.id,
            &tutor,
            slot(Weekday::Tuesday, "11:00", "10:00"),
        )
        .await;
        assert!(matches!(backwards, Err(Kk360Error::Validation(_))));

        let missing =
            apply_schedule_update(&storage, 9_999, &tutor, slot(Weekday::Tuesday, "10:00", "11:00"))
                .await;
        assert!(matches!(missing, Err(Kk360Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_taken_slot_is_a_conflict() {
        let storage = memory_storage().await;
        let tutor = create_user(&storage, "tutor01", UserRole::Tutor, None).await;
        let alice = create_user(&storage, "alice01", UserRole::Student, None).await;
        let bob = create_user(&storage, "bob0001", UserRole::Student, None).await;
        let monday = class_at(&storage, &tutor, &alice, "Physics", Weekday::Monday, "10:00").await;
        // 同科目另一个时段的班级
        let friday = storage
            .create_class(crate::models::classes::entities::NewClass {
                tutor_id: tutor.id,
                title: "Physics - Group".to_string(),
                subject: "Physics".to_string(),
                subject_key: monday.subject_key.clone(),
                schedule: Schedule {
                    day: Weekday::Friday,
                    start_time: "15:00".to_string(),
                    end_time: "16:00".to_string(),
                },
                meeting_link: "https://meet.jit.si/KK360-physics-1".to_string(),
                student_id: bob.id,
            })
            .await
            .unwrap();

        let result = apply_schedule_update(
            &storage,
            friday.id,
            &tutor,
            slot(Weekday::Monday, "10:00", "11:00"),
        )
        .await;
        assert!(matches!(result, Err(Kk360Error::Conflict(_))));

        let unchanged = storage.get_class_by_id(friday.id).await.unwrap().unwrap();
        assert_eq!(unchanged.schedule.day, Weekday::Friday);
        assert_eq!(unchanged.status, ClassStatus::Scheduled);
    }
}
