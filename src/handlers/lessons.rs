//! Lesson ledger handlers

use crate::db::is_unique_violation;
use crate::error::{PortalError, PortalResult};
use crate::handlers::auth::{ensure_admin, ensure_tenant};
use crate::handlers::editions::load_edition;
use crate::models::*;
use crate::validation::validate_lesson_times;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::{AppState, PortalJson, PortalPath, PortalQuery};

/// Load an edition through its course path, rejecting a mismatched course
async fn edition_of_course(pool: &PgPool, course_id: Uuid, edition_id: Uuid) -> PortalResult<EditionDetail> {
    let edition = load_edition(pool, edition_id).await?;
    if edition.edition.course_id != course_id {
        return Err(PortalError::NotFound("Edition"));
    }
    Ok(edition)
}

/// Lessons of an edition, chronological, with attendance counts
pub async fn list_lessons(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath((course_id, edition_id)): PortalPath<(Uuid, Uuid)>,
    PortalQuery(query): PortalQuery<PageQuery>,
) -> PortalResult<impl IntoResponse> {
    let edition = edition_of_course(&state.pool, course_id, edition_id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;
    let page = Page::from(query);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_edition_id = $1")
        .bind(edition_id)
        .fetch_one(&state.pool)
        .await?;

    let lessons = sqlx::query_as::<_, Lesson>(
        r#"
        SELECT * FROM lessons
        WHERE course_edition_id = $1
        ORDER BY date, start_time NULLS FIRST, id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(edition_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let ids: Vec<Uuid> = lessons.iter().map(|l| l.id).collect();
    let grouped = sqlx::query_as::<_, (Uuid, AttendanceStatus, i64)>(
        r#"
        SELECT lesson_id, status, COUNT(*)
        FROM attendances
        WHERE lesson_id = ANY($1)
        GROUP BY lesson_id, status
        "#,
    )
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?;

    let mut counts: HashMap<Uuid, AttendanceCounts> = HashMap::new();
    for (lesson_id, status, count) in grouped {
        counts.entry(lesson_id).or_default().add(status, count);
    }

    let items: Vec<LessonWithCounts> = lessons
        .into_iter()
        .map(|lesson| LessonWithCounts {
            attendance: counts.get(&lesson.id).copied().unwrap_or_default(),
            lesson,
        })
        .collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(items, total, page))))
}

/// Add a lesson to an edition
pub async fn add_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath((course_id, edition_id)): PortalPath<(Uuid, Uuid)>,
    PortalJson(input): PortalJson<CreateLesson>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    input.validate()?;
    validate_lesson_times(input.start_time, input.end_time, input.duration_hours)?;
    edition_of_course(&state.pool, course_id, edition_id).await?;

    let result = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (course_edition_id, date, start_time, end_time, duration_hours, title, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(edition_id)
    .bind(input.date)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.duration_hours)
    .bind(&input.title)
    .bind(&input.notes)
    .fetch_one(&state.pool)
    .await;

    match result {
        Ok(lesson) => {
            tracing::info!("Added lesson {} on {} to edition {}", lesson.id, lesson.date, edition_id);
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::success(LessonWithCounts {
                    lesson,
                    attendance: AttendanceCounts::default(),
                })),
            ))
        }
        Err(e) if is_unique_violation(&e) => Err(PortalError::conflict(
            "A lesson already exists for this edition at the same date and time",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Delete a lesson and its attendance rows
pub async fn delete_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;

    let deleted = sqlx::query("DELETE FROM lessons WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(PortalError::NotFound("Lesson"));
    }

    tracing::info!("Deleted lesson {}", id);
    Ok(Json(ApiResponse::success(())))
}
