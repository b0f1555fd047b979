//! Attendance matrix, batch recording and export

use crate::attendance::{export, latest_per_key, validate_batch, AttendanceMatrix};
use crate::error::PortalResult;
use crate::handlers::auth::{ensure_admin, ensure_tenant};
use crate::handlers::editions::load_edition;
use crate::models::*;
use crate::storage::sanitize_filename;
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

use super::{AppState, PortalJson, PortalPath, PortalQuery};

/// Load the lessons, roster and attendance rows of an edition
pub(crate) async fn load_matrix(pool: &PgPool, edition_id: Uuid) -> Result<AttendanceMatrix, sqlx::Error> {
    let lessons = sqlx::query_as::<_, Lesson>(
        "SELECT * FROM lessons WHERE course_edition_id = $1 ORDER BY date, start_time NULLS FIRST",
    )
    .bind(edition_id)
    .fetch_all(pool)
    .await?;

    let roster = sqlx::query_as::<_, RosterEntry>(
        r#"
        SELECT emp.id AS employee_id, emp.first_name, emp.last_name
        FROM course_registrations r
        JOIN employees emp ON emp.id = r.employee_id
        WHERE r.course_edition_id = $1
        ORDER BY emp.last_name, emp.first_name
        "#,
    )
    .bind(edition_id)
    .fetch_all(pool)
    .await?;

    let records = sqlx::query_as::<_, Attendance>(
        r#"
        SELECT a.*
        FROM attendances a
        JOIN lessons l ON l.id = a.lesson_id
        WHERE l.course_edition_id = $1
        "#,
    )
    .bind(edition_id)
    .fetch_all(pool)
    .await?;

    Ok(AttendanceMatrix::new(lessons, roster, records))
}

/// Full attendance matrix with per-employee statistics
pub async fn get_attendance_matrix(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    let edition = load_edition(&state.pool, id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;

    let matrix = load_matrix(&state.pool, id).await?;
    Ok(Json(ApiResponse::success(matrix.into_summary())))
}

/// Record a batch of attendance entries for one edition
pub async fn record_attendance(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    PortalJson(input): PortalJson<RecordAttendanceRequest>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    input.validate()?;
    let edition = load_edition(&state.pool, id).await?;

    let updated = record_batch(&state.pool, id, &input.attendances, user.id, Utc::now()).await?;

    tracing::info!(
        "Recorded {} attendance entr{} for edition {} ({} written)",
        input.attendances.len(),
        if input.attendances.len() == 1 { "y" } else { "ies" },
        id,
        updated
    );

    state.notifier.attendance_recorded(&edition, updated).await;

    Ok(Json(ApiResponse::success(RecordAttendanceResponse {
        ok: true,
        updated,
    })))
}

/// Validate a batch against the edition, then write it in one transaction
///
/// Every entry is checked against the edition's lessons and registered
/// employees first; one bad entry rejects the whole batch. Repeated
/// (lesson, employee) pairs collapse to the last one. Returns the number of
/// rows written.
pub(crate) async fn record_batch(
    pool: &PgPool,
    edition_id: Uuid,
    entries: &[AttendanceEntry],
    recorded_by: Uuid,
    recorded_at: DateTime<Utc>,
) -> PortalResult<usize> {
    let lesson_ids: HashSet<Uuid> =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM lessons WHERE course_edition_id = $1")
            .bind(edition_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    let employee_ids: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        "SELECT employee_id FROM course_registrations WHERE course_edition_id = $1",
    )
    .bind(edition_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    validate_batch(entries, &lesson_ids, &employee_ids)?;

    let mut tx = pool.begin().await?;
    let updated = upsert_attendances(&mut tx, &latest_per_key(entries), recorded_by, recorded_at).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Upsert attendance rows; an older write never overwrites a newer one
async fn upsert_attendances(
    tx: &mut Transaction<'_, Postgres>,
    entries: &[&AttendanceEntry],
    recorded_by: Uuid,
    recorded_at: DateTime<Utc>,
) -> Result<usize, sqlx::Error> {
    let mut updated = 0usize;
    for entry in entries {
        let result = sqlx::query(
            r#"
            INSERT INTO attendances (lesson_id, employee_id, status, notes, recorded_by, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (lesson_id, employee_id) DO UPDATE
            SET status = EXCLUDED.status,
                notes = EXCLUDED.notes,
                recorded_by = EXCLUDED.recorded_by,
                recorded_at = EXCLUDED.recorded_at
            WHERE attendances.recorded_at <= EXCLUDED.recorded_at
            "#,
        )
        .bind(entry.lesson_id)
        .bind(entry.employee_id)
        .bind(entry.status)
        .bind(&entry.notes)
        .bind(recorded_by)
        .bind(recorded_at)
        .execute(&mut **tx)
        .await?;
        updated += result.rows_affected() as usize;
    }
    Ok(updated)
}

/// Download the attendance matrix as CSV or PDF
pub async fn export_attendance(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    PortalQuery(query): PortalQuery<ExportQuery>,
) -> PortalResult<Response> {
    let edition = load_edition(&state.pool, id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;
    let matrix = load_matrix(&state.pool, id).await?;

    let title = format!(
        "Attendance - {} - {}",
        edition.confirmation_phrase(),
        edition.client_name
    );
    let stem = sanitize_filename(&format!(
        "attendance_{}_{}",
        edition.course_title, edition.edition.edition_number
    ));

    let (content_type, extension, body) = match query.format {
        ExportFormat::Csv => (
            "text/csv; charset=utf-8",
            "csv",
            export::render_csv(&matrix).into_bytes(),
        ),
        ExportFormat::Pdf => ("application/pdf", "pdf", export::render_pdf(&matrix, &title)),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", stem, extension),
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::error::PortalError;
    use crate::validation::ValidationError;
    use chrono::Duration;

    struct Seeded {
        edition_id: Uuid,
        lessons: Vec<Uuid>,
        employee_id: Uuid,
        recorder: Uuid,
    }

    /// One edition with two lessons and one registered employee
    async fn seed(pool: &PgPool) -> Seeded {
        let client: Uuid = sqlx::query_scalar("INSERT INTO clients (name) VALUES ('Attendance Client') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
        let course: Uuid = sqlx::query_scalar("INSERT INTO courses (title) VALUES ('Fire Safety') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
        let edition_id: Uuid = sqlx::query_scalar(
            "INSERT INTO course_editions (course_id, client_id, edition_number, status) \
             VALUES ($1, $2, 1, 'published') RETURNING id",
        )
        .bind(course)
        .bind(client)
        .fetch_one(pool)
        .await
        .unwrap();

        let mut lessons = Vec::new();
        for day in ["2024-03-01", "2024-03-08"] {
            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO lessons (course_edition_id, date, duration_hours) \
                 VALUES ($1, $2::date, 4) RETURNING id",
            )
            .bind(edition_id)
            .bind(day)
            .fetch_one(pool)
            .await
            .unwrap();
            lessons.push(id);
        }

        let employee_id: Uuid = sqlx::query_scalar(
            "INSERT INTO employees (client_id, first_name, last_name) VALUES ($1, 'Anna', 'Bianchi') RETURNING id",
        )
        .bind(client)
        .fetch_one(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO course_registrations (course_edition_id, client_id, employee_id) VALUES ($1, $2, $3)")
            .bind(edition_id)
            .bind(client)
            .bind(employee_id)
            .execute(pool)
            .await
            .unwrap();

        let recorder: Uuid = sqlx::query_scalar(
            "INSERT INTO portal_users (email, role) VALUES ($1, 'admin') RETURNING id",
        )
        .bind(format!("admin-{}@example.com", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap();

        Seeded {
            edition_id,
            lessons,
            employee_id,
            recorder,
        }
    }

    fn entry(lesson_id: Uuid, employee_id: Uuid, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            lesson_id,
            employee_id,
            status,
            notes: None,
        }
    }

    async fn stored(pool: &PgPool, edition_id: Uuid) -> Vec<(Uuid, AttendanceStatus)> {
        sqlx::query_as::<_, (Uuid, AttendanceStatus)>(
            "SELECT a.lesson_id, a.status FROM attendances a \
             JOIN lessons l ON l.id = a.lesson_id WHERE l.course_edition_id = $1",
        )
        .bind(edition_id)
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_resubmitting_an_entry_keeps_one_row_with_latest_status() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let s = seed(&pool).await;
        let lesson = s.lessons[0];

        let first = [entry(lesson, s.employee_id, AttendanceStatus::Present)];
        record_batch(&pool, s.edition_id, &first, s.recorder, Utc::now()).await.unwrap();
        let second = [entry(lesson, s.employee_id, AttendanceStatus::AbsentJustified)];
        record_batch(&pool, s.edition_id, &second, s.recorder, Utc::now()).await.unwrap();

        assert_eq!(
            stored(&pool, s.edition_id).await,
            vec![(lesson, AttendanceStatus::AbsentJustified)]
        );
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_older_write_does_not_overwrite_newer_one() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let s = seed(&pool).await;
        let lesson = s.lessons[0];
        let now = Utc::now();

        let newer = [entry(lesson, s.employee_id, AttendanceStatus::Present)];
        record_batch(&pool, s.edition_id, &newer, s.recorder, now).await.unwrap();
        let older = [entry(lesson, s.employee_id, AttendanceStatus::Absent)];
        let written = record_batch(&pool, s.edition_id, &older, s.recorder, now - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(stored(&pool, s.edition_id).await, vec![(lesson, AttendanceStatus::Present)]);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_batch_with_invalid_entry_writes_nothing() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let s = seed(&pool).await;

        let batch = [
            entry(s.lessons[0], s.employee_id, AttendanceStatus::Present),
            entry(s.lessons[1], s.employee_id, AttendanceStatus::Absent),
            entry(s.lessons[0], s.employee_id, AttendanceStatus::AbsentJustified),
            // Lesson of no edition
            entry(Uuid::new_v4(), s.employee_id, AttendanceStatus::Present),
        ];
        match record_batch(&pool, s.edition_id, &batch, s.recorder, Utc::now()).await {
            Err(PortalError::Validation(ValidationError::InvalidReferences { indexes })) => {
                assert_eq!(indexes, vec![3])
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(stored(&pool, s.edition_id).await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_repeated_pair_in_one_batch_counts_once() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let s = seed(&pool).await;
        let lesson = s.lessons[1];

        let batch = [
            entry(lesson, s.employee_id, AttendanceStatus::Absent),
            entry(lesson, s.employee_id, AttendanceStatus::Present),
        ];
        let written = record_batch(&pool, s.edition_id, &batch, s.recorder, Utc::now())
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(stored(&pool, s.edition_id).await, vec![(lesson, AttendanceStatus::Present)]);
    }
}
