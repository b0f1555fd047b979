//! Edition registry handlers: editions, lifecycle and registrations

use crate::attendance::registrations_to_promote;
use crate::db::is_unique_violation;
use crate::error::{PortalError, PortalResult};
use crate::handlers::attendance::load_matrix;
use crate::handlers::auth::{ensure_admin, ensure_tenant};
use crate::models::*;
use crate::validation::{validate_confirmation, validate_edition_dates, ValidationError};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use validator::Validate;

use super::{AppState, PortalJson, PortalPath, PortalQuery};

/// Attempts at allocating an edition number before reporting a conflict
const NUMBERING_ATTEMPTS: u32 = 3;

const EDITION_DETAIL_SELECT: &str = r#"
    SELECT e.*, c.title AS course_title, cl.name AS client_name,
           cl.contact_email AS client_contact_email,
           (SELECT COUNT(*) FROM course_registrations r WHERE r.course_edition_id = e.id)
               AS registration_count
    FROM course_editions e
    JOIN courses c ON c.id = e.course_id
    JOIN clients cl ON cl.id = e.client_id
"#;

// =============================================================================
// Editions
// =============================================================================

/// Create an edition with the next number for its (course, client) pair
pub async fn create_edition(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(course_id): PortalPath<Uuid>,
    PortalJson(input): PortalJson<CreateEdition>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    input.validate()?;
    validate_edition_dates(input.start_date, input.end_date, input.deadline_registry)?;

    let status = input.status.unwrap_or(EditionStatus::Draft);
    if !matches!(status, EditionStatus::Draft | EditionStatus::Published) {
        return Err(ValidationError::Invalid {
            field: "status".to_string(),
            message: "a new edition must be draft or published".to_string(),
        }
        .into());
    }

    let course_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
        .bind(course_id)
        .fetch_one(&state.pool)
        .await?;
    if !course_exists {
        return Err(PortalError::NotFound("Course"));
    }

    let client_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)")
        .bind(input.client_id)
        .fetch_one(&state.pool)
        .await?;
    if !client_exists {
        return Err(PortalError::NotFound("Client"));
    }

    let mut attempt = 1;
    let edition_id = loop {
        match insert_edition(&state.pool, course_id, &input, status).await {
            Ok(id) => break id,
            Err(e) if is_unique_violation(&e) && attempt < NUMBERING_ATTEMPTS => {
                tracing::warn!(
                    "Edition number collision for course {} / client {} (attempt {}), retrying",
                    course_id,
                    input.client_id,
                    attempt
                );
                attempt += 1;
            }
            Err(e) if is_unique_violation(&e) => {
                return Err(PortalError::conflict(
                    "Could not allocate an edition number, please retry",
                ));
            }
            Err(e) => return Err(e.into()),
        }
    };

    let edition = load_edition(&state.pool, edition_id).await?;
    tracing::info!(
        "Created edition {} ({} #{}) as {:?}",
        edition.edition.id,
        edition.course_title,
        edition.edition.edition_number,
        status
    );

    if status == EditionStatus::Published {
        state.notifier.edition_published(&edition).await;
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(edition))))
}

/// Allocate the number and insert the edition in one transaction
///
/// The upsert locks the pair's counter row until commit, so concurrent
/// creations for the same pair are serialised. The number is always the
/// highest existing one plus one, so deleting the latest edition frees its
/// number again.
async fn insert_edition(
    pool: &PgPool,
    course_id: Uuid,
    input: &CreateEdition,
    status: EditionStatus,
) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO edition_counters (course_id, client_id, last_number)
        VALUES ($1, $2, 0)
        ON CONFLICT (course_id, client_id) DO UPDATE
        SET last_number = edition_counters.last_number
        "#,
    )
    .bind(course_id)
    .bind(input.client_id)
    .execute(&mut *tx)
    .await?;

    let number: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(edition_number), 0) + 1 FROM course_editions \
         WHERE course_id = $1 AND client_id = $2",
    )
    .bind(course_id)
    .bind(input.client_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE edition_counters SET last_number = $3 WHERE course_id = $1 AND client_id = $2")
        .bind(course_id)
        .bind(input.client_id)
        .bind(number)
        .execute(&mut *tx)
        .await?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO course_editions
            (course_id, client_id, edition_number, start_date, end_date,
             deadline_registry, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(course_id)
    .bind(input.client_id)
    .bind(number)
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(input.deadline_registry)
    .bind(status)
    .bind(&input.notes)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(id)
}

/// List editions with filters, sorting and pagination
pub async fn list_editions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalQuery(query): PortalQuery<ListEditionsQuery>,
) -> PortalResult<impl IntoResponse> {
    let page = Page::from(PageQuery {
        page: query.page,
        limit: query.limit,
    });
    let tenant = user.tenant_scope();

    let mut count_query = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM course_editions e \
         JOIN courses c ON c.id = e.course_id \
         JOIN clients cl ON cl.id = e.client_id WHERE 1=1",
    );
    push_edition_filters(&mut count_query, &query, tenant);
    let total: i64 = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&state.pool)
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new(EDITION_DETAIL_SELECT);
    list_query.push(" WHERE 1=1");
    push_edition_filters(&mut list_query, &query, tenant);
    list_query
        .push(" ORDER BY ")
        .push(query.sort_by.column())
        .push(" ")
        .push(query.sort_order.keyword())
        .push(" NULLS LAST, e.id LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let editions: Vec<EditionDetail> = list_query
        .build_query_as::<EditionDetail>()
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        editions, total, page,
    ))))
}

fn push_edition_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    query: &ListEditionsQuery,
    tenant: Option<Uuid>,
) {
    if let Some(tenant) = tenant {
        qb.push(" AND e.client_id = ").push_bind(tenant);
    }
    if let Some(client_id) = query.client_id {
        qb.push(" AND e.client_id = ").push_bind(client_id);
    }
    if let Some(course_id) = query.course_id {
        qb.push(" AND e.course_id = ").push_bind(course_id);
    }
    if let Some(category_id) = query.category_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM course_categories cc \
             WHERE cc.course_id = e.course_id AND cc.category_id = ",
        )
        .push_bind(category_id)
        .push(")");
    }
    if let Some(status) = query.status {
        qb.push(" AND e.status = ").push_bind(status);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (c.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR cl.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from) = query.date_from {
        qb.push(" AND e.start_date >= ").push_bind(from);
    }
    if let Some(to) = query.date_to {
        qb.push(" AND e.start_date <= ").push_bind(to);
    }
}

/// `%term%` with LIKE wildcards in the term escaped
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Get one edition
pub async fn get_edition(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    let edition = load_edition(&state.pool, id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;
    Ok(Json(ApiResponse::success(edition)))
}

/// Move an edition forward in its lifecycle
pub async fn update_edition_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    PortalJson(input): PortalJson<UpdateEditionStatus>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;

    let current = load_edition(&state.pool, id).await?;
    let from = current.edition.status;
    if !from.can_transition_to(input.status) {
        return Err(PortalError::conflict(format!(
            "Cannot change edition status from {:?} to {:?}",
            from, input.status
        )));
    }

    let updated = sqlx::query("UPDATE course_editions SET status = $2 WHERE id = $1 AND status = $3")
        .bind(id)
        .bind(input.status)
        .bind(from)
        .execute(&state.pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(PortalError::conflict("Edition status was changed concurrently"));
    }

    tracing::info!("Edition {} status {:?} -> {:?}", id, from, input.status);

    let edition = load_edition(&state.pool, id).await?;
    let mut promoted_registrations = 0;
    match input.status {
        EditionStatus::Published => {
            state.notifier.edition_published(&edition).await;
        }
        EditionStatus::Closed => {
            promoted_registrations = reconcile_registrations(&state.pool, id).await?;
        }
        EditionStatus::Draft | EditionStatus::Archived => {}
    }

    Ok(Json(ApiResponse::success(EditionStatusChanged {
        edition,
        promoted_registrations,
    })))
}

/// Promote registrations of employees who met the attendance minimum
async fn reconcile_registrations(pool: &PgPool, edition_id: Uuid) -> Result<usize, sqlx::Error> {
    let matrix = load_matrix(pool, edition_id).await?;
    let registrations = sqlx::query_as::<_, CourseRegistration>(
        "SELECT * FROM course_registrations WHERE course_edition_id = $1",
    )
    .bind(edition_id)
    .fetch_all(pool)
    .await?;

    let promote = registrations_to_promote(&matrix.stats(), &registrations);
    if promote.is_empty() {
        return Ok(0);
    }

    let promoted = sqlx::query(
        "UPDATE course_registrations SET status = 'trained' WHERE id = ANY($1) AND status <> 'trained'",
    )
    .bind(&promote)
    .execute(pool)
    .await?
    .rows_affected();

    tracing::info!("Edition {} closed: {} registration(s) marked trained", edition_id, promoted);
    Ok(promoted as usize)
}

// =============================================================================
// Deletion
// =============================================================================

async fn dependent_counts(pool: &PgPool, edition_id: Uuid) -> Result<DependentCounts, sqlx::Error> {
    sqlx::query_as::<_, DependentCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM course_registrations WHERE course_edition_id = $1) AS registrations,
            (SELECT COUNT(*) FROM lessons WHERE course_edition_id = $1) AS lessons,
            (SELECT COUNT(*) FROM attendances a JOIN lessons l ON l.id = a.lesson_id
             WHERE l.course_edition_id = $1) AS attendances,
            (SELECT COUNT(*) FROM certificates WHERE course_edition_id = $1) AS certificates
        "#,
    )
    .bind(edition_id)
    .fetch_one(pool)
    .await
}

/// Counts of everything a delete would remove
pub async fn delete_edition_preview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    let edition = load_edition(&state.pool, id).await?;
    let counts = dependent_counts(&state.pool, id).await?;

    Ok(Json(ApiResponse::success(DeleteEditionPreview {
        edition_id: id,
        counts,
        confirmation_required: counts.requires_confirmation(),
        confirmation_phrase: edition.confirmation_phrase(),
    })))
}

/// Delete an edition and everything scoped to it
pub async fn delete_edition(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    body: Option<PortalJson<DeleteEditionRequest>>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    let edition = load_edition(&state.pool, id).await?;
    let counts = dependent_counts(&state.pool, id).await?;

    if counts.requires_confirmation() {
        let confirmation = body.as_ref().and_then(|PortalJson(b)| b.confirmation.as_deref());
        validate_confirmation(&edition.confirmation_phrase(), confirmation)?;
    }

    let mut tx = state.pool.begin().await?;
    let file_paths: Vec<String> =
        sqlx::query_scalar("SELECT file_path FROM certificates WHERE course_edition_id = $1")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
    sqlx::query("DELETE FROM course_editions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    for path in &file_paths {
        state.store.discard(path).await;
    }

    tracing::info!(
        "Deleted edition {} ({}) with {} registration(s), {} lesson(s), {} attendance(s), {} certificate(s)",
        id,
        edition.confirmation_phrase(),
        counts.registrations,
        counts.lessons,
        counts.attendances,
        counts.certificates
    );

    Ok(Json(ApiResponse::success(counts)))
}

// =============================================================================
// Registrations
// =============================================================================

/// Register employees to an edition; already registered ones are skipped
pub async fn submit_registry(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    PortalJson(input): PortalJson<SubmitRegistry>,
) -> PortalResult<impl IntoResponse> {
    input.validate()?;
    let edition = load_edition(&state.pool, id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;
    ensure_registry_open(&user, &edition, Utc::now().date_naive())?;

    let mut seen = HashSet::new();
    let employee_ids: Vec<Uuid> = input
        .employee_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let owners: HashMap<Uuid, Uuid> = sqlx::query_as::<_, (Uuid, Uuid)>(
        "SELECT id, client_id FROM employees WHERE id = ANY($1)",
    )
    .bind(&employee_ids)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .collect();

    for employee_id in &employee_ids {
        match owners.get(employee_id) {
            None => return Err(PortalError::NotFound("Employee")),
            Some(client_id) if *client_id != edition.edition.client_id => {
                return Err(ValidationError::CrossTenant.into());
            }
            Some(_) => {}
        }
    }

    let inserted: Vec<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO course_registrations (course_edition_id, client_id, employee_id)
        SELECT $1, $2, employee_id FROM UNNEST($3::uuid[]) AS employee_id
        ON CONFLICT (course_edition_id, employee_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(edition.edition.client_id)
    .bind(&employee_ids)
    .fetch_all(&state.pool)
    .await?;

    let result = RegistrySubmissionResult {
        inserted: inserted.len(),
        already_registered: employee_ids.len() - inserted.len(),
    };

    tracing::info!(
        "Registry for edition {}: {} inserted, {} already registered",
        id,
        result.inserted,
        result.already_registered
    );

    if result.inserted > 0 {
        state.notifier.registry_submitted(&edition, result.inserted).await;
    }

    Ok(Json(ApiResponse::success(result)))
}

/// Client users may submit while the edition is published and the deadline
/// has not passed; admins until the edition is archived
fn ensure_registry_open(
    user: &CurrentUser,
    edition: &EditionDetail,
    today: chrono::NaiveDate,
) -> PortalResult<()> {
    let status = edition.edition.status;
    if !status.accepts_registrations() {
        return Err(PortalError::conflict("Edition is archived"));
    }
    if user.is_admin() {
        return Ok(());
    }
    if status != EditionStatus::Published {
        return Err(PortalError::forbidden("Edition is not open for registrations"));
    }
    match edition.edition.deadline_registry {
        Some(deadline) if today > deadline => {
            Err(PortalError::forbidden("The registry deadline has passed"))
        }
        _ => Ok(()),
    }
}

pub async fn list_registrations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    let edition = load_edition(&state.pool, id).await?;
    ensure_tenant(&user, edition.edition.client_id)?;

    let registrations = sqlx::query_as::<_, RegistrationWithEmployee>(
        r#"
        SELECT r.*, emp.first_name, emp.last_name
        FROM course_registrations r
        JOIN employees emp ON emp.id = r.employee_id
        WHERE r.course_edition_id = $1
        ORDER BY emp.last_name, emp.first_name
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(registrations)))
}

pub async fn update_registration_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    PortalJson(input): PortalJson<UpdateRegistrationStatus>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;

    let current = sqlx::query_as::<_, CourseRegistration>(
        "SELECT * FROM course_registrations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(PortalError::NotFound("Registration"))?;

    if !current.status.can_transition_to(input.status) {
        return Err(PortalError::conflict(format!(
            "Cannot change registration status from {:?} to {:?}",
            current.status, input.status
        )));
    }

    let registration = sqlx::query_as::<_, CourseRegistration>(
        "UPDATE course_registrations SET status = $2 WHERE id = $1 AND status = $3 RETURNING *",
    )
    .bind(id)
    .bind(input.status)
    .bind(current.status)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| PortalError::conflict("Registration status was changed concurrently"))?;

    Ok(Json(ApiResponse::success(registration)))
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) async fn load_edition(pool: &PgPool, id: Uuid) -> PortalResult<EditionDetail> {
    let sql = format!("{} WHERE e.id = $1", EDITION_DETAIL_SELECT);
    sqlx::query_as::<_, EditionDetail>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(PortalError::NotFound("Edition"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn edition(status: EditionStatus, deadline: Option<&str>) -> EditionDetail {
        EditionDetail {
            edition: CourseEdition {
                id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                edition_number: 1,
                start_date: None,
                end_date: None,
                deadline_registry: deadline.map(date),
                status,
                notes: None,
                deadline_reminder_sent_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            course_title: "First Aid".to_string(),
            client_name: "Acme".to_string(),
            client_contact_email: None,
            registration_count: 0,
        }
    }

    fn user(role: UserRole, client_id: Option<Uuid>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            role,
            client_id,
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("safety"), "%safety%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn test_client_registry_window() {
        let e = edition(EditionStatus::Published, Some("2024-02-20"));
        let client = user(UserRole::Client, Some(e.edition.client_id));

        assert!(ensure_registry_open(&client, &e, date("2024-02-20")).is_ok());
        assert!(matches!(
            ensure_registry_open(&client, &e, date("2024-02-21")),
            Err(PortalError::Forbidden(_))
        ));

        let draft = edition(EditionStatus::Draft, None);
        assert!(matches!(
            ensure_registry_open(&client, &draft, date("2024-02-01")),
            Err(PortalError::Forbidden(_))
        ));
    }

    #[test]
    fn test_admin_registry_window() {
        let admin = user(UserRole::Admin, None);
        let closed = edition(EditionStatus::Closed, Some("2024-01-01"));
        assert!(ensure_registry_open(&admin, &closed, date("2024-06-01")).is_ok());

        let archived = edition(EditionStatus::Archived, None);
        assert!(matches!(
            ensure_registry_open(&admin, &archived, date("2024-06-01")),
            Err(PortalError::Conflict(_))
        ));
    }

    async fn seed_course_and_client(pool: &PgPool) -> (Uuid, Uuid) {
        let course: Uuid = sqlx::query_scalar("INSERT INTO courses (title) VALUES ('Numbering') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
        let client: Uuid = sqlx::query_scalar("INSERT INTO clients (name) VALUES ('Numbering Client') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
        (course, client)
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_edition_numbers_are_sequential_per_course_and_client() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let (course, client) = seed_course_and_client(&pool).await;
        let input = CreateEdition {
            client_id: client,
            start_date: None,
            end_date: None,
            deadline_registry: None,
            status: None,
            notes: None,
        };

        let mut numbers = Vec::new();
        for _ in 0..3 {
            let id = insert_edition(&pool, course, &input, EditionStatus::Draft).await.unwrap();
            numbers.push(load_edition(&pool, id).await.unwrap().edition.edition_number);
        }
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_number_of_deleted_latest_edition_is_reused() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let (course, client) = seed_course_and_client(&pool).await;
        let input = CreateEdition {
            client_id: client,
            start_date: None,
            end_date: None,
            deadline_registry: None,
            status: None,
            notes: None,
        };

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(insert_edition(&pool, course, &input, EditionStatus::Draft).await.unwrap());
        }
        sqlx::query("DELETE FROM course_editions WHERE id = $1")
            .bind(ids[2])
            .execute(&pool)
            .await
            .unwrap();

        let id = insert_edition(&pool, course, &input, EditionStatus::Draft).await.unwrap();
        assert_eq!(load_edition(&pool, id).await.unwrap().edition.edition_number, 3);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_concurrent_creations_get_distinct_numbers() {
        let pool = test_pool().await.expect("DATABASE_URL must point at a test database");
        let (course, client) = seed_course_and_client(&pool).await;
        let input = CreateEdition {
            client_id: client,
            start_date: None,
            end_date: None,
            deadline_registry: None,
            status: None,
            notes: None,
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let input = input.clone();
                tokio::spawn(async move { insert_edition(&pool, course, &input, EditionStatus::Draft).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut numbers: Vec<i32> = sqlx::query_scalar(
            "SELECT edition_number FROM course_editions WHERE course_id = $1 AND client_id = $2",
        )
        .bind(course)
        .bind(client)
        .fetch_all(&pool)
        .await
        .unwrap();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<i32>>());
    }
}
