//! Recipient-side notification handlers and the on-demand sweep

use crate::error::{PortalError, PortalResult};
use crate::handlers::auth::ensure_admin;
use crate::models::*;
use axum::{
    extract::State,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use super::{AppState, PortalPath, PortalQuery};

/// Notifications a user can see, mirroring `NotificationTarget::is_visible_to`
///
/// Binds: `$1` user id, `$2` tenant scope (NULL for admins), `$3` is admin.
const VISIBLE_TO_USER: &str = r#"
    (
        n.is_global
        OR n.user_id = $1
        OR (n.user_id IS NULL AND n.client_id IS NOT NULL
            AND ($2::uuid IS NULL OR n.client_id = $2))
        OR (n.user_id IS NULL AND n.client_id IS NULL AND NOT n.is_global AND $3)
    )
"#;

/// List the caller's notifications with their read state
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalQuery(query): PortalQuery<ListNotificationsQuery>,
) -> PortalResult<impl IntoResponse> {
    let page = Page::from(PageQuery {
        page: query.page,
        limit: query.limit,
    });
    let unread_filter = if query.unread_only {
        " AND nr.read_at IS NULL"
    } else {
        ""
    };

    let count_sql = format!(
        r#"
        SELECT COUNT(*)
        FROM notifications n
        LEFT JOIN notification_reads nr ON nr.notification_id = n.id AND nr.user_id = $1
        WHERE {}{}
        "#,
        VISIBLE_TO_USER, unread_filter
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(user.id)
        .bind(user.tenant_scope())
        .bind(user.is_admin())
        .fetch_one(&state.pool)
        .await?;

    let list_sql = format!(
        r#"
        SELECT n.*, (nr.read_at IS NOT NULL) AS is_read, nr.read_at
        FROM notifications n
        LEFT JOIN notification_reads nr ON nr.notification_id = n.id AND nr.user_id = $1
        WHERE {}{}
        ORDER BY n.created_at DESC, n.id
        LIMIT $4 OFFSET $5
        "#,
        VISIBLE_TO_USER, unread_filter
    );
    let notifications = sqlx::query_as::<_, NotificationView>(&list_sql)
        .bind(user.id)
        .bind(user.tenant_scope())
        .bind(user.is_admin())
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        notifications,
        total,
        page,
    ))))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> PortalResult<impl IntoResponse> {
    let sql = format!(
        r#"
        SELECT COUNT(*)
        FROM notifications n
        LEFT JOIN notification_reads nr ON nr.notification_id = n.id AND nr.user_id = $1
        WHERE {} AND nr.read_at IS NULL
        "#,
        VISIBLE_TO_USER
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(user.id)
        .bind(user.tenant_scope())
        .bind(user.is_admin())
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ApiResponse::success(UnreadCount { count })))
}

/// Mark one notification read for the caller
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .filter(|n| n.target().is_visible_to(&user))
        .ok_or(PortalError::NotFound("Notification"))?;

    sqlx::query(
        "INSERT INTO notification_reads (notification_id, user_id) VALUES ($1, $2) \
         ON CONFLICT (notification_id, user_id) DO NOTHING",
    )
    .bind(id)
    .bind(user.id)
    .execute(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(())))
}

/// Mark every visible notification read for the caller
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> PortalResult<impl IntoResponse> {
    let sql = format!(
        r#"
        INSERT INTO notification_reads (notification_id, user_id)
        SELECT n.id, $1 FROM notifications n WHERE {}
        ON CONFLICT (notification_id, user_id) DO NOTHING
        "#,
        VISIBLE_TO_USER
    );
    let marked = sqlx::query(&sql)
        .bind(user.id)
        .bind(user.tenant_scope())
        .bind(user.is_admin())
        .execute(&state.pool)
        .await?
        .rows_affected();

    Ok(Json(ApiResponse::success(MarkedRead { marked })))
}

/// Run the deadline and expiry sweeps now
pub async fn run_sweeps(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    let report = state.notifier.run_sweeps(Utc::now().date_naive()).await?;
    Ok(Json(ApiResponse::success(report)))
}
