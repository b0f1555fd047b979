//! Certificate issuer handlers
//!
//! File and row writes are paired: the file is stored first, and discarded
//! again whenever the row write that should reference it fails.

use crate::error::{PortalError, PortalResult};
use crate::handlers::auth::{ensure_admin, ensure_tenant};
use crate::handlers::editions::load_edition;
use crate::models::*;
use crate::storage::sanitize_filename;
use crate::validation::{
    validate_certificate, validate_certificate_file, validate_certificate_filename, ValidationError,
};
use axum::{
    body::Bytes,
    extract::{multipart::Field, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AppState, PortalPath, PortalQuery};

/// Uploaded PDF taken from a multipart form
struct UploadedFile {
    filename: String,
    content_type: String,
    data: Bytes,
}

/// Fields of the certificate issue form
#[derive(Default)]
struct IssueForm {
    employee_id: Option<Uuid>,
    course_edition_id: Option<Uuid>,
    achieved_at: Option<NaiveDate>,
    expires_at: Option<NaiveDate>,
    file: Option<UploadedFile>,
}

fn invalid(field: &str, message: impl Into<String>) -> PortalError {
    ValidationError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
    .into()
}

fn required(field: &str) -> PortalError {
    ValidationError::Required {
        field: field.to_string(),
    }
    .into()
}

async fn next_field(multipart: &mut Multipart) -> PortalResult<Option<Field<'_>>> {
    multipart.next_field().await.map_err(|e| {
        tracing::error!("Multipart parsing error: {}", e);
        invalid("file", format!("Failed to process upload ({})", e))
    })
}

async fn text_value(field: Field<'_>, name: &str) -> PortalResult<Option<String>> {
    let value = field
        .text()
        .await
        .map_err(|e| invalid(name, format!("unreadable value ({})", e)))?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

async fn file_value(field: Field<'_>) -> PortalResult<UploadedFile> {
    let filename = field.file_name().unwrap_or("certificate.pdf").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(|e| {
        tracing::error!("Failed to read file bytes: {}", e);
        invalid("file", format!("Failed to read uploaded file ({})", e))
    })?;
    Ok(UploadedFile {
        filename,
        content_type,
        data,
    })
}

fn parse_uuid(field: &str, value: &str) -> PortalResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| invalid(field, "must be a UUID"))
}

fn parse_date(field: &str, value: &str) -> PortalResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid(field, "must be a date (YYYY-MM-DD)"))
}

async fn read_issue_form(mut multipart: Multipart) -> PortalResult<IssueForm> {
    let mut form = IssueForm::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(file_value(field).await?),
            "employeeId" => {
                if let Some(v) = text_value(field, "employeeId").await? {
                    form.employee_id = Some(parse_uuid("employeeId", &v)?);
                }
            }
            "courseEditionId" => {
                if let Some(v) = text_value(field, "courseEditionId").await? {
                    form.course_edition_id = Some(parse_uuid("courseEditionId", &v)?);
                }
            }
            "achievedAt" => {
                if let Some(v) = text_value(field, "achievedAt").await? {
                    form.achieved_at = Some(parse_date("achievedAt", &v)?);
                }
            }
            "expiresAt" => {
                if let Some(v) = text_value(field, "expiresAt").await? {
                    form.expires_at = Some(parse_date("expiresAt", &v)?);
                }
            }
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }

    Ok(form)
}

async fn read_replacement_file(mut multipart: Multipart) -> PortalResult<UploadedFile> {
    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() == Some("file") {
            return file_value(field).await;
        }
    }
    Err(required("file"))
}

fn check_file(file: &UploadedFile, max_size: usize) -> PortalResult<()> {
    validate_certificate_filename(&file.filename)?;
    validate_certificate_file(&file.content_type, &file.data, max_size)?;
    Ok(())
}

async fn fetch_certificate(pool: &PgPool, id: Uuid) -> PortalResult<Certificate> {
    sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(PortalError::NotFound("Certificate"))
}

// =============================================================================
// Certificate Endpoints
// =============================================================================

/// Issue a certificate (multipart form with a PDF file)
pub async fn issue_certificate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;

    let form = read_issue_form(multipart).await?;
    let employee_id = form.employee_id.ok_or_else(|| required("employeeId"))?;
    let achieved_at = form.achieved_at.ok_or_else(|| required("achievedAt"))?;
    let file = form.file.ok_or_else(|| required("file"))?;
    check_file(&file, state.max_certificate_size)?;

    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = $1")
        .bind(employee_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(PortalError::NotFound("Employee"))?;

    let edition = match form.course_edition_id {
        Some(id) => Some(load_edition(&state.pool, id).await?),
        None => None,
    };

    validate_certificate(
        employee.client_id,
        edition.as_ref().map(|e| e.edition.client_id),
        achieved_at,
        form.expires_at,
    )?;

    let stored = state
        .store
        .save(employee.client_id, &file.filename, &file.data)
        .await?;

    let result = sqlx::query_as::<_, Certificate>(
        r#"
        INSERT INTO certificates (
            client_id, employee_id, course_edition_id, file_path, original_filename,
            file_size, achieved_at, expires_at, uploaded_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(employee.client_id)
    .bind(employee.id)
    .bind(form.course_edition_id)
    .bind(&stored.path)
    .bind(&file.filename)
    .bind(stored.size)
    .bind(achieved_at)
    .bind(form.expires_at)
    .bind(user.id)
    .fetch_one(&state.pool)
    .await;

    let certificate = match result {
        Ok(cert) => cert,
        Err(e) => {
            tracing::error!("Failed to store certificate metadata: {}", e);
            state.store.discard(&stored.path).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        "Issued certificate {} to employee {} (client {})",
        certificate.id,
        employee.id,
        employee.client_id
    );

    let contact_email = match &edition {
        Some(e) => e.client_contact_email.clone(),
        None => sqlx::query_scalar::<_, Option<String>>("SELECT contact_email FROM clients WHERE id = $1")
            .bind(employee.client_id)
            .fetch_optional(&state.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load client contact for notification: {}", e);
                None
            })
            .flatten(),
    };
    state
        .notifier
        .certificates_uploaded(
            employee.client_id,
            contact_email.as_deref(),
            edition.as_ref().map(|e| e.course_title.as_str()),
            form.course_edition_id,
            1,
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CertificateResponse::from(certificate))),
    ))
}

/// Replace the PDF of an existing certificate
pub async fn replace_certificate_file(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
    multipart: Multipart,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    let current = fetch_certificate(&state.pool, id).await?;

    let file = read_replacement_file(multipart).await?;
    check_file(&file, state.max_certificate_size)?;

    let stored = state
        .store
        .save(current.client_id, &file.filename, &file.data)
        .await?;

    let result = sqlx::query_as::<_, Certificate>(
        r#"
        UPDATE certificates
        SET file_path = $2, original_filename = $3, file_size = $4,
            uploaded_by = $5, uploaded_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&stored.path)
    .bind(&file.filename)
    .bind(stored.size)
    .bind(user.id)
    .fetch_optional(&state.pool)
    .await;

    match result {
        Ok(Some(updated)) => {
            state.store.discard(&current.file_path).await;
            tracing::info!("Replaced file of certificate {}", id);
            Ok(Json(ApiResponse::success(CertificateResponse::from(updated))))
        }
        Ok(None) => {
            state.store.discard(&stored.path).await;
            Err(PortalError::NotFound("Certificate"))
        }
        Err(e) => {
            tracing::error!("Failed to update certificate {}: {}", id, e);
            state.store.discard(&stored.path).await;
            Err(e.into())
        }
    }
}

/// Delete a certificate and its file
pub async fn delete_certificate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<impl IntoResponse> {
    ensure_admin(&user)?;
    let certificate = fetch_certificate(&state.pool, id).await?;

    state.store.discard(&certificate.file_path).await;

    sqlx::query("DELETE FROM certificates WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    tracing::info!("Deleted certificate {}", id);
    Ok(Json(ApiResponse::success(())))
}

/// List certificates visible to the caller
pub async fn list_certificates(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalQuery(query): PortalQuery<ListCertificatesQuery>,
) -> PortalResult<impl IntoResponse> {
    let page = Page::from(PageQuery {
        page: query.page,
        limit: query.limit,
    });
    let tenant = user.tenant_scope();

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM certificates WHERE 1=1");
    push_certificate_filters(&mut count_query, &query, tenant);
    let total: i64 = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&state.pool)
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new("SELECT * FROM certificates WHERE 1=1");
    push_certificate_filters(&mut list_query, &query, tenant);
    list_query
        .push(" ORDER BY uploaded_at DESC, id LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let certificates = list_query
        .build_query_as::<Certificate>()
        .fetch_all(&state.pool)
        .await?;

    let items: Vec<CertificateResponse> = certificates.into_iter().map(CertificateResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(items, total, page))))
}

fn push_certificate_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    query: &ListCertificatesQuery,
    tenant: Option<Uuid>,
) {
    if let Some(tenant) = tenant {
        qb.push(" AND client_id = ").push_bind(tenant);
    }
    if let Some(client_id) = query.client_id {
        qb.push(" AND client_id = ").push_bind(client_id);
    }
    if let Some(employee_id) = query.employee_id {
        qb.push(" AND employee_id = ").push_bind(employee_id);
    }
    if let Some(edition_id) = query.course_edition_id {
        qb.push(" AND course_edition_id = ").push_bind(edition_id);
    }
}

/// Download the PDF of a certificate
pub async fn download_certificate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    PortalPath(id): PortalPath<Uuid>,
) -> PortalResult<Response> {
    let certificate = fetch_certificate(&state.pool, id).await?;
    ensure_tenant(&user, certificate.client_id)?;

    let data = state.store.read(&certificate.file_path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    sanitize_filename(&certificate.original_filename)
                ),
            ),
        ],
        data,
    )
        .into_response())
}
