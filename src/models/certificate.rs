//! Certificates issued to employees

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Certificate {
    pub id: Uuid,
    pub client_id: Uuid,
    pub employee_id: Uuid,
    pub course_edition_id: Option<Uuid>,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub achieved_at: NaiveDate,
    pub expires_at: Option<NaiveDate>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
    pub expiry_notified_at: Option<DateTime<Utc>>,
}

/// Certificate as exposed over the API; the storage path stays server-side
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub employee_id: Uuid,
    pub course_edition_id: Option<Uuid>,
    pub filename: String,
    pub file_size: i64,
    pub achieved_at: NaiveDate,
    pub expires_at: Option<NaiveDate>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Certificate> for CertificateResponse {
    fn from(cert: Certificate) -> Self {
        Self {
            id: cert.id,
            client_id: cert.client_id,
            employee_id: cert.employee_id,
            course_edition_id: cert.course_edition_id,
            filename: cert.original_filename,
            file_size: cert.file_size,
            achieved_at: cert.achieved_at,
            expires_at: cert.expires_at,
            uploaded_by: cert.uploaded_by,
            uploaded_at: cert.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCertificatesQuery {
    pub client_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub course_edition_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Certificate close to expiry, joined with what the reminder e-mail needs
#[derive(Debug, Clone, FromRow)]
pub struct ExpiringCertificate {
    pub id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_contact_email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub course_title: Option<String>,
    pub expires_at: NaiveDate,
}
