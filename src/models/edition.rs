//! Courses, editions and registrations

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle of an edition; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "edition_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EditionStatus {
    Draft,
    Published,
    Closed,
    Archived,
}

impl EditionStatus {
    fn rank(self) -> u8 {
        match self {
            EditionStatus::Draft => 0,
            EditionStatus::Published => 1,
            EditionStatus::Closed => 2,
            EditionStatus::Archived => 3,
        }
    }

    /// Forward moves are allowed, skips included; staying put or going back is not
    pub fn can_transition_to(self, next: EditionStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Whether the roster can still change
    pub fn accepts_registrations(self) -> bool {
        match self {
            EditionStatus::Draft | EditionStatus::Published | EditionStatus::Closed => true,
            EditionStatus::Archived => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Inserted,
    Confirmed,
    Trained,
}

impl RegistrationStatus {
    pub fn can_transition_to(self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, next),
            (Inserted, Confirmed) | (Inserted, Trained) | (Confirmed, Trained)
        )
    }
}

// =============================================================================
// Employee
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Uuid,
    pub client_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// "Last First", the order rosters are printed in
pub fn display_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", last_name.trim(), first_name.trim())
        .trim()
        .to_string()
}

// =============================================================================
// Course Edition
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseEdition {
    pub id: Uuid,
    pub course_id: Uuid,
    pub client_id: Uuid,
    pub edition_number: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub deadline_registry: Option<NaiveDate>,
    pub status: EditionStatus,
    pub notes: Option<String>,
    #[serde(skip_serializing)]
    pub deadline_reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Edition joined with its course, client and participant count
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EditionDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub edition: CourseEdition,
    pub course_title: String,
    pub client_name: String,
    #[serde(skip_serializing)]
    pub client_contact_email: Option<String>,
    pub registration_count: i64,
}

impl EditionDetail {
    /// Phrase a caller must echo back to delete an edition that has certificates
    pub fn confirmation_phrase(&self) -> String {
        format!("{} #{}", self.course_title, self.edition.edition_number)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEdition {
    pub client_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub deadline_registry: Option<NaiveDate>,
    pub status: Option<EditionStatus>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEditionStatus {
    pub status: EditionStatus,
}

/// Edition after a status change, with the registrations promoted on close
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionStatusChanged {
    #[serde(flatten)]
    pub edition: EditionDetail,
    pub promoted_registrations: usize,
}

/// Sort keys accepted by the edition listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditionSortBy {
    ClientName,
    CourseTitle,
    EditionNumber,
    #[default]
    StartDate,
    EndDate,
    DeadlineRegistry,
    Status,
    Participants,
}

impl EditionSortBy {
    /// Column expression for ORDER BY; only ever a fixed string
    pub fn column(self) -> &'static str {
        match self {
            EditionSortBy::ClientName => "cl.name",
            EditionSortBy::CourseTitle => "c.title",
            EditionSortBy::EditionNumber => "e.edition_number",
            EditionSortBy::StartDate => "e.start_date",
            EditionSortBy::EndDate => "e.end_date",
            EditionSortBy::DeadlineRegistry => "e.deadline_registry",
            EditionSortBy::Status => "e.status",
            EditionSortBy::Participants => "registration_count",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEditionsQuery {
    pub client_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub status: Option<EditionStatus>,
    pub search: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub sort_by: EditionSortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Records that go away together with an edition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DependentCounts {
    pub registrations: i64,
    pub lessons: i64,
    pub attendances: i64,
    pub certificates: i64,
}

impl DependentCounts {
    pub fn requires_confirmation(&self) -> bool {
        self.certificates > 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEditionPreview {
    pub edition_id: Uuid,
    pub counts: DependentCounts,
    pub confirmation_required: bool,
    pub confirmation_phrase: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteEditionRequest {
    pub confirmation: Option<String>,
}

// =============================================================================
// Registration
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseRegistration {
    pub id: Uuid,
    pub course_edition_id: Uuid,
    pub client_id: Uuid,
    pub employee_id: Uuid,
    pub status: RegistrationStatus,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationWithEmployee {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub registration: CourseRegistration,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRegistry {
    #[validate(length(min = 1, max = 1000))]
    pub employee_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySubmissionResult {
    pub inserted: usize,
    pub already_registered: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRegistrationStatus {
    pub status: RegistrationStatus,
}
