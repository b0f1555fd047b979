//! Input validation module

use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Longest lesson that can be scheduled, in hours
pub const MAX_LESSON_HOURS: f64 = 24.0;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' is too long (max {max} characters)")]
    TooLong { field: String, max: usize },

    #[error("Field '{field}' is invalid: {message}")]
    Invalid { field: String, message: String },

    #[error("Employee and course edition belong to different clients")]
    CrossTenant,

    #[error("{} attendance entries reference a lesson or employee outside this edition", .indexes.len())]
    InvalidReferences { indexes: Vec<usize> },

    #[error("Confirmation phrase does not match")]
    ConfirmationMismatch { expected: String },

    #[error("Invalid file type: {mime_type}")]
    InvalidFileType { mime_type: String },

    #[error("File too large (max {max_mb} MB)")]
    FileTooLarge { max_mb: usize },
}

impl ValidationError {
    fn invalid(field: &str, message: &str) -> Self {
        ValidationError::Invalid {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Structured detail object returned alongside the error message
    pub fn details(&self) -> serde_json::Value {
        match self {
            ValidationError::Required { field } | ValidationError::TooLong { field, .. } => {
                json!({ "field": field, "message": self.to_string() })
            }
            ValidationError::Invalid { field, message } => {
                json!({ "field": field, "message": message })
            }
            ValidationError::CrossTenant => {
                json!({ "field": "courseEditionId", "message": self.to_string() })
            }
            ValidationError::InvalidReferences { indexes } => {
                json!({ "field": "attendances", "invalidEntries": indexes })
            }
            ValidationError::ConfirmationMismatch { expected } => {
                json!({ "field": "confirmation", "expected": expected })
            }
            ValidationError::InvalidFileType { .. } | ValidationError::FileTooLarge { .. } => {
                json!({ "field": "file", "message": self.to_string() })
            }
        }
    }
}

// =============================================================================
// Editions
// =============================================================================

/// Validate edition dates: end on or after start, registry deadline before start
pub fn validate_edition_dates(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    deadline_registry: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            return Err(ValidationError::invalid(
                "endDate",
                "end date must not be before the start date",
            ));
        }
    }

    if let (Some(start), Some(deadline)) = (start_date, deadline_registry) {
        if deadline >= start {
            return Err(ValidationError::invalid(
                "deadlineRegistry",
                "registry deadline must be before the start date",
            ));
        }
    }

    Ok(())
}

/// Check the confirmation phrase echoed back before a destructive delete
pub fn validate_confirmation(expected: &str, given: Option<&str>) -> Result<(), ValidationError> {
    match given {
        Some(given) if given.trim() == expected.trim() => Ok(()),
        _ => Err(ValidationError::ConfirmationMismatch {
            expected: expected.to_string(),
        }),
    }
}

// =============================================================================
// Lessons
// =============================================================================

/// Validate lesson timing
pub fn validate_lesson_times(
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    duration_hours: f64,
) -> Result<(), ValidationError> {
    if !duration_hours.is_finite() || duration_hours <= 0.0 || duration_hours > MAX_LESSON_HOURS {
        return Err(ValidationError::invalid(
            "durationHours",
            "duration must be greater than 0 and at most 24 hours",
        ));
    }

    match (start_time, end_time) {
        (Some(start), Some(end)) if end <= start => Err(ValidationError::invalid(
            "endTime",
            "end time must be after the start time",
        )),
        (None, Some(_)) => Err(ValidationError::Required {
            field: "startTime".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Attendance
// =============================================================================

/// Longest note accepted on a single attendance entry
pub const MAX_ATTENDANCE_NOTE: usize = 2000;

pub fn validate_attendance_note(index: usize, notes: Option<&str>) -> Result<(), ValidationError> {
    match notes {
        Some(notes) if notes.chars().count() > MAX_ATTENDANCE_NOTE => Err(ValidationError::TooLong {
            field: format!("attendances[{}].notes", index),
            max: MAX_ATTENDANCE_NOTE,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Certificates
// =============================================================================

/// Validate the tenant and date rules for a certificate
///
/// `edition_client_id` is `None` for external certificates that are not tied
/// to a tracked edition.
pub fn validate_certificate(
    employee_client_id: Uuid,
    edition_client_id: Option<Uuid>,
    achieved_at: NaiveDate,
    expires_at: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    if let Some(edition_client_id) = edition_client_id {
        if edition_client_id != employee_client_id {
            return Err(ValidationError::CrossTenant);
        }
    }

    validate_certificate_dates(achieved_at, expires_at)
}

/// Expiry, when present, must fall strictly after the achievement date
pub fn validate_certificate_dates(
    achieved_at: NaiveDate,
    expires_at: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match expires_at {
        Some(expires) if expires <= achieved_at => Err(ValidationError::invalid(
            "expiresAt",
            "expiry date must be after the achievement date",
        )),
        _ => Ok(()),
    }
}

/// Validate an uploaded certificate file: PDF only, by declared type and content
pub fn validate_certificate_file(
    content_type: &str,
    data: &[u8],
    max_size_bytes: usize,
) -> Result<(), ValidationError> {
    if data.is_empty() {
        return Err(ValidationError::Required {
            field: "file".to_string(),
        });
    }

    if data.len() > max_size_bytes {
        return Err(ValidationError::FileTooLarge {
            max_mb: max_size_bytes / (1024 * 1024),
        });
    }

    if content_type != "application/pdf" {
        return Err(ValidationError::InvalidFileType {
            mime_type: content_type.to_string(),
        });
    }

    // The declared type is client-controlled; check the magic bytes too
    match infer::get(data) {
        Some(kind) if kind.mime_type() == "application/pdf" => Ok(()),
        Some(kind) => Err(ValidationError::InvalidFileType {
            mime_type: kind.mime_type().to_string(),
        }),
        None => Err(ValidationError::InvalidFileType {
            mime_type: "unknown".to_string(),
        }),
    }
}

/// Extensions that must never appear in an uploaded filename
const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".php", ".phtml", ".asp", ".aspx", ".jsp", ".cgi", ".pl", ".py", ".rb", ".exe", ".bat",
    ".cmd", ".com", ".msi", ".dll", ".sh", ".js", ".mjs", ".html", ".htm", ".svg", ".jar",
];

/// Check an uploaded certificate filename
///
/// The name must end in `.pdf` and must not hide an executable extension
/// before it (e.g. "certificate.exe.pdf").
pub fn validate_certificate_filename(filename: &str) -> Result<(), ValidationError> {
    let lower = filename.to_lowercase();

    if filename.chars().count() > 255 {
        return Err(ValidationError::TooLong {
            field: "filename".to_string(),
            max: 255,
        });
    }

    if !lower.ends_with(".pdf") {
        return Err(ValidationError::InvalidFileType {
            mime_type: format!("unsupported filename: {}", filename),
        });
    }

    for ext in DANGEROUS_EXTENSIONS {
        if lower.contains(&format!("{}.", ext)) {
            return Err(ValidationError::InvalidFileType {
                mime_type: format!("filename contains dangerous extension: {}", ext),
            });
        }
    }

    Ok(())
}
