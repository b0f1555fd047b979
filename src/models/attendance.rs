//! Lessons and attendance records

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Maximum number of entries accepted in one attendance batch
pub const MAX_ATTENDANCE_BATCH: usize = 2000;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    AbsentJustified,
}

impl AttendanceStatus {
    /// Single-letter cell used in the matrix exports
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "P",
            AttendanceStatus::Absent => "A",
            AttendanceStatus::AbsentJustified => "G",
        }
    }

    /// Justified absences count toward completion and attended hours
    pub fn counts_as_attended(self) -> bool {
        match self {
            AttendanceStatus::Present | AttendanceStatus::AbsentJustified => true,
            AttendanceStatus::Absent => false,
        }
    }
}

// =============================================================================
// Lesson
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: Uuid,
    pub course_edition_id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub duration_hours: f64,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLesson {
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub duration_hours: f64,
    #[validate(length(max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

/// Per-lesson attendance tally, as shown in the lesson list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: i64,
    pub absent: i64,
    pub justified: i64,
}

impl AttendanceCounts {
    pub fn add(&mut self, status: AttendanceStatus, count: i64) {
        match status {
            AttendanceStatus::Present => self.present += count,
            AttendanceStatus::Absent => self.absent += count,
            AttendanceStatus::AbsentJustified => self.justified += count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonWithCounts {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub attendance: AttendanceCounts,
}

// =============================================================================
// Attendance
// =============================================================================

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub employee_id: Uuid,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub lesson_id: Uuid,
    pub employee_id: Uuid,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAttendanceRequest {
    #[validate(length(min = 1, max = 2000))]
    pub attendances: Vec<AttendanceEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordAttendanceResponse {
    pub ok: bool,
    pub updated: usize,
}

/// A registered employee as listed in the attendance matrix
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl RosterEntry {
    pub fn name(&self) -> String {
        super::display_name(&self.first_name, &self.last_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Pdf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AttendanceStatus::Present.code(), "P");
        assert_eq!(AttendanceStatus::Absent.code(), "A");
        assert_eq!(AttendanceStatus::AbsentJustified.code(), "G");
    }

    #[test]
    fn test_status_deserializes_snake_case() {
        let status: AttendanceStatus = serde_json::from_str(r#""absent_justified""#).unwrap();
        assert_eq!(status, AttendanceStatus::AbsentJustified);
        assert!(serde_json::from_str::<AttendanceStatus>(r#""late""#).is_err());
    }

    #[test]
    fn test_counts_accumulate_by_status() {
        let mut counts = AttendanceCounts::default();
        counts.add(AttendanceStatus::Present, 3);
        counts.add(AttendanceStatus::AbsentJustified, 1);
        counts.add(AttendanceStatus::Present, 1);
        assert_eq!(
            counts,
            AttendanceCounts {
                present: 4,
                absent: 0,
                justified: 1
            }
        );
    }

    #[test]
    fn test_batch_limit_is_enforced_by_validator() {
        let entry = AttendanceEntry {
            lesson_id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            status: AttendanceStatus::Present,
            notes: None,
        };
        let ok = RecordAttendanceRequest {
            attendances: vec![entry.clone(); MAX_ATTENDANCE_BATCH],
        };
        assert!(ok.validate().is_ok());

        let too_many = RecordAttendanceRequest {
            attendances: vec![entry; MAX_ATTENDANCE_BATCH + 1],
        };
        assert!(too_many.validate().is_err());

        let empty = RecordAttendanceRequest {
            attendances: vec![],
        };
        assert!(empty.validate().is_err());
    }
}
