//! Attendance aggregation
//!
//! Pure read-side projection over an edition's lessons, its roster and the
//! recorded attendance rows. The interactive matrix and both export formats
//! go through [`AttendanceMatrix`], so they always report the same numbers.

pub mod export;

use crate::models::{
    Attendance, AttendanceEntry, AttendanceStatus, CourseRegistration, Lesson, RegistrationStatus,
    RosterEntry,
};
use crate::validation::{validate_attendance_note, ValidationError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Minimum attendance percentage required to complete an edition
pub const MINIMUM_ATTENDANCE_PERCENT: u32 = 75;

/// Status of one (lesson, employee) cell; a missing record counts as absent
pub fn status_or_absent(record: Option<&Attendance>) -> AttendanceStatus {
    match record {
        Some(record) => record.status,
        None => AttendanceStatus::Absent,
    }
}

/// `round(100 * attended / total)` with halves rounded up, 0 when there are no lessons
pub fn attendance_percentage(attended: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    // Integer form of floor(100 * attended / total + 0.5)
    (200 * attended + total) / (2 * total)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeAttendanceStats {
    pub employee_id: Uuid,
    pub name: String,
    pub total_lessons: u32,
    pub present: u32,
    pub absent: u32,
    pub justified: u32,
    pub percentage: u32,
    pub total_hours: f64,
    pub attended_hours: f64,
    pub below_minimum: bool,
}

/// Full matrix as returned to the attendance screen
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSummary {
    pub lessons: Vec<Lesson>,
    pub employees: Vec<RosterEntry>,
    pub attendances: Vec<Attendance>,
    pub stats: Vec<EmployeeAttendanceStats>,
    pub total_lessons: u32,
    pub total_hours: f64,
}

/// Lessons, roster and records for one edition
#[derive(Debug, Clone)]
pub struct AttendanceMatrix {
    lessons: Vec<Lesson>,
    roster: Vec<RosterEntry>,
    records: Vec<Attendance>,
    index: HashMap<(Uuid, Uuid), usize>,
}

impl AttendanceMatrix {
    /// Build the matrix; lessons are put in chronological order and records
    /// that do not match a lesson and a rostered employee are ignored.
    pub fn new(mut lessons: Vec<Lesson>, roster: Vec<RosterEntry>, records: Vec<Attendance>) -> Self {
        lessons.sort_by_key(|l| (l.date, l.start_time));

        let lesson_ids: HashSet<Uuid> = lessons.iter().map(|l| l.id).collect();
        let employee_ids: HashSet<Uuid> = roster.iter().map(|r| r.employee_id).collect();
        let records: Vec<Attendance> = records
            .into_iter()
            .filter(|r| lesson_ids.contains(&r.lesson_id) && employee_ids.contains(&r.employee_id))
            .collect();

        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.lesson_id, r.employee_id), i))
            .collect();

        Self {
            lessons,
            roster,
            records,
            index,
        }
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn total_lessons(&self) -> u32 {
        self.lessons.len() as u32
    }

    pub fn total_hours(&self) -> f64 {
        self.lessons.iter().map(|l| l.duration_hours).sum()
    }

    pub fn record(&self, lesson_id: Uuid, employee_id: Uuid) -> Option<&Attendance> {
        self.index
            .get(&(lesson_id, employee_id))
            .map(|&i| &self.records[i])
    }

    /// Cell status with the implicit-absent default applied
    pub fn status(&self, lesson_id: Uuid, employee_id: Uuid) -> AttendanceStatus {
        status_or_absent(self.record(lesson_id, employee_id))
    }

    /// Statuses of one employee across all lessons, chronologically
    pub fn row(&self, employee_id: Uuid) -> Vec<AttendanceStatus> {
        self.lessons
            .iter()
            .map(|lesson| self.status(lesson.id, employee_id))
            .collect()
    }

    pub fn employee_stats(&self, entry: &RosterEntry) -> EmployeeAttendanceStats {
        let mut present = 0;
        let mut absent = 0;
        let mut justified = 0;
        let mut attended_hours = 0.0;

        for lesson in &self.lessons {
            let status = self.status(lesson.id, entry.employee_id);
            match status {
                AttendanceStatus::Present => present += 1,
                AttendanceStatus::Absent => absent += 1,
                AttendanceStatus::AbsentJustified => justified += 1,
            }
            if status.counts_as_attended() {
                attended_hours += lesson.duration_hours;
            }
        }

        let total_lessons = self.total_lessons();
        let percentage = attendance_percentage(present + justified, total_lessons);

        EmployeeAttendanceStats {
            employee_id: entry.employee_id,
            name: entry.name(),
            total_lessons,
            present,
            absent,
            justified,
            percentage,
            total_hours: self.total_hours(),
            attended_hours,
            below_minimum: total_lessons > 0 && percentage < MINIMUM_ATTENDANCE_PERCENT,
        }
    }

    /// Statistics for every rostered employee, in roster order
    pub fn stats(&self) -> Vec<EmployeeAttendanceStats> {
        self.roster.iter().map(|e| self.employee_stats(e)).collect()
    }

    pub fn into_summary(self) -> MatrixSummary {
        let stats = self.stats();
        let total_lessons = self.total_lessons();
        let total_hours = self.total_hours();
        MatrixSummary {
            lessons: self.lessons,
            employees: self.roster,
            attendances: self.records,
            stats,
            total_lessons,
            total_hours,
        }
    }
}

/// Check every entry of a batch against the edition before anything is written
///
/// Returns the indexes of all entries whose lesson is not part of the edition
/// or whose employee is not registered to it.
pub fn validate_batch(
    entries: &[AttendanceEntry],
    lesson_ids: &HashSet<Uuid>,
    employee_ids: &HashSet<Uuid>,
) -> Result<(), ValidationError> {
    for (i, entry) in entries.iter().enumerate() {
        validate_attendance_note(i, entry.notes.as_deref())?;
    }

    let invalid: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !lesson_ids.contains(&e.lesson_id) || !employee_ids.contains(&e.employee_id))
        .map(|(i, _)| i)
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidReferences { indexes: invalid })
    }
}

/// One entry per (lesson, employee), the last one submitted winning
///
/// Entries keep the order of their last occurrence in the batch.
pub fn latest_per_key(entries: &[AttendanceEntry]) -> Vec<&AttendanceEntry> {
    let mut seen = HashSet::new();
    let mut latest: Vec<&AttendanceEntry> = entries
        .iter()
        .rev()
        .filter(|e| seen.insert((e.lesson_id, e.employee_id)))
        .collect();
    latest.reverse();
    latest
}

/// Registrations that should become Trained when an edition closes
///
/// An employee qualifies when the edition had lessons and their attendance
/// meets the minimum. Registrations already Trained are left alone.
pub fn registrations_to_promote(
    stats: &[EmployeeAttendanceStats],
    registrations: &[CourseRegistration],
) -> Vec<Uuid> {
    let qualified: HashSet<Uuid> = stats
        .iter()
        .filter(|s| s.total_lessons > 0 && !s.below_minimum)
        .map(|s| s.employee_id)
        .collect();

    registrations
        .iter()
        .filter(|r| qualified.contains(&r.employee_id))
        .filter(|r| r.status.can_transition_to(RegistrationStatus::Trained))
        .map(|r| r.id)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn entry(lesson_id: Uuid, employee_id: Uuid) -> AttendanceEntry {
        AttendanceEntry {
            lesson_id,
            employee_id,
            status: AttendanceStatus::Present,
            notes: None,
        }
    }

    fn registration(employee_id: Uuid, status: RegistrationStatus) -> CourseRegistration {
        CourseRegistration {
            id: Uuid::new_v4(),
            course_edition_id: Uuid::nil(),
            client_id: Uuid::nil(),
            employee_id,
            status,
            inserted_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_record_is_absent() {
        assert_eq!(status_or_absent(None), AttendanceStatus::Absent);
    }

    #[test]
    fn test_percentage_examples() {
        assert_eq!(attendance_percentage(0, 0), 0);
        assert_eq!(attendance_percentage(4, 4), 100);
        assert_eq!(attendance_percentage(2, 4), 50);
        assert_eq!(attendance_percentage(1, 3), 33);
        assert_eq!(attendance_percentage(2, 3), 67);
        // 0.5 rounds up
        assert_eq!(attendance_percentage(1, 8), 13);
    }

    #[test]
    fn test_no_lessons_means_zero_and_not_below_minimum() {
        let matrix = AttendanceMatrix::new(vec![], vec![employee("A")], vec![]);
        let stats = matrix.stats();
        assert_eq!(stats[0].total_lessons, 0);
        assert_eq!(stats[0].percentage, 0);
        assert!(!stats[0].below_minimum);
        assert_eq!(stats[0].total_hours, 0.0);
    }

    #[test]
    fn test_justified_counts_toward_percentage_and_hours() {
        let lessons: Vec<Lesson> = (1..=4)
            .map(|d| lesson(&format!("2024-03-0{}", d), 2.0))
            .collect();
        let a = employee("A");
        let mut records: Vec<Attendance> = lessons[..3]
            .iter()
            .map(|l| record(l, &a, AttendanceStatus::Present))
            .collect();
        records.push(record(&lessons[3], &a, AttendanceStatus::AbsentJustified));

        let matrix = AttendanceMatrix::new(lessons, vec![a], records);
        let stats = &matrix.stats()[0];
        assert_eq!((stats.present, stats.absent, stats.justified), (3, 0, 1));
        assert_eq!(stats.percentage, 100);
        assert_eq!(stats.attended_hours, 8.0);
        assert!(!stats.below_minimum);
    }

    #[test]
    fn test_half_present_half_absent() {
        let lessons: Vec<Lesson> = (1..=4)
            .map(|d| lesson(&format!("2024-03-0{}", d), 1.0))
            .collect();
        let a = employee("A");
        let records = vec![
            record(&lessons[0], &a, AttendanceStatus::Present),
            record(&lessons[1], &a, AttendanceStatus::Present),
            record(&lessons[2], &a, AttendanceStatus::Absent),
        ];
        // The fourth lesson has no record at all
        let matrix = AttendanceMatrix::new(lessons, vec![a], records);
        let stats = &matrix.stats()[0];
        assert_eq!((stats.present, stats.absent, stats.justified), (2, 2, 0));
        assert_eq!(stats.percentage, 50);
        assert!(stats.below_minimum);
    }

    #[test]
    fn test_minimum_threshold_boundary() {
        // 3 of 4 lessons: exactly 75%
        let lessons: Vec<Lesson> = (1..=4)
            .map(|d| lesson(&format!("2024-04-0{}", d), 1.0))
            .collect();
        let a = employee("A");
        let records = lessons[..3]
            .iter()
            .map(|l| record(l, &a, AttendanceStatus::Present))
            .collect();
        let stats = AttendanceMatrix::new(lessons, vec![a], records).stats();
        assert_eq!(stats[0].percentage, 75);
        assert!(!stats[0].below_minimum);

        // 37 of 50 lessons: 74%
        let lessons: Vec<Lesson> = (0..50)
            .map(|d| {
                let mut l = lesson("2024-01-01", 1.0);
                l.date += chrono::Duration::days(d);
                l
            })
            .collect();
        let b = employee("B");
        let records = lessons[..37]
            .iter()
            .map(|l| record(l, &b, AttendanceStatus::Present))
            .collect();
        let stats = AttendanceMatrix::new(lessons, vec![b], records).stats();
        assert_eq!(stats[0].percentage, 74);
        assert!(stats[0].below_minimum);
    }

    #[test]
    fn test_two_lesson_scenario() {
        let matrix = two_lesson_edition();
        let stats = matrix.stats();

        assert_eq!(stats[0].name, "A");
        assert_eq!(stats[0].percentage, 100);
        assert_eq!((stats[0].attended_hours, stats[0].total_hours), (8.0, 8.0));
        assert!(!stats[0].below_minimum);

        assert_eq!(stats[1].name, "B");
        assert_eq!((stats[1].present, stats[1].absent), (1, 1));
        assert_eq!(stats[1].percentage, 50);
        assert_eq!(stats[1].attended_hours, 4.0);
        assert!(stats[1].below_minimum);
    }

    #[test]
    fn test_summary_serializes_matrix_fields() {
        let summary = two_lesson_edition().into_summary();
        assert_eq!(summary.total_lessons, 2);
        assert_eq!(summary.total_hours, 8.0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["employees"].as_array().unwrap().len(), 2);
        assert_eq!(json["attendances"].as_array().unwrap().len(), 4);
        assert_eq!(json["stats"][1]["belowMinimum"], true);
        assert_eq!(json["totalHours"], 8.0);
    }

    #[test]
    fn test_lessons_are_chronological() {
        let matrix = two_lesson_edition();
        let dates: Vec<String> = matrix.lessons().iter().map(|l| l.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-08"]);

        let b = &matrix.roster()[1];
        assert_eq!(
            matrix.row(b.employee_id),
            vec![AttendanceStatus::Present, AttendanceStatus::Absent]
        );
    }

    #[test]
    fn test_records_outside_the_edition_are_ignored() {
        let l = lesson("2024-03-01", 4.0);
        let a = employee("A");
        let stranger = employee("Z");
        let foreign_lesson = lesson("2024-03-02", 4.0);
        let records = vec![
            record(&l, &stranger, AttendanceStatus::Present),
            record(&foreign_lesson, &a, AttendanceStatus::Present),
        ];
        let matrix = AttendanceMatrix::new(vec![l], vec![a], records);
        assert_eq!(matrix.stats()[0].absent, 1);
        assert!(matrix.into_summary().attendances.is_empty());
    }

    #[test]
    fn test_batch_with_one_invalid_entry_is_rejected() {
        let lessons: HashSet<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let employees: HashSet<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let l: Vec<Uuid> = lessons.iter().copied().collect();
        let e: Vec<Uuid> = employees.iter().copied().collect();

        let batch = vec![
            entry(l[0], e[0]),
            entry(l[1], e[0]),
            entry(l[0], e[1]),
            // Unregistered employee
            entry(l[1], Uuid::new_v4()),
        ];
        match validate_batch(&batch, &lessons, &employees) {
            Err(ValidationError::InvalidReferences { indexes }) => assert_eq!(indexes, vec![3]),
            other => panic!("expected rejection, got {:?}", other),
        }

        assert!(validate_batch(&batch[..3], &lessons, &employees).is_ok());
    }

    #[test]
    fn test_repeated_keys_keep_the_last_entry() {
        let (l1, l2, e1) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut late = entry(l1, e1);
        late.status = AttendanceStatus::AbsentJustified;
        let batch = vec![entry(l1, e1), entry(l2, e1), late];

        let latest = latest_per_key(&batch);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].lesson_id, l2);
        assert_eq!(latest[1].lesson_id, l1);
        assert_eq!(latest[1].status, AttendanceStatus::AbsentJustified);
    }

    #[test]
    fn test_batch_rejects_foreign_lesson() {
        let lesson_id = Uuid::new_v4();
        let employee_id = Uuid::new_v4();
        let lessons = HashSet::from([lesson_id]);
        let employees = HashSet::from([employee_id]);
        let batch = vec![entry(Uuid::new_v4(), employee_id), entry(lesson_id, employee_id)];
        assert!(matches!(
            validate_batch(&batch, &lessons, &employees),
            Err(ValidationError::InvalidReferences { ref indexes }) if indexes == &vec![0]
        ));
    }

    #[test]
    fn test_batch_rejects_oversized_note() {
        let lesson_id = Uuid::new_v4();
        let employee_id = Uuid::new_v4();
        let mut e = entry(lesson_id, employee_id);
        e.notes = Some("n".repeat(5000));
        assert!(matches!(
            validate_batch(&[e], &HashSet::from([lesson_id]), &HashSet::from([employee_id])),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_promotion_on_close() {
        let matrix = two_lesson_edition();
        let stats = matrix.stats();
        let a = stats[0].employee_id;
        let b = stats[1].employee_id;

        let reg_a = registration(a, RegistrationStatus::Confirmed);
        let reg_b = registration(b, RegistrationStatus::Confirmed);
        let promoted = registrations_to_promote(&stats, &[reg_a.clone(), reg_b]);
        assert_eq!(promoted, vec![reg_a.id]);

        let already = registration(a, RegistrationStatus::Trained);
        assert!(registrations_to_promote(&stats, &[already]).is_empty());
    }

    #[test]
    fn test_no_promotion_without_lessons() {
        let a = employee("A");
        let reg = registration(a.employee_id, RegistrationStatus::Inserted);
        let stats = AttendanceMatrix::new(vec![], vec![a], vec![]).stats();
        assert!(registrations_to_promote(&stats, &[reg]).is_empty());
    }

    fn arb_status() -> impl Strategy<Value = Option<AttendanceStatus>> {
        prop_oneof![
            Just(None),
            Just(Some(AttendanceStatus::Present)),
            Just(Some(AttendanceStatus::Absent)),
            Just(Some(AttendanceStatus::AbsentJustified)),
        ]
    }

    proptest! {
        /// Property: tallies always add up to the lesson count and the
        /// percentage and threshold follow from them.
        #[test]
        fn prop_tallies_are_consistent(
            grid in prop::collection::vec(prop::collection::vec(arb_status(), 0..12), 1..6),
            hours in prop::collection::vec(1u32..=8, 12),
        ) {
            let lesson_count = grid.iter().map(|row| row.len()).max().unwrap_or(0);
            let lessons: Vec<Lesson> = (0..lesson_count)
                .map(|i| {
                    let mut l = lesson("2024-01-01", hours[i] as f64);
                    l.date += chrono::Duration::days(i as i64);
                    l
                })
                .collect();
            let roster: Vec<RosterEntry> = (0..grid.len()).map(|i| employee(&format!("E{}", i))).collect();

            let mut records = Vec::new();
            for (row, emp) in grid.iter().zip(&roster) {
                for (status, l) in row.iter().zip(&lessons) {
                    if let Some(status) = status {
                        records.push(record(l, emp, *status));
                    }
                }
            }

            let matrix = AttendanceMatrix::new(lessons, roster, records);
            let n = matrix.total_lessons();
            for stats in matrix.stats() {
                prop_assert_eq!(stats.present + stats.absent + stats.justified, n);
                let expected = if n == 0 {
                    0
                } else {
                    (100.0 * (stats.present + stats.justified) as f64 / n as f64).round() as u32
                };
                prop_assert_eq!(stats.percentage, expected);
                prop_assert_eq!(stats.below_minimum, n > 0 && stats.percentage < 75);
                prop_assert!(stats.attended_hours <= stats.total_hours);
            }
        }
    }
}
