//! Notification and e-mail texts, plus the date windows the sweeps use

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::mailer::EmailMessage;
use crate::models::{
    display_name, EditionDetail, ExpiringCertificate, NewNotification, NotificationTarget,
    NotificationType,
};

/// Days before the registry deadline in which a reminder is sent
pub const DEADLINE_REMINDER_MIN_DAYS: i64 = 3;
pub const DEADLINE_REMINDER_MAX_DAYS: i64 = 7;

/// Certificates expiring within this many days are reported
pub const EXPIRY_HORIZON_DAYS: i64 = 30;

/// Inclusive range of registry deadlines that are due a reminder on `today`
pub fn deadline_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (
        today + Duration::days(DEADLINE_REMINDER_MIN_DAYS),
        today + Duration::days(DEADLINE_REMINDER_MAX_DAYS),
    )
}

/// Inclusive range of expiry dates reported on `today`
pub fn expiry_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(EXPIRY_HORIZON_DAYS))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "to be defined".to_string())
}

fn edition_label(edition: &EditionDetail) -> String {
    format!("{} #{}", edition.course_title, edition.edition.edition_number)
}

pub fn edition_published(edition: &EditionDetail) -> NewNotification {
    NewNotification {
        notification_type: NotificationType::EditionPublished,
        title: format!("New edition published: {}", edition_label(edition)),
        message: format!(
            "{} runs from {} to {}. Submit your registry by {}.",
            edition_label(edition),
            format_date(edition.edition.start_date),
            format_date(edition.edition.end_date),
            format_date(edition.edition.deadline_registry),
        ),
        target: NotificationTarget::Client(edition.edition.client_id),
        course_edition_id: Some(edition.edition.id),
    }
}

pub fn edition_published_email(edition: &EditionDetail, to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("New course edition: {}", edition_label(edition)),
        body: format!(
            "Dear {},\n\n\
             a new edition of \"{}\" has been scheduled for your company.\n\n\
             Start date: {}\n\
             End date: {}\n\
             Registry deadline: {}\n\n\
             Please submit the list of participating employees before the deadline.\n",
            edition.client_name,
            edition.course_title,
            format_date(edition.edition.start_date),
            format_date(edition.edition.end_date),
            format_date(edition.edition.deadline_registry),
        ),
    }
}

pub fn certificates_available(
    client_id: Uuid,
    course_title: Option<&str>,
    course_edition_id: Option<Uuid>,
    count: usize,
) -> NewNotification {
    let subject = match course_title {
        Some(title) => format!("for {}", title),
        None => "for your employees".to_string(),
    };
    NewNotification {
        notification_type: NotificationType::CertificatesAvailable,
        title: "Certificates available".to_string(),
        message: if count == 1 {
            format!("1 new certificate is available {}.", subject)
        } else {
            format!("{} new certificates are available {}.", count, subject)
        },
        target: NotificationTarget::Client(client_id),
        course_edition_id,
    }
}

pub fn certificates_available_email(notification: &NewNotification, to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: notification.title.clone(),
        body: format!(
            "{}\n\nYou can download them from the certificates section of the portal.\n",
            notification.message
        ),
    }
}

pub fn attendance_recorded(edition: &EditionDetail, updated: usize) -> NewNotification {
    NewNotification {
        notification_type: NotificationType::AttendanceRecorded,
        title: format!("Attendance updated: {}", edition_label(edition)),
        message: format!(
            "{} attendance record{} updated for {}.",
            updated,
            if updated == 1 { "" } else { "s" },
            edition_label(edition)
        ),
        target: NotificationTarget::Client(edition.edition.client_id),
        course_edition_id: Some(edition.edition.id),
    }
}

pub fn registry_submitted(edition: &EditionDetail, inserted: usize) -> NewNotification {
    NewNotification {
        notification_type: NotificationType::RegistrySubmitted,
        title: format!("Registry submitted: {}", edition_label(edition)),
        message: format!(
            "{} submitted {} employee{} for {}.",
            edition.client_name,
            inserted,
            if inserted == 1 { "" } else { "s" },
            edition_label(edition)
        ),
        target: NotificationTarget::Admins,
        course_edition_id: Some(edition.edition.id),
    }
}

pub fn simple_email(notification: &NewNotification, to: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: notification.title.clone(),
        body: format!("{}\n", notification.message),
    }
}

pub fn deadline_approaching(edition: &EditionDetail) -> NewNotification {
    NewNotification {
        notification_type: NotificationType::DeadlineApproaching,
        title: format!("Registry deadline approaching: {}", edition_label(edition)),
        message: format!(
            "No employees are registered yet for {}. The registry closes on {}.",
            edition_label(edition),
            format_date(edition.edition.deadline_registry)
        ),
        target: NotificationTarget::Client(edition.edition.client_id),
        course_edition_id: Some(edition.edition.id),
    }
}

/// Expiring certificates grouped by client, clients in a stable order
pub fn group_by_client(
    certificates: Vec<ExpiringCertificate>,
) -> Vec<(Uuid, Vec<ExpiringCertificate>)> {
    let mut groups: BTreeMap<Uuid, Vec<ExpiringCertificate>> = BTreeMap::new();
    for cert in certificates {
        groups.entry(cert.client_id).or_default().push(cert);
    }
    for certs in groups.values_mut() {
        certs.sort_by_key(|c| c.expires_at);
    }
    groups.into_iter().collect()
}

fn expiring_line(cert: &ExpiringCertificate) -> String {
    format!(
        "- {}: {} (expires {})",
        display_name(&cert.first_name, &cert.last_name),
        cert.course_title.as_deref().unwrap_or("external certificate"),
        cert.expires_at.format("%d/%m/%Y")
    )
}

pub fn certificates_expiring(client_id: Uuid, certificates: &[ExpiringCertificate]) -> NewNotification {
    NewNotification {
        notification_type: NotificationType::CertificateExpiring,
        title: "Certificates expiring soon".to_string(),
        message: format!(
            "{} certificate{} will expire within {} days:\n{}",
            certificates.len(),
            if certificates.len() == 1 { "" } else { "s" },
            EXPIRY_HORIZON_DAYS,
            certificates.iter().map(expiring_line).collect::<Vec<_>>().join("\n")
        ),
        target: NotificationTarget::Client(client_id),
        course_edition_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseEdition, EditionStatus};
    use chrono::Utc;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn edition() -> EditionDetail {
        EditionDetail {
            edition: CourseEdition {
                id: Uuid::new_v4(),
                course_id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                edition_number: 3,
                start_date: Some(date("2024-03-01")),
                end_date: Some(date("2024-03-08")),
                deadline_registry: Some(date("2024-02-20")),
                status: EditionStatus::Published,
                notes: None,
                deadline_reminder_sent_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            course_title: "Fire Safety".to_string(),
            client_name: "Acme".to_string(),
            client_contact_email: Some("hr@acme.example".to_string()),
            registration_count: 0,
        }
    }

    fn expiring(client_id: Uuid, last_name: &str, expires: &str) -> ExpiringCertificate {
        ExpiringCertificate {
            id: Uuid::new_v4(),
            client_id,
            client_name: "Acme".to_string(),
            client_contact_email: None,
            first_name: "Anna".to_string(),
            last_name: last_name.to_string(),
            course_title: None,
            expires_at: date(expires),
        }
    }

    #[test]
    fn test_deadline_window_is_three_to_seven_days() {
        let (from, to) = deadline_window(date("2024-02-10"));
        assert_eq!(from, date("2024-02-13"));
        assert_eq!(to, date("2024-02-17"));
    }

    #[test]
    fn test_expiry_window_spans_thirty_days() {
        let (from, to) = expiry_window(date("2024-01-01"));
        assert_eq!(from, date("2024-01-01"));
        assert_eq!(to, date("2024-01-31"));
    }

    #[test]
    fn test_published_notification_is_client_scoped() {
        let edition = edition();
        let n = edition_published(&edition);
        assert_eq!(n.target, NotificationTarget::Client(edition.edition.client_id));
        assert_eq!(n.title, "New edition published: Fire Safety #3");
        assert!(n.message.contains("01/03/2024"));
        assert!(n.message.contains("20/02/2024"));

        let email = edition_published_email(&edition, "hr@acme.example");
        assert!(email.body.contains("Registry deadline: 20/02/2024"));
    }

    #[test]
    fn test_certificates_available_counts() {
        let client = Uuid::new_v4();
        let one = certificates_available(client, Some("Fire Safety"), None, 1);
        assert_eq!(one.message, "1 new certificate is available for Fire Safety.");
        let many = certificates_available(client, None, None, 4);
        assert_eq!(many.message, "4 new certificates are available for your employees.");
    }

    #[test]
    fn test_registry_submission_goes_to_admins() {
        let n = registry_submitted(&edition(), 2);
        assert_eq!(n.target, NotificationTarget::Admins);
        assert_eq!(n.message, "Acme submitted 2 employees for Fire Safety #3.");
    }

    #[test]
    fn test_expiring_certificates_grouped_per_client() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let groups = group_by_client(vec![
            expiring(a, "Rossi", "2024-01-20"),
            expiring(b, "Bianchi", "2024-01-10"),
            expiring(a, "Verdi", "2024-01-05"),
        ]);
        assert_eq!(groups.len(), 2);
        let (_, for_a) = groups.iter().find(|(id, _)| *id == a).unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].last_name, "Verdi");

        let n = certificates_expiring(a, for_a);
        assert!(n.message.starts_with("2 certificates will expire within 30 days"));
        assert!(n.message.contains("- Verdi Anna: external certificate (expires 05/01/2024)"));
    }
}
