//! Notification fan-out
//!
//! Writes notification rows for edition and certificate events and sends the
//! matching e-mails through a [`Mailer`]. Delivery is best effort: failures are
//! collected into a [`FanOutReport`] and logged, never propagated to the
//! operation that triggered them.

pub mod mailer;
pub mod messages;

pub use mailer::{EmailMessage, LogMailer, MailError, Mailer};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::models::{EditionDetail, ExpiringCertificate, NewNotification};

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub notification_id: Option<Uuid>,
    pub emails_sent: usize,
    pub errors: Vec<String>,
}

/// Outcome of one run of the scheduled sweeps
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deadline_reminders: usize,
    pub expiry_notices: usize,
    pub certificates_flagged: usize,
    pub emails_sent: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    fn absorb(&mut self, report: FanOutReport) {
        self.emails_sent += report.emails_sent;
        self.errors.extend(report.errors);
    }
}

/// Insert a notification row, inside a transaction or directly on the pool
pub async fn store_notification<'e, E>(
    executor: E,
    notification: &NewNotification,
) -> Result<Uuid, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let (user_id, client_id, is_global) = notification.target.columns();
    sqlx::query_scalar(
        r#"
        INSERT INTO notifications
            (notification_type, title, message, user_id, client_id, course_edition_id, is_global)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(notification.notification_type)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(user_id)
    .bind(client_id)
    .bind(notification.course_edition_id)
    .bind(is_global)
    .fetch_one(executor)
    .await
}

/// Send one e-mail, recording the outcome in `report`
pub async fn deliver(mailer: Option<&dyn Mailer>, message: EmailMessage, report: &mut FanOutReport) {
    let mailer = match mailer {
        Some(m) => m,
        None => return,
    };

    match mailer.send(&message).await {
        Ok(()) => report.emails_sent += 1,
        Err(e) => {
            tracing::warn!("Failed to send e-mail to {}: {}", message.to, e);
            report.errors.push(format!("{}: {}", message.to, e));
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
    mailer: Option<Arc<dyn Mailer>>,
    admin_email: Option<String>,
}

impl Notifier {
    /// `mailer` is `None` when e-mail is disabled; notifications are still written
    pub fn new(pool: PgPool, mailer: Option<Arc<dyn Mailer>>, admin_email: Option<String>) -> Self {
        Self {
            pool,
            mailer,
            admin_email,
        }
    }

    async fn fan_out(&self, notification: NewNotification, email: Option<EmailMessage>) -> FanOutReport {
        let mut report = FanOutReport::default();

        match store_notification(&self.pool, &notification).await {
            Ok(id) => report.notification_id = Some(id),
            Err(e) => {
                tracing::error!(
                    "Failed to store {:?} notification: {}",
                    notification.notification_type,
                    e
                );
                report.errors.push(format!("notification: {}", e));
            }
        }

        if let Some(email) = email {
            deliver(self.mailer.as_deref(), email, &mut report).await;
        }

        report
    }

    pub async fn edition_published(&self, edition: &EditionDetail) -> FanOutReport {
        let email = edition
            .client_contact_email
            .as_deref()
            .map(|to| messages::edition_published_email(edition, to));
        let report = self.fan_out(messages::edition_published(edition), email).await;
        tracing::info!(
            "Edition {} published, notification {:?}, {} e-mail(s) sent",
            edition.edition.id,
            report.notification_id,
            report.emails_sent
        );
        report
    }

    pub async fn certificates_uploaded(
        &self,
        client_id: Uuid,
        contact_email: Option<&str>,
        course_title: Option<&str>,
        course_edition_id: Option<Uuid>,
        count: usize,
    ) -> FanOutReport {
        let notification =
            messages::certificates_available(client_id, course_title, course_edition_id, count);
        let email = contact_email.map(|to| messages::certificates_available_email(&notification, to));
        self.fan_out(notification, email).await
    }

    pub async fn attendance_recorded(&self, edition: &EditionDetail, updated: usize) -> FanOutReport {
        self.fan_out(messages::attendance_recorded(edition, updated), None)
            .await
    }

    pub async fn registry_submitted(&self, edition: &EditionDetail, inserted: usize) -> FanOutReport {
        let notification = messages::registry_submitted(edition, inserted);
        let email = self
            .admin_email
            .as_deref()
            .map(|to| messages::simple_email(&notification, to));
        self.fan_out(notification, email).await
    }

    /// Run the registry-deadline and certificate-expiry sweeps for `today`
    ///
    /// Each edition or certificate is claimed before anything is sent, so
    /// overlapping runs never notify twice.
    pub async fn run_sweeps(&self, today: NaiveDate) -> Result<SweepReport, sqlx::Error> {
        let mut report = SweepReport::default();
        self.sweep_deadlines(today, &mut report).await?;
        self.sweep_expiring_certificates(today, &mut report).await?;

        tracing::info!(
            "Sweep for {}: {} deadline reminder(s), {} expiry notice(s) covering {} certificate(s), {} e-mail error(s)",
            today,
            report.deadline_reminders,
            report.expiry_notices,
            report.certificates_flagged,
            report.errors.len()
        );
        Ok(report)
    }

    async fn sweep_deadlines(&self, today: NaiveDate, report: &mut SweepReport) -> Result<(), sqlx::Error> {
        let (from, to) = messages::deadline_window(today);

        let editions = sqlx::query_as::<_, EditionDetail>(
            r#"
            SELECT e.*, c.title AS course_title, cl.name AS client_name,
                   cl.contact_email AS client_contact_email, 0::BIGINT AS registration_count
            FROM course_editions e
            JOIN courses c ON c.id = e.course_id
            JOIN clients cl ON cl.id = e.client_id
            WHERE e.status = 'published'
              AND e.deadline_registry BETWEEN $1 AND $2
              AND e.deadline_reminder_sent_at IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM course_registrations r WHERE r.course_edition_id = e.id
              )
            ORDER BY e.deadline_registry
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        for edition in editions {
            let claimed = sqlx::query(
                "UPDATE course_editions SET deadline_reminder_sent_at = NOW() \
                 WHERE id = $1 AND deadline_reminder_sent_at IS NULL",
            )
            .bind(edition.edition.id)
            .execute(&self.pool)
            .await?
            .rows_affected()
                == 1;
            if !claimed {
                continue;
            }

            let notification = messages::deadline_approaching(&edition);
            let email = edition
                .client_contact_email
                .as_deref()
                .map(|to| messages::simple_email(&notification, to));
            report.absorb(self.fan_out(notification, email).await);
            report.deadline_reminders += 1;
        }

        Ok(())
    }

    async fn sweep_expiring_certificates(
        &self,
        today: NaiveDate,
        report: &mut SweepReport,
    ) -> Result<(), sqlx::Error> {
        let (from, to) = messages::expiry_window(today);

        let certificates = sqlx::query_as::<_, ExpiringCertificate>(
            r#"
            SELECT ce.id, ce.client_id, cl.name AS client_name,
                   cl.contact_email AS client_contact_email,
                   emp.first_name, emp.last_name, c.title AS course_title, ce.expires_at
            FROM certificates ce
            JOIN employees emp ON emp.id = ce.employee_id
            JOIN clients cl ON cl.id = ce.client_id
            LEFT JOIN course_editions ed ON ed.id = ce.course_edition_id
            LEFT JOIN courses c ON c.id = ed.course_id
            WHERE ce.expires_at BETWEEN $1 AND $2
              AND ce.expiry_notified_at IS NULL
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        for (client_id, certs) in messages::group_by_client(certificates) {
            let ids: Vec<Uuid> = certs.iter().map(|c| c.id).collect();
            let claimed: Vec<Uuid> = sqlx::query_scalar(
                "UPDATE certificates SET expiry_notified_at = NOW() \
                 WHERE id = ANY($1) AND expiry_notified_at IS NULL RETURNING id",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

            let certs: Vec<ExpiringCertificate> =
                certs.into_iter().filter(|c| claimed.contains(&c.id)).collect();
            if certs.is_empty() {
                continue;
            }

            let notification = messages::certificates_expiring(client_id, &certs);
            let email = certs[0]
                .client_contact_email
                .as_deref()
                .map(|to| messages::simple_email(&notification, to));
            report.absorb(self.fan_out(notification, email).await);
            report.expiry_notices += 1;
            report.certificates_flagged += certs.len();
        }

        Ok(())
    }
}

/// Run the sweeps every `every` until the runtime shuts down
pub fn spawn_sweep_task(notifier: Notifier, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = notifier.run_sweeps(Utc::now().date_naive()).await {
                tracing::error!("Scheduled sweep failed: {}", e);
            }
        }
    })
}
