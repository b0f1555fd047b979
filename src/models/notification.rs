//! Notifications fanned out on edition and certificate events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{CurrentUser, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EditionPublished,
    CertificatesAvailable,
    DeadlineApproaching,
    CertificateExpiring,
    AttendanceRecorded,
    RegistrySubmitted,
}

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
    /// Every user of the portal
    Global,
    /// Every user of one client tenant
    Client(Uuid),
    /// A single user
    User(Uuid),
    /// Administrators only
    Admins,
}

impl NotificationTarget {
    /// Column values `(user_id, client_id, is_global)` for the notifications table
    pub fn columns(self) -> (Option<Uuid>, Option<Uuid>, bool) {
        match self {
            NotificationTarget::Global => (None, None, true),
            NotificationTarget::Client(client_id) => (None, Some(client_id), false),
            NotificationTarget::User(user_id) => (Some(user_id), None, false),
            NotificationTarget::Admins => (None, None, false),
        }
    }

    /// Inverse of [`NotificationTarget::columns`]
    pub fn from_columns(user_id: Option<Uuid>, client_id: Option<Uuid>, is_global: bool) -> Self {
        match (is_global, user_id, client_id) {
            (true, _, _) => NotificationTarget::Global,
            (false, Some(user_id), _) => NotificationTarget::User(user_id),
            (false, None, Some(client_id)) => NotificationTarget::Client(client_id),
            (false, None, None) => NotificationTarget::Admins,
        }
    }

    /// Visibility rule; the recipient listing applies the same rule in SQL
    pub fn is_visible_to(self, user: &CurrentUser) -> bool {
        match self {
            NotificationTarget::Global => true,
            NotificationTarget::User(user_id) => user.id == user_id,
            NotificationTarget::Client(client_id) => match user.role {
                UserRole::Admin => true,
                UserRole::Client => user.client_id == Some(client_id),
            },
            NotificationTarget::Admins => user.role == UserRole::Admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub user_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub course_edition_id: Option<Uuid>,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn target(&self) -> NotificationTarget {
        NotificationTarget::from_columns(self.user_id, self.client_id, self.is_global)
    }
}

/// Notification plus the reading user's read state
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub notification: Notification,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// A notification about to be written
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub target: NotificationTarget,
    pub course_edition_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarkedRead {
    pub marked: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            role: UserRole::Admin,
            client_id: None,
        }
    }

    fn client_user(client_id: Uuid) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "hr@client.example".to_string(),
            role: UserRole::Client,
            client_id: Some(client_id),
        }
    }

    #[test]
    fn test_target_columns_round_trip() {
        let id = Uuid::new_v4();
        for target in [
            NotificationTarget::Global,
            NotificationTarget::Client(id),
            NotificationTarget::User(id),
            NotificationTarget::Admins,
        ] {
            let (user_id, client_id, is_global) = target.columns();
            assert_eq!(
                NotificationTarget::from_columns(user_id, client_id, is_global),
                target
            );
        }
    }

    #[test]
    fn test_client_notifications_stay_within_tenant() {
        let tenant = Uuid::new_v4();
        let target = NotificationTarget::Client(tenant);
        assert!(target.is_visible_to(&client_user(tenant)));
        assert!(!target.is_visible_to(&client_user(Uuid::new_v4())));
        assert!(target.is_visible_to(&admin()));
    }

    #[test]
    fn test_admin_notifications_hidden_from_clients() {
        let target = NotificationTarget::Admins;
        assert!(target.is_visible_to(&admin()));
        assert!(!target.is_visible_to(&client_user(Uuid::new_v4())));
        assert!(NotificationTarget::Global.is_visible_to(&client_user(Uuid::new_v4())));
    }

    #[test]
    fn test_stored_row_resolves_to_its_target() {
        let user = client_user(Uuid::new_v4());
        let mut row = Notification {
            id: Uuid::new_v4(),
            notification_type: NotificationType::RegistrySubmitted,
            title: "Registry submitted".to_string(),
            message: "3 employees registered".to_string(),
            user_id: None,
            client_id: None,
            course_edition_id: None,
            is_global: false,
            created_at: Utc::now(),
        };
        assert_eq!(row.target(), NotificationTarget::Admins);
        assert!(!row.target().is_visible_to(&user));

        row.user_id = Some(user.id);
        assert!(row.target().is_visible_to(&user));

        row.user_id = None;
        row.is_global = true;
        assert!(row.target().is_visible_to(&user));
    }

    #[test]
    fn test_user_notifications_only_for_addressee() {
        let user = client_user(Uuid::new_v4());
        assert!(NotificationTarget::User(user.id).is_visible_to(&user));
        assert!(!NotificationTarget::User(Uuid::new_v4()).is_visible_to(&user));
    }
}
