//! Portal users

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Client,
}

/// Authenticated caller, inserted into request extensions by the session middleware
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub client_id: Option<Uuid>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Whether the caller may read data owned by `client_id`
    pub fn can_access_client(&self, client_id: Uuid) -> bool {
        match self.role {
            UserRole::Admin => true,
            UserRole::Client => self.client_id == Some(client_id),
        }
    }

    /// Tenant filter to apply to listings: `None` means unrestricted
    pub fn tenant_scope(&self) -> Option<Uuid> {
        match self.role {
            UserRole::Admin => None,
            // A client user without a tenant sees nothing
            UserRole::Client => Some(self.client_id.unwrap_or_else(Uuid::nil)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_user_is_scoped_to_own_tenant() {
        let tenant = Uuid::new_v4();
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "hr@client.example".to_string(),
            role: UserRole::Client,
            client_id: Some(tenant),
        };
        assert!(!user.is_admin());
        assert!(user.can_access_client(tenant));
        assert!(!user.can_access_client(Uuid::new_v4()));
        assert_eq!(user.tenant_scope(), Some(tenant));
    }

    #[test]
    fn test_admin_is_unscoped() {
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            role: UserRole::Admin,
            client_id: None,
        };
        assert!(user.can_access_client(Uuid::new_v4()));
        assert_eq!(user.tenant_scope(), None);
    }
}
