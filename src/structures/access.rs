//! Who counts as an administrator, and how administrators are added and
//! removed.

use log::{info, warn};

use super::{
    auth::AuthProvider,
    errors::DashboardError,
    model::ApprovalStatus,
    store::AdminStore,
};

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admin_email: String,
}

impl AccessPolicy {
    pub fn new(admin_email: &str) -> Self {
        Self {
            admin_email: admin_email.trim().to_string(),
        }
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// The configured administrator, or anyone with an approved row. A
    /// failed lookup means "not an admin".
    pub async fn is_admin<S: AdminStore + ?Sized>(&self, store: &S, email: &str) -> bool {
        if email.is_empty() {
            return false;
        }
        if !self.admin_email.is_empty() && email == self.admin_email {
            return true;
        }
        match store.is_approved_admin(email).await {
            Ok(approved) => approved,
            Err(e) => {
                warn!("admin lookup for {} failed: {}", email, e);
                false
            }
        }
    }
}

/// The "create admin" form.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewAdmin {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl NewAdmin {
    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.email.trim().is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(DashboardError::Validation(
                "Please fill in all fields".to_string(),
            ));
        }
        if self.password != self.confirm_password {
            return Err(DashboardError::Validation(
                "Passwords do not match".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminGrant {
    /// New account, approved.
    Created,
    /// Existing account with an approval row, flipped back to approved.
    Promoted,
    /// Existing account without a row; one was added.
    Added,
}

pub async fn create_admin<S, A>(
    store: &S,
    auth: &A,
    request: &NewAdmin,
    approved_by: &str,
) -> Result<AdminGrant, DashboardError>
where
    S: AdminStore + ?Sized,
    A: AuthProvider + ?Sized,
{
    request.validate()?;
    let email = request.email.trim();
    match auth.sign_up(email, &request.password).await {
        Ok(user) => {
            if let Err(e) = store.insert_approved_admin(email, approved_by).await {
                warn!("approval row for new admin {} not written: {}", email, e);
            }
            info!("created admin {} ({}), approved by {}", email, user.id, approved_by);
            Ok(AdminGrant::Created)
        }
        Err(DashboardError::AlreadyRegistered) => match store.find_admin(email).await? {
            Some(_) => {
                store.approve_existing_admin(email, approved_by).await?;
                info!("re-approved existing admin {}", email);
                Ok(AdminGrant::Promoted)
            }
            None => {
                store.insert_approved_admin(email, approved_by).await?;
                info!("approved existing user {} as admin", email);
                Ok(AdminGrant::Added)
            }
        },
        Err(e) => Err(e),
    }
}

pub async fn revoke_admin<S: AdminStore + ?Sized>(
    store: &S,
    id: i64,
) -> Result<(), DashboardError> {
    store.set_admin_status(id, ApprovalStatus::Denied).await?;
    info!("revoked admin approval {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{auth::testing::FakeAuth, memory::MemoryStore};

    const OWNER: &str = "owner@example.org";

    fn request(email: &str, password: &str, confirm: &str) -> NewAdmin {
        NewAdmin {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[actix_web::test]
    async fn test_configured_email_is_admin_even_without_a_table() {
        let policy = AccessPolicy::new(OWNER);
        assert!(policy.is_admin(&MemoryStore::unavailable(), OWNER).await);
    }

    #[actix_web::test]
    async fn test_missing_table_means_not_admin() {
        let policy = AccessPolicy::new(OWNER);
        assert!(!policy.is_admin(&MemoryStore::unavailable(), "v@example.org").await);
    }

    #[actix_web::test]
    async fn test_empty_email_is_never_admin() {
        let policy = AccessPolicy::new("");
        assert!(!policy.is_admin(&MemoryStore::new(), "").await);
    }

    #[actix_web::test]
    async fn test_created_admin_is_admin_until_revoked() {
        let store = MemoryStore::new();
        let auth = FakeAuth::default();
        let policy = AccessPolicy::new(OWNER);

        let grant = create_admin(&store, &auth, &request("new@example.org", "pw", "pw"), OWNER)
            .await
            .unwrap();
        assert_eq!(grant, AdminGrant::Created);
        assert!(policy.is_admin(&store, "new@example.org").await);

        let row = store.find_admin("new@example.org").await.unwrap().unwrap();
        revoke_admin(&store, row.id).await.unwrap();
        assert!(!policy.is_admin(&store, "new@example.org").await);
    }

    #[actix_web::test]
    async fn test_existing_account_is_promoted_or_added() {
        let store = MemoryStore::new();
        let auth = FakeAuth::with_account("old@example.org", "pw");

        let grant = create_admin(&store, &auth, &request("old@example.org", "x", "x"), OWNER)
            .await
            .unwrap();
        assert_eq!(grant, AdminGrant::Added);

        let row = store.find_admin("old@example.org").await.unwrap().unwrap();
        revoke_admin(&store, row.id).await.unwrap();
        let grant = create_admin(&store, &auth, &request("old@example.org", "x", "x"), OWNER)
            .await
            .unwrap();
        assert_eq!(grant, AdminGrant::Promoted);
        assert!(store.is_approved_admin("old@example.org").await.unwrap());
    }

    #[actix_web::test]
    async fn test_password_mismatch_is_rejected_before_sign_up() {
        let store = MemoryStore::new();
        let auth = FakeAuth::default();
        let result =
            create_admin(&store, &auth, &request("a@example.org", "one", "two"), OWNER).await;
        assert!(matches!(result, Err(DashboardError::Validation(_))));
        assert!(auth.sign_in("a@example.org", "one").await.is_err());
        assert!(store.find_admin("a@example.org").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn test_approval_row_failure_does_not_fail_creation() {
        let store = MemoryStore::unavailable();
        let auth = FakeAuth::default();
        let grant = create_admin(&store, &auth, &request("n@example.org", "pw", "pw"), OWNER)
            .await
            .unwrap();
        assert_eq!(grant, AdminGrant::Created);
    }
}
