use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What the credential directory knows about a user once the password
/// checks out. Everything the token claims need.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub username: String,
    pub role_ids: Vec<Uuid>,
}

/// User directory collaborator. Account storage lives outside this core.
///
/// `verify_credentials` returns `None` for both an unknown username and a
/// wrong password; implementations must not let the two cases diverge in
/// any observable way (error shape or obvious timing).
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<Option<VerifiedIdentity>>;
}

struct DirectoryEntry {
    identity: VerifiedIdentity,
    password_hash: String,
}

/// Argon2-backed directory for development and tests.
pub struct InMemoryDirectory {
    users: RwLock<HashMap<(Uuid, String), DirectoryEntry>>,
    /// Burned on misses so unknown users cost a full verification too.
    dummy_hash: String,
}

impl InMemoryDirectory {
    pub fn new() -> Result<Self> {
        Ok(Self {
            users: RwLock::new(HashMap::new()),
            dummy_hash: hms_crypto::hash_secret(&hms_crypto::random_token_hex(16))?,
        })
    }

    pub async fn add_user(&self, identity: VerifiedIdentity, password: &str) -> Result<()> {
        let password_hash = hms_crypto::hash_secret(password)?;
        self.users.write().await.insert(
            (identity.tenant_id, identity.username.clone()),
            DirectoryEntry {
                identity,
                password_hash,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryDirectory {
    async fn verify_credentials(
        &self,
        tenant_id: Uuid,
        username: &str,
        password: &str,
    ) -> Result<Option<VerifiedIdentity>> {
        let users = self.users.read().await;

        match users.get(&(tenant_id, username.to_string())) {
            Some(entry) => {
                if hms_crypto::verify_secret(password, &entry.password_hash)? {
                    Ok(Some(entry.identity.clone()))
                } else {
                    Ok(None)
                }
            }
            None => {
                let _ = hms_crypto::verify_secret(password, &self.dummy_hash);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory_with_user(tenant_id: Uuid) -> (InMemoryDirectory, Uuid) {
        let directory = InMemoryDirectory::new().unwrap();
        let user_id = Uuid::new_v4();
        directory
            .add_user(
                VerifiedIdentity {
                    user_id,
                    tenant_id,
                    branch_id: Uuid::new_v4(),
                    username: "nward".to_string(),
                    role_ids: vec![Uuid::new_v4()],
                },
                "correct horse battery",
            )
            .await
            .unwrap();
        (directory, user_id)
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let tenant_id = Uuid::new_v4();
        let (directory, user_id) = directory_with_user(tenant_id).await;

        let identity = directory
            .verify_credentials(tenant_id, "nward", "correct horse battery")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.user_id, user_id);
    }

    #[tokio::test]
    async fn test_unknown_user_and_bad_password_look_identical() {
        let tenant_id = Uuid::new_v4();
        let (directory, _) = directory_with_user(tenant_id).await;

        let bad_password = directory
            .verify_credentials(tenant_id, "nward", "wrong")
            .await
            .unwrap();
        let unknown_user = directory
            .verify_credentials(tenant_id, "nobody", "wrong")
            .await
            .unwrap();
        assert!(bad_password.is_none());
        assert!(unknown_user.is_none());
    }

    #[tokio::test]
    async fn test_tenant_scoping() {
        let tenant_id = Uuid::new_v4();
        let (directory, _) = directory_with_user(tenant_id).await;

        let other_tenant = directory
            .verify_credentials(Uuid::new_v4(), "nward", "correct horse battery")
            .await
            .unwrap();
        assert!(other_tenant.is_none());
    }
}
