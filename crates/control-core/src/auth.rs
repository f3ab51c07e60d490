//! Authenticator: admin-id equality or a per-chat access grant.
//!
//! Grounded on `gateway/src/authenticate.py`'s `Authenticator.is_admin`/
//! `is_allowed` verbatim.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::ControlError;

const GRANT_TTL: Duration = Duration::from_secs(604_800);
const GRANT_VALUE: &str = "access_granted";

pub struct ChatAuthenticator {
    cache: Arc<dyn Cache>,
    admin_user_id: i64,
}

impl ChatAuthenticator {
    pub fn new(cache: Arc<dyn Cache>, admin_user_id: i64) -> Self {
        ChatAuthenticator {
            cache,
            admin_user_id,
        }
    }

    fn grant_key(chat_id: i64) -> String {
        format!("graced_chat:{chat_id}")
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_user_id
    }

    pub async fn is_allowed(&self, user_id: i64, chat_id: i64) -> Result<bool, ControlError> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        Ok(self.cache.exists(&Self::grant_key(chat_id)).await?)
    }

    /// `.grace` — authorize a chat for one week.
    pub async fn grace(&self, chat_id: i64) -> Result<(), ControlError> {
        self.cache
            .set(&Self::grant_key(chat_id), GRANT_VALUE, Some(GRANT_TTL))
            .await?;
        Ok(())
    }

    /// `.smite` — revoke a chat's access grant.
    pub async fn smite(&self, chat_id: i64) -> Result<(), ControlError> {
        self.cache.delete(&Self::grant_key(chat_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn authenticator() -> ChatAuthenticator {
        ChatAuthenticator::new(Arc::new(MemoryCache::new()), 42)
    }

    #[test]
    fn admin_is_recognized_by_exact_id() {
        let auth = authenticator();
        assert!(auth.is_admin(42));
        assert!(!auth.is_admin(43));
    }

    #[tokio::test]
    async fn admin_is_always_allowed() {
        let auth = authenticator();
        assert!(auth.is_allowed(42, 999).await.unwrap());
    }

    #[tokio::test]
    async fn non_admin_denied_without_grant() {
        let auth = authenticator();
        assert!(!auth.is_allowed(7, 999).await.unwrap());
    }

    #[tokio::test]
    async fn grace_then_smite_toggles_access() {
        let auth = authenticator();
        auth.grace(999).await.unwrap();
        assert!(auth.is_allowed(7, 999).await.unwrap());
        auth.smite(999).await.unwrap();
        assert!(!auth.is_allowed(7, 999).await.unwrap());
    }
}
