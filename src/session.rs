// File: src/session.rs
use crate::cache::LocalCache;
use crate::config::AccountConfig;
use crate::error::{Error, Result};
use crate::remote::TreePath;
use async_trait::async_trait;
use std::sync::Arc;

const SIGNED_IN_KEY: &str = "signedIn";

/// The signed-in account. Exists only between sign-in and sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub display_name: String,
    pub token: String,
}

impl Session {
    /// `users/<sanitized-email>/tasks`
    pub fn tasks_path(&self) -> Result<TreePath> {
        let path = TreePath::root()
            .child("users")?
            .child(&sanitize_email(&self.email))?
            .child("tasks")?;
        Ok(path)
    }
}

/// Maps an account identifier onto a legal path segment: every character
/// that is not ASCII alphanumeric becomes `_`. Distinct emails may collide.
pub fn sanitize_email(email: &str) -> String {
    email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self) -> Result<Session>;
    async fn sign_out(&self) -> Result<()>;
    /// The account that is still signed in from a previous run, if any.
    async fn restore(&self) -> Option<Session>;
}

/// Signs in the account from `config.toml`. The signed-in flag lives in the
/// local cache so a restart restores the session until the user signs out.
pub struct ConfigIdentity {
    account: Option<AccountConfig>,
    cache: Arc<dyn LocalCache>,
}

impl ConfigIdentity {
    pub fn new(account: Option<AccountConfig>, cache: Arc<dyn LocalCache>) -> Self {
        Self { account, cache }
    }

    fn session(&self) -> Result<Session> {
        let account = self
            .account
            .as_ref()
            .ok_or_else(|| Error::Auth("no [account] configured".into()))?;
        let email = account.email.trim();
        if email.is_empty() {
            return Err(Error::Auth("account email is empty".into()));
        }
        let display_name = if account.display_name.trim().is_empty() {
            email.split('@').next().unwrap_or(email).to_string()
        } else {
            account.display_name.trim().to_string()
        };
        Ok(Session {
            email: email.to_string(),
            display_name,
            token: account.token.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for ConfigIdentity {
    async fn sign_in(&self) -> Result<Session> {
        let session = self.session()?;
        self.cache
            .set(SIGNED_IN_KEY, &session.email)
            .map_err(|e| Error::Auth(e.to_string()))?;
        tracing::info!(email = %session.email, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.cache
            .remove(SIGNED_IN_KEY)
            .map_err(|e| Error::Auth(e.to_string()))?;
        tracing::info!("signed out");
        Ok(())
    }

    async fn restore(&self) -> Option<Session> {
        let remembered = self.cache.get(SIGNED_IN_KEY)?;
        let session = self.session().ok()?;
        // The configured account changed since the last run.
        (session.email == remembered).then_some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn account(email: &str) -> AccountConfig {
        AccountConfig {
            email: email.into(),
            display_name: String::new(),
            token: String::new(),
        }
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(sanitize_email("a.b@c.com"), "a_b_c_com");
        for raw in ["a.b@c.com", "first+last@mail.co.uk", "plain", ""] {
            let once = sanitize_email(raw);
            assert_eq!(sanitize_email(&once), once);
        }
    }

    #[test]
    fn test_tasks_path() {
        let session = Session {
            email: "a.b@c.com".into(),
            display_name: "A".into(),
            token: String::new(),
        };
        assert_eq!(
            session.tasks_path().expect("valid path").to_string(),
            "users/a_b_c_com/tasks"
        );
    }

    #[tokio::test]
    async fn test_sign_in_restore_sign_out() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let identity = ConfigIdentity::new(Some(account("ada@example.com")), cache.clone());

        assert_eq!(identity.restore().await, None);
        let session = identity.sign_in().await.expect("sign in");
        assert_eq!(session.display_name, "ada");
        assert_eq!(identity.restore().await, Some(session));

        identity.sign_out().await.expect("sign out");
        assert_eq!(identity.restore().await, None);
    }

    #[tokio::test]
    async fn test_sign_in_without_account_fails() {
        let identity = ConfigIdentity::new(None, Arc::new(MemoryCache::new()));
        assert!(matches!(identity.sign_in().await, Err(Error::Auth(_))));
    }
}
