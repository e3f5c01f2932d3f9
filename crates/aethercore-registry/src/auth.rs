//! Authentication hook for validating player identity.
//!
//! Aethercore doesn't implement authentication itself — the deployment
//! does (JWT validation, an auth API, whatever the platform uses). The
//! server calls [`Authenticator::authenticate`] during the handshake,
//! before any session exists.

use crate::RegistryError;

/// Validates a client's auth token and returns their account id.
///
/// `Send + Sync + 'static` because one authenticator is shared across
/// every connection task for the lifetime of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token.
    ///
    /// # Returns
    /// - `Ok(account_id)` — the verified account identity
    /// - `Err(RegistryError::AuthFailed)` — token invalid or expired
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<String, RegistryError>> + Send;
}

/// Accepts any non-empty token and uses it verbatim as the account id.
///
/// For development and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureAuthenticator;

impl Authenticator for InsecureAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<String, RegistryError> {
        if token.is_empty() {
            return Err(RegistryError::AuthFailed("empty token".into()));
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insecure_authenticator_accepts_any_token() {
        let account = InsecureAuthenticator.authenticate("ada").await.unwrap();
        assert_eq!(account, "ada");
    }

    #[tokio::test]
    async fn test_insecure_authenticator_rejects_empty_token() {
        let result = InsecureAuthenticator.authenticate("").await;
        assert!(matches!(result, Err(RegistryError::AuthFailed(_))));
    }
}
