use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no identity token available")]
    NoToken,
}

/// Identity collaborator: supplies the bearer token attached to outgoing
/// requests and the signed-in user's email for the share-by-email action.
/// Real identity backends live behind this trait; token values are never
/// logged, only their lengths.
pub trait TokenProvider: Send + Sync {
    fn id_token(&self, force_refresh: bool) -> Result<String, AuthError>;
    fn user_email(&self) -> Option<String>;
}

/// Fixed-credential provider for the CLI and tests.
pub struct StaticTokenProvider {
    token: String,
    email: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, email: Option<String>) -> Self {
        Self {
            token: token.into(),
            email,
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn id_token(&self, _force_refresh: bool) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NoToken);
        }
        debug!("id token fetched, len={}", self.token.len());
        Ok(self.token.clone())
    }

    fn user_email(&self) -> Option<String> {
        self.email.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_reads_as_not_authenticated() {
        let provider = StaticTokenProvider::new("", None);
        assert!(provider.id_token(false).is_err());
    }

    #[test]
    fn test_token_and_email_pass_through() {
        let provider = StaticTokenProvider::new("tok-123", Some("dev@example.com".into()));
        assert_eq!(provider.id_token(true).unwrap(), "tok-123");
        assert_eq!(provider.user_email().as_deref(), Some("dev@example.com"));
    }
}
