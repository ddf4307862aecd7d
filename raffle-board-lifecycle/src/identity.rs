use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::UserId;

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("no credentials were presented")]
    MissingToken,
    #[error("the presented token is not valid: {0}")]
    InvalidToken(String),
    #[error("the identity provider is unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Resolves a bearer token into the stable identifier of the user it was
/// issued to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<UserId, IdentityError>;
}

/// Fixed token to user mapping for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, UserId>,
}

impl StaticTokens {
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: impl Into<UserId>) -> Self {
        self.tokens.insert(token.into(), user.into());
        self
    }
}

impl<T: Into<String>, U: Into<UserId>> FromIterator<(T, U)> for StaticTokens {
    fn from_iter<I: IntoIterator<Item = (T, U)>>(iter: I) -> Self {
        Self {
            tokens: iter
                .into_iter()
                .map(|(token, user)| (token.into(), user.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn verify_token(&self, token: &str) -> Result<UserId, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("unknown token".to_owned()))
    }
}
