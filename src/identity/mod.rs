mod firebase;

pub use firebase::FirebaseIdentity;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired identity token")]
    InvalidToken,
    #[error("email already exists at identity provider")]
    EmailExists,
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Identity asserted by the provider for a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// A short-lived provider session obtained from credentials.
#[derive(Debug, Clone)]
pub struct ExternalSession {
    pub uid: String,
    pub id_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_id_token(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<ExternalSession, IdentityError>;
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<ExternalSession, IdentityError>;
    async fn send_email_verification(&self, id_token: &str) -> Result<(), IdentityError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;
    async fn update_password(&self, id_token: &str, new_password: &str) -> Result<(), IdentityError>;
    async fn delete_account(&self, id_token: &str) -> Result<(), IdentityError>;
}
