use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,  // Argon2 PHC string, absent for provider-only accounts
    pub external_id: Option<String>,    // identity provider uid
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub external_id: Option<String>,
    pub email_verified: bool,
}

/// Persisted refresh token. Only the keyed hash of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub is_valid: bool,
    pub device_id: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Mirrors the `is_valid AND expires_at > now` predicate of the SQL queries.
#[cfg(test)]
impl RefreshTokenRecord {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.is_valid && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub device_id: Option<String>,
}
