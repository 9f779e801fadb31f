use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewRefreshToken, NewUser, RefreshTokenRecord, User};
use crate::db::{map_unique, RepoResult};

const USER_COLUMNS: &str = "id, username, email, password_hash, external_id, email_verified, \
                            is_active, created_at, updated_at";

const USER_UNIQUE: &[(&str, &str)] = &[
    ("users_email_key", "Email"),
    ("users_external_id_key", "External identity"),
];

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<User>>;
    async fn create(&self, new: NewUser) -> RepoResult<User>;
    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        email_verified: bool,
    ) -> RepoResult<User>;
    async fn set_email_verified(&self, id: Uuid, verified: bool) -> RepoResult<()>;
    /// Store a new password hash and invalidate every refresh token of the
    /// user in one transaction. Returns the number of tokens invalidated.
    async fn change_password(&self, id: Uuid, password_hash: &str) -> RepoResult<u64>;
    /// Hard delete. Pets, their activity records and refresh tokens go with it.
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

#[async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn insert(&self, new: NewRefreshToken) -> RepoResult<RefreshTokenRecord>;
    /// Valid and unexpired record with this hash, if any.
    async fn find_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>>;
    /// Atomically invalidate the active record for `old_hash` and insert its
    /// replacement for the same user and device. `None` if `old_hash` was not active.
    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>>;
    async fn revoke(&self, token_hash: &str) -> RepoResult<bool>;
    async fn revoke_all(&self, user_id: Uuid) -> RepoResult<u64>;
    async fn delete_expired(&self, now: OffsetDateTime) -> RepoResult<u64>;
    async fn count_active(&self, user_id: Uuid, now: OffsetDateTime) -> RepoResult<i64>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE external_id = $1",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, external_id, email_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.external_id)
        .bind(new.email_verified)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, USER_UNIQUE))
    }

    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        email_verified: bool,
    ) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET external_id = $2, email_verified = $3, updated_at = now()
             WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(external_id)
        .bind(email_verified)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique(e, USER_UNIQUE))
    }

    async fn set_email_verified(&self, id: Uuid, verified: bool) -> RepoResult<()> {
        sqlx::query("UPDATE users SET email_verified = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(verified)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> RepoResult<u64> {
        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&mut *tx)
            .await?;
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET is_valid = FALSE WHERE user_id = $1 AND is_valid",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(revoked)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut tx = self.db.begin().await?;
        // Children first so the whole cascade lives in this transaction even
        // if a foreign key lost its ON DELETE clause.
        sqlx::query(
            r#"
            DELETE FROM activity_records
             WHERE pet_id IN (SELECT id FROM pets WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM pets WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }
}

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, expires_at, is_valid, device_id, created_at";

#[derive(Clone)]
pub struct PgRefreshTokenRepo {
    db: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenRepo for PgRefreshTokenRepo {
    async fn insert(&self, new: NewRefreshToken) -> RepoResult<RefreshTokenRecord> {
        let rec = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, device_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(new.user_id)
        .bind(&new.token_hash)
        .bind(new.expires_at)
        .bind(&new.device_id)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>> {
        let rec = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            SELECT {}
              FROM refresh_tokens
             WHERE token_hash = $1 AND is_valid AND expires_at > $2
            "#,
            TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(rec)
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>> {
        let mut tx = self.db.begin().await?;

        // The row lock taken by UPDATE makes a concurrent rotation of the
        // same token see is_valid = false and fall through to None.
        let old = sqlx::query_as::<_, (Uuid, Option<String>)>(
            r#"
            UPDATE refresh_tokens
               SET is_valid = FALSE
             WHERE token_hash = $1 AND is_valid AND expires_at > $2
            RETURNING user_id, device_id
            "#,
        )
        .bind(old_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, device_id)) = old else {
            return Ok(None);
        };

        let rec = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, device_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .bind(new_hash)
        .bind(expires_at)
        .bind(device_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(rec))
    }

    async fn revoke(&self, token_hash: &str) -> RepoResult<bool> {
        let res = sqlx::query("UPDATE refresh_tokens SET is_valid = FALSE WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_all(&self, user_id: Uuid) -> RepoResult<u64> {
        let res = sqlx::query(
            "UPDATE refresh_tokens SET is_valid = FALSE WHERE user_id = $1 AND is_valid",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected())
    }

    async fn count_active(&self, user_id: Uuid, now: OffsetDateTime) -> RepoResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
              FROM refresh_tokens
             WHERE user_id = $1 AND is_valid AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
