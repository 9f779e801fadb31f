use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::Sha256;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    claims::Claims,
    jwt::JwtKeys,
    repo::RefreshTokenRepo,
    repo_types::{NewRefreshToken, RefreshTokenRecord},
};
use crate::config::JwtConfig;

const REFRESH_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues access tokens and manages the refresh-token ledger.
///
/// Refresh tokens are opaque random secrets. Only `HMAC-SHA256(pepper, secret)`
/// is persisted, so a leaked table cannot be replayed.
pub struct SessionIssuer {
    keys: JwtKeys,
    tokens: Arc<dyn RefreshTokenRepo>,
    mac: Hmac<Sha256>,
    refresh_ttl: TimeDuration,
}

impl SessionIssuer {
    pub fn new(cfg: &JwtConfig, tokens: Arc<dyn RefreshTokenRepo>) -> anyhow::Result<Self> {
        let mac = Hmac::<Sha256>::new_from_slice(cfg.refresh_pepper.as_bytes())
            .context("init refresh token hmac")?;
        Ok(Self {
            keys: JwtKeys::new(cfg),
            tokens,
            mac,
            refresh_ttl: TimeDuration::minutes(cfg.refresh_ttl_minutes),
        })
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.keys.sign_access(user_id)
    }

    pub fn verify_access_token(&self, token: &str) -> anyhow::Result<Claims> {
        self.keys.verify(token)
    }

    /// Hex HMAC of a raw refresh secret. Deterministic for a given pepper.
    pub fn hash_token(&self, raw: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(raw.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn new_secret() -> String {
        let mut bytes = [0u8; REFRESH_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Persist a new refresh token and return its raw secret. The secret is
    /// not recoverable afterwards.
    pub async fn issue_refresh_token(
        &self,
        user_id: Uuid,
        device_id: Option<String>,
    ) -> anyhow::Result<String> {
        let raw = Self::new_secret();
        let rec = self
            .tokens
            .insert(NewRefreshToken {
                user_id,
                token_hash: self.hash_token(&raw),
                expires_at: OffsetDateTime::now_utc() + self.refresh_ttl,
                device_id,
            })
            .await
            .context("store refresh token")?;
        debug!(user_id = %user_id, token_id = %rec.id, "refresh token issued");
        Ok(raw)
    }

    pub async fn issue_pair(
        &self,
        user_id: Uuid,
        device_id: Option<String>,
    ) -> anyhow::Result<TokenPair> {
        let access_token = self.issue_access_token(user_id)?;
        let refresh_token = self.issue_refresh_token(user_id, device_id).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// The stored record for `raw` if it is valid and unexpired. Unknown,
    /// revoked, expired and malformed secrets all yield `None`.
    pub async fn validate_refresh_token(
        &self,
        raw: &str,
    ) -> anyhow::Result<Option<RefreshTokenRecord>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let rec = self
            .tokens
            .find_active(&self.hash_token(raw), OffsetDateTime::now_utc())
            .await
            .context("look up refresh token")?;
        Ok(rec)
    }

    /// Swap `raw` for a fresh pair bound to the same user and device.
    /// `None` when `raw` is not currently valid; of two concurrent rotations of
    /// the same secret at most one succeeds.
    pub async fn rotate(&self, raw: &str) -> anyhow::Result<Option<(Uuid, TokenPair)>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let new_raw = Self::new_secret();
        let rotated = self
            .tokens
            .rotate(
                &self.hash_token(raw),
                &self.hash_token(&new_raw),
                now + self.refresh_ttl,
                now,
            )
            .await
            .context("rotate refresh token")?;

        let Some(rec) = rotated else {
            warn!("refresh token rotation rejected");
            return Ok(None);
        };

        let access_token = self.issue_access_token(rec.user_id)?;
        debug!(user_id = %rec.user_id, token_id = %rec.id, "refresh token rotated");
        Ok(Some((
            rec.user_id,
            TokenPair {
                access_token,
                refresh_token: new_raw,
            },
        )))
    }

    /// Idempotent. Returns whether a record matched.
    pub async fn revoke(&self, raw: &str) -> anyhow::Result<bool> {
        let hit = self
            .tokens
            .revoke(&self.hash_token(raw))
            .await
            .context("revoke refresh token")?;
        Ok(hit)
    }

    pub async fn revoke_all(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let n = self
            .tokens
            .revoke_all(user_id)
            .await
            .context("revoke user refresh tokens")?;
        info!(user_id = %user_id, revoked = n, "refresh tokens revoked");
        Ok(n)
    }

    pub async fn sweep_expired(&self) -> anyhow::Result<u64> {
        let n = self
            .tokens
            .delete_expired(OffsetDateTime::now_utc())
            .await
            .context("delete expired refresh tokens")?;
        if n > 0 {
            debug!(deleted = n, "expired refresh tokens swept");
        }
        Ok(n)
    }

    pub async fn active_sessions(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let n = self
            .tokens
            .count_active(user_id, OffsetDateTime::now_utc())
            .await
            .context("count refresh tokens")?;
        Ok(n)
    }
}
