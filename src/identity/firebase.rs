use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ExternalIdentity, ExternalSession, IdentityError, IdentityProvider};
use crate::config::IdentityConfig;

/// Identity Toolkit REST client (Firebase Authentication).
#[derive(Clone)]
pub struct FirebaseIdentity {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    local_id: String,
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseIdentity {
    pub fn new(http: reqwest::Client, config: &IdentityConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, IdentityError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("identity request accounts:{}", method))?;

        let status = res.status();
        if status.is_success() {
            let parsed = res
                .json::<T>()
                .await
                .with_context(|| format!("decode accounts:{} response", method))?;
            debug!(method, "identity call ok");
            return Ok(parsed);
        }

        let text = res.text().await.unwrap_or_default();
        let code = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| text.clone());
        warn!(method, %status, code = %code, "identity call failed");
        Err(classify(&code))
    }
}

/// Map an Identity Toolkit error code (e.g. `"INVALID_PASSWORD"` or
/// `"WEAK_PASSWORD : Password should be ..."`) to an [`IdentityError`].
fn classify(message: &str) -> IdentityError {
    let code = message.split_whitespace().next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED"
        | "INVALID_EMAIL" => IdentityError::InvalidCredentials,
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            IdentityError::InvalidToken
        }
        "EMAIL_EXISTS" => IdentityError::EmailExists,
        "WEAK_PASSWORD" => IdentityError::Rejected(message.to_string()),
        _ => IdentityError::Upstream(anyhow::anyhow!("identity provider error: {}", message)),
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn verify_id_token(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let res: LookupResponse = self.call("lookup", json!({ "idToken": id_token })).await?;
        let user = res
            .users
            .into_iter()
            .next()
            .ok_or(IdentityError::InvalidToken)?;
        let email = user.email.ok_or(IdentityError::InvalidToken)?;
        Ok(ExternalIdentity {
            uid: user.local_id,
            email,
            email_verified: user.email_verified,
            display_name: user.display_name,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ExternalSession, IdentityError> {
        let res: SessionResponse = self
            .call(
                "signInWithPassword",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        Ok(ExternalSession {
            uid: res.local_id,
            id_token: res.id_token,
        })
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<ExternalSession, IdentityError> {
        let res: SessionResponse = self
            .call(
                "signUp",
                json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;
        if let Some(name) = display_name {
            let _: Value = self
                .call("update", json!({ "idToken": res.id_token, "displayName": name }))
                .await?;
        }
        Ok(ExternalSession {
            uid: res.local_id,
            id_token: res.id_token,
        })
    }

    async fn send_email_verification(&self, id_token: &str) -> Result<(), IdentityError> {
        let _: Value = self
            .call(
                "sendOobCode",
                json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
            )
            .await?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let _: Value = self
            .call(
                "sendOobCode",
                json!({ "requestType": "PASSWORD_RESET", "email": email }),
            )
            .await?;
        Ok(())
    }

    async fn update_password(&self, id_token: &str, new_password: &str) -> Result<(), IdentityError> {
        let _: Value = self
            .call(
                "update",
                json!({ "idToken": id_token, "password": new_password, "returnSecureToken": false }),
            )
            .await?;
        Ok(())
    }

    async fn delete_account(&self, id_token: &str) -> Result<(), IdentityError> {
        let _: Value = self.call("delete", json!({ "idToken": id_token })).await?;
        Ok(())
    }
}
