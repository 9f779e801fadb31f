use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        AuthResponse, ChangePasswordRequest, DeleteAccountRequest, ExternalLoginRequest,
        ExternalRegisterRequest, ExternalRegisterResponse, LoginRequest, MessageResponse,
        PasswordResetRequest, PublicUser, RefreshRequest, RegisterRequest,
        ResendVerificationRequest, RevokedResponse, SessionsResponse,
    },
    extractors::AuthUser,
    password::{hash_password, verify_login, verify_password},
    repo_types::{NewUser, User},
    services::{check_email, check_password, check_username, normalize_email},
};
use crate::{
    error::{AppError, AppResult},
    identity::{ExternalIdentity, IdentityProvider},
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/external/login", post(external_login))
        .route("/auth/external/register", post(external_register))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/password-reset", post(password_reset))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/sessions", get(sessions))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/change-password", post(change_password))
        .route("/auth/delete-account", delete(delete_account))
}

fn identity(state: &AppState) -> AppResult<&dyn IdentityProvider> {
    state
        .identity
        .as_deref()
        .ok_or(AppError::Unavailable("Identity provider"))
}

/// The configured provider, when `user` is linked to a provider account.
fn linked_provider<'a>(state: &'a AppState, user: &User) -> Option<&'a dyn IdentityProvider> {
    user.external_id.as_ref()?;
    state.identity.as_deref()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    check_username(&payload.username)?;
    check_email(&email)?;
    check_password(&payload.password)?;

    let hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            username: payload.username.trim().to_string(),
            email,
            password_hash: Some(hash),
            external_id: None,
            email_verified: false,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "create user failed");
            AppError::from(e)
        })?;

    let pair = state.session.issue_pair(user.id, payload.device_id).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(AuthResponse::new(pair, &user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);

    let found = state.users.find_by_email(&email).await?;
    let stored = found.as_ref().and_then(|u| u.password_hash.as_deref());
    let ok = verify_login(&payload.password, stored)?;
    let user = match found {
        Some(user) if ok && user.is_active => user,
        Some(user) => {
            warn!(user_id = %user.id, "login rejected");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
        }
    };

    if let Err(e) = state.session.sweep_expired().await {
        warn!(error = %e, "expired refresh token sweep failed");
    }

    let pair = state.session.issue_pair(user.id, payload.device_id).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse::new(pair, &user)))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user_id, pair) = state
        .session
        .rotate(&payload.refresh_token)
        .await?
        .ok_or(AppError::Unauthorized(INVALID_REFRESH))?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized(INVALID_REFRESH))?;

    info!(user_id = %user.id, "session refreshed");
    Ok(Json(AuthResponse::new(pair, &user)))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<MessageResponse>> {
    // Unknown, expired and already revoked tokens log out silently.
    if let Some(rec) = state
        .session
        .validate_refresh_token(&payload.refresh_token)
        .await?
    {
        state.session.revoke(&payload.refresh_token).await?;
        info!(user_id = %rec.user_id, "session revoked");
    }
    Ok(Json(MessageResponse {
        message: "Logged out",
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<RevokedResponse>> {
    let revoked = state.session.revoke_all(user.id).await?;
    Ok(Json(RevokedResponse { revoked }))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let Some(current_hash) = user.password_hash.as_deref() else {
        return Err(AppError::validation(
            "Password sign-in is not enabled for this account",
        ));
    };
    if !verify_password(&payload.current_password, current_hash)? {
        warn!("change password with wrong current password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
    }
    check_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    let revoked = state.users.change_password(user.id, &hash).await?;

    if let Some(provider) = linked_provider(&state, &user) {
        let synced = match provider.sign_in(&user.email, &payload.current_password).await {
            Ok(session) => {
                provider
                    .update_password(&session.id_token, &payload.new_password)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            warn!(error = %e, "provider password not updated");
        }
    }

    info!(revoked, "password changed");
    Ok(Json(MessageResponse {
        message: "Password changed",
    }))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<DeleteAccountRequest>,
) -> AppResult<Json<MessageResponse>> {
    if let Some(hash) = user.password_hash.as_deref() {
        let given = payload.password.as_deref().unwrap_or_default();
        if !verify_password(given, hash)? {
            warn!("delete account with wrong password");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
        }
    }

    if let (Some(provider), Some(password)) =
        (linked_provider(&state, &user), payload.password.as_deref())
    {
        let removed = match provider.sign_in(&user.email, password).await {
            Ok(session) => provider.delete_account(&session.id_token).await,
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(error = %e, "provider account not deleted");
        }
    }

    state.users.delete(user.id).await?;
    info!("account deleted");
    Ok(Json(MessageResponse {
        message: "Account deleted",
    }))
}

#[instrument(skip(user))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<SessionsResponse>> {
    let active_sessions = state.session.active_sessions(user.id).await?;
    Ok(Json(SessionsResponse { active_sessions }))
}

/// Find the local account for a verified provider identity, linking by email
/// or creating one on first sign-in.
async fn resolve_external_user(state: &AppState, ext: &ExternalIdentity) -> AppResult<User> {
    if let Some(user) = state.users.find_by_external_id(&ext.uid).await? {
        if !user.email_verified {
            state.users.set_email_verified(user.id, true).await?;
        }
        return Ok(user);
    }

    let email = normalize_email(&ext.email);
    if let Some(user) = state.users.find_by_email(&email).await? {
        info!(user_id = %user.id, "linking provider identity to existing account");
        let linked = state.users.link_external_id(user.id, &ext.uid, true).await?;
        return Ok(linked);
    }

    let username = ext
        .display_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let user = state
        .users
        .create(NewUser {
            username,
            email,
            password_hash: None,
            external_id: Some(ext.uid.clone()),
            email_verified: true,
        })
        .await?;
    info!(user_id = %user.id, "account created from provider identity");
    Ok(user)
}

#[instrument(skip(state, payload))]
pub async fn external_login(
    State(state): State<AppState>,
    Json(payload): Json<ExternalLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let provider = identity(&state)?;
    let ext = provider.verify_id_token(&payload.id_token).await?;
    if !ext.email_verified {
        warn!(uid = %ext.uid, "provider login with unverified email");
        return Err(AppError::Unauthorized("Email not verified"));
    }

    let user = resolve_external_user(&state, &ext).await?;
    if !user.is_active {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS));
    }

    let pair = state.session.issue_pair(user.id, payload.device_id).await?;
    info!(user_id = %user.id, "user logged in via identity provider");
    Ok(Json(AuthResponse::new(pair, &user)))
}

#[instrument(skip(state, payload))]
pub async fn external_register(
    State(state): State<AppState>,
    Json(payload): Json<ExternalRegisterRequest>,
) -> AppResult<(StatusCode, Json<ExternalRegisterResponse>)> {
    let provider = identity(&state)?;
    let email = normalize_email(&payload.email);
    check_username(&payload.username)?;
    check_email(&email)?;
    check_password(&payload.password)?;

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let username = payload.username.trim().to_string();
    let session = provider
        .create_account(&email, &payload.password, Some(&username))
        .await?;
    if let Err(e) = provider.send_email_verification(&session.id_token).await {
        warn!(error = %e, uid = %session.uid, "verification email not sent");
    }

    let hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(NewUser {
            username,
            email,
            password_hash: Some(hash),
            external_id: Some(session.uid),
            email_verified: false,
        })
        .await?;

    info!(user_id = %user.id, "user registered with identity provider");
    Ok((
        StatusCode::CREATED,
        Json(ExternalRegisterResponse {
            message: "Registration successful. Check your email to verify the account.",
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> AppResult<Json<MessageResponse>> {
    let provider = identity(&state)?;
    let email = normalize_email(&payload.email);
    let session = provider.sign_in(&email, &payload.password).await?;
    provider.send_email_verification(&session.id_token).await?;
    Ok(Json(MessageResponse {
        message: "Verification email sent",
    }))
}

/// Always answers 200 so the endpoint cannot be used to probe for accounts.
#[instrument(skip(state, payload))]
pub async fn password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    let provider = identity(&state)?;
    let email = normalize_email(&payload.email);
    if let Err(e) = provider.send_password_reset(&email).await {
        warn!(error = %e, "password reset email not sent");
    }
    Ok(Json(MessageResponse {
        message: "If the account exists, a password reset email has been sent",
    }))
}
