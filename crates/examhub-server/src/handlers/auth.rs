use axum::extract::State;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use examhub_core::{credentials, gate, validation};
use examhub_store::otps::OtpPurpose;
use examhub_store::users::{NewUser, UserRow};

use super::{blocking, ApiResult};
use crate::error::ApiError;
use crate::extract::{Authenticated, Payload};
use crate::mailer::MailPayload;
use crate::response::ApiResponse;
use crate::server::AppState;

const BAD_CREDENTIALS: &str = "invalid email or password";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "primary_exam", alias = "exam")]
    pub primary_exam: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserRow,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

pub(crate) async fn hash(password: String) -> Result<String, ApiError> {
    let secret = SecretString::from(password);
    blocking(move || credentials::hash_password(&secret)).await
}

pub(crate) async fn check(password: String, encoded: String) -> Result<bool, ApiError> {
    let secret = SecretString::from(password);
    blocking(move || credentials::verify_password(&secret, &encoded)).await
}

/// Issue and mail a verification code. A code that could not be mailed
/// is discarded.
async fn send_verification(state: &AppState, email: &str) -> Result<(), ApiError> {
    let otps = state.otps();
    let otp = otps.issue(email, OtpPurpose::VerifyEmail)?;
    if let Err(e) = state.mailer.send(email, MailPayload::VerifyEmail { otp }).await {
        otps.discard(email, OtpPurpose::VerifyEmail)?;
        return Err(ApiError::Upstream(e.to_string()));
    }
    Ok(())
}

#[instrument(skip_all, fields(exam = %req.primary_exam))]
pub async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> ApiResult<UserRow> {
    validation::password(&req.password)?;
    let exam = gate::exam_for_change(&req.primary_exam)?;
    let password_hash = hash(req.password).await?;

    let user = state.users().create(&NewUser {
        name: &req.name,
        email: &req.email,
        password_hash,
        primary_exam: exam,
    })?;
    if let Err(e) = send_verification(&state, &user.email).await {
        // the address must stay free for a retry
        state.users().discard_unverified(&user.id)?;
        return Err(e);
    }
    info!(user_id = %user.id, exam = %exam, "user registered");
    Ok(ApiResponse::created(user))
}

#[instrument(skip_all)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Payload(req): Payload<VerifyOtpRequest>,
) -> ApiResult<UserRow> {
    state.otps().verify(&req.email, OtpPurpose::VerifyEmail, &req.otp)?;
    let users = state.users();
    if !users.mark_verified(&req.email)? {
        return Err(ApiError::NotFound("account".into()));
    }
    let user = users
        .find_by_email(&req.email)?
        .ok_or_else(|| ApiError::NotFound("account".into()))?;
    info!(user_id = %user.id, "email verified");
    Ok(ApiResponse::ok(user))
}

/// Same answer whether or not the address is registered.
#[instrument(skip_all)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Payload(req): Payload<EmailRequest>,
) -> ApiResult<Message> {
    if let Some(user) = state.users().find_by_email(&req.email)? {
        if !user.is_verified {
            send_verification(&state, &user.email).await?;
        }
    }
    Ok(ApiResponse::ok(Message {
        message: "if the account needs verification, a new code has been sent",
    }))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let users = state.users();
    let user = users
        .find_by_email(&req.email)?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.into()))?;
    let stored = users.password_hash(&user.id)?;
    if !check(req.password, stored).await? {
        warn!(user_id = %user.id, "login failed");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
    }
    if !user.is_verified {
        return Err(ApiError::Unauthorized("email not verified".into()));
    }
    if !user.is_active {
        return Err(ApiError::Unauthorized("account is inactive".into()));
    }

    let token = state.sessions().create(&user.id)?;
    info!(user_id = %user.id, "logged in");
    Ok(ApiResponse::ok(LoginResponse {
        token: token.expose_secret().to_string(),
        user,
    }))
}

pub async fn logout(State(state): State<AppState>, auth: Authenticated) -> ApiResult<serde_json::Value> {
    state.sessions().revoke(&auth.token)?;
    Ok(ApiResponse::done())
}

/// Same answer whether or not the address is registered. A token whose
/// mail could not be sent is discarded.
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Payload(req): Payload<EmailRequest>,
) -> ApiResult<Message> {
    if let Some(user) = state.users().find_by_email(&req.email)? {
        if user.is_active {
            let tokens = state.reset_tokens();
            let token = tokens.issue(&user.id)?;
            let raw = token.expose_secret().to_string();
            if let Err(e) = state.mailer.send(&user.email, MailPayload::PasswordReset { token }).await {
                tokens.discard(&raw)?;
                return Err(ApiError::Upstream(e.to_string()));
            }
        }
    }
    Ok(ApiResponse::ok(Message {
        message: "if the address is registered, a reset link has been sent",
    }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Payload(req): Payload<ResetPasswordRequest>,
) -> ApiResult<Message> {
    validation::password(&req.password)?;
    let password_hash = hash(req.password).await?;
    state.reset_tokens().consume(&req.token, &password_hash)?;
    Ok(ApiResponse::ok(Message {
        message: "password updated",
    }))
}
