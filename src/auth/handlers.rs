use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailRequest, MessageResponse, ResetPasswordRequest, SignInRequest, SignUpRequest,
            TokenResponse, UpdateProfileRequest, UserQuery, UserResponse, VerifyOtpRequest,
        },
        extractors::{CurrentUser, Json, Query},
        otp,
        repo::{NewUser, ProfilePatch, User},
        validation,
    },
    email::{otp_email, reset_email, welcome_email, OTP_SUBJECT, RESET_SUBJECT, WELCOME_SUBJECT},
    error::{ApiError, FieldError},
    images::{self, AvatarUpload},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        // Room for the 5 MiB avatar plus the multipart framing.
        .route(
            "/signup",
            post(sign_up).layer(DefaultBodyLimit::max(6 * 1024 * 1024)),
        )
        .route("/signin", post(sign_in))
        .route("/verifyOTP", post(verify_otp))
        .route("/request-new-otp", post(request_new_otp))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/user", get(get_user))
        .route("/update", patch(update_profile))
        .route("/delete", delete(delete_account))
}

fn bad_multipart() -> ApiError {
    ApiError::Validation(vec![FieldError::new("body", "Invalid multipart form data")])
}

/// Credential and verification gate for sign-in. An unverified account is
/// blocked no matter what password was supplied.
fn check_sign_in(password_matches: bool, verified: bool) -> Result<(), ApiError> {
    if !password_matches {
        return Err(ApiError::unauthenticated("Invalid login credentials"));
    }
    if !verified {
        return Err(ApiError::unauthenticated("Please verify your email first"));
    }
    Ok(())
}

/// Issued codes are committed before dispatch; a failed email is logged and
/// never rolls the transition back.
async fn dispatch_email(state: &AppState, to: &str, subject: &str, html_body: &str) {
    match state.mailer.send(to, subject, html_body).await {
        Ok(true) => {}
        Ok(false) => warn!(to = %to, subject = %subject, "email not accepted for delivery"),
        Err(error) => {
            warn!(to = %to, subject = %subject, error = %error, "email dispatch failed")
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn sign_up(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut req = SignUpRequest::default();
    let mut avatar: Option<AvatarUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| bad_multipart())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field.bytes().await.map_err(|_| bad_multipart())?;
                if !body.is_empty() {
                    avatar = Some(AvatarUpload { body, content_type });
                }
            }
            "userName" => req.user_name = Some(field.text().await.map_err(|_| bad_multipart())?),
            "email" => req.email = Some(field.text().await.map_err(|_| bad_multipart())?),
            "password" => req.password = Some(field.text().await.map_err(|_| bad_multipart())?),
            "firstName" => req.first_name = Some(field.text().await.map_err(|_| bad_multipart())?),
            "lastName" => req.last_name = Some(field.text().await.map_err(|_| bad_multipart())?),
            "gender" => req.gender = Some(field.text().await.map_err(|_| bad_multipart())?),
            "bio" => req.bio = Some(field.text().await.map_err(|_| bad_multipart())?),
            _ => {}
        }
    }

    let data = validation::sign_up(req)?;

    // Friendly duplicate answers; the unique constraints close the race for
    // anything that slips between these checks and the insert.
    if User::find_by_email(&state.db, &data.email).await?.is_some() {
        warn!(email = %data.email, "signup with taken email");
        return Err(ApiError::DuplicateCredential("Email"));
    }
    if User::find_by_user_name(&state.db, &data.user_name)
        .await?
        .is_some()
    {
        warn!(user_name = %data.user_name, "signup with taken username");
        return Err(ApiError::DuplicateCredential("Username"));
    }

    let password_hash = state.hasher.hash(&data.password)?;

    // Upload before the insert so a storage failure leaves no account behind.
    let (avatar_url, avatar_external_id) = match avatar {
        Some(upload) => {
            let stored = images::store_avatar(state.storage.as_ref(), &data.user_name, upload)
                .await?;
            (stored.url, Some(stored.external_id))
        }
        None => (state.config.storage.default_avatar_url.clone(), None),
    };

    let pair = otp::issue(None, OffsetDateTime::now_utc(), state.config.otp_ttl_minutes)?;
    let created = User::create(
        &state.db,
        NewUser {
            user_name: &data.user_name,
            email: &data.email,
            password_hash: &password_hash,
            first_name: data.first_name.as_deref(),
            last_name: data.last_name.as_deref(),
            gender: data.gender.as_deref(),
            bio: data.bio.as_deref(),
            otp: &pair,
            avatar_url: &avatar_url,
            avatar_external_id: avatar_external_id.as_deref(),
        },
    )
    .await;

    let user = match created {
        Ok(user) => user,
        Err(error) => {
            // A lost insert (e.g. the duplicate race) must not leave the
            // already-uploaded avatar orphaned in the bucket.
            if let Some(external_id) = avatar_external_id.as_deref() {
                images::discard_avatar(state.storage.as_ref(), external_id).await;
            }
            return Err(error);
        }
    };

    dispatch_email(
        &state,
        &user.email,
        WELCOME_SUBJECT,
        &welcome_email(&user.user_name, &pair.code, state.config.otp_ttl_minutes),
    )
    .await;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse::new("User created successfully", user.into())),
    ))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let data = validation::sign_in(payload)?;

    let user = User::find_by_email(&state.db, &data.email)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("Invalid login credentials"))?;

    let password_matches = state.hasher.verify(&data.password, &user.password_hash)?;
    if let Err(error) = check_sign_in(password_matches, user.verified) {
        warn!(user_id = %user.id, verified = user.verified, "sign-in rejected");
        return Err(error);
    }

    let token = state
        .jwt
        .sign(user.id, &user.email, &user.user_name, user.role)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(TokenResponse::new("User logged in successfully", token)))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let data = validation::verify_otp(payload)?;

    let user = User::find_by_email(&state.db, &data.email)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    otp::verify(
        user.verified,
        user.otp().as_ref(),
        &data.otp,
        OffsetDateTime::now_utc(),
    )?;
    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn request_new_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = validation::email_only(payload)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    if user.verified {
        return Err(ApiError::AlreadyVerified);
    }

    let pair = otp::issue(
        user.otp().as_ref(),
        OffsetDateTime::now_utc(),
        state.config.otp_ttl_minutes,
    )?;
    User::set_otp(&state.db, user.id, &pair).await?;

    dispatch_email(
        &state,
        &user.email,
        OTP_SUBJECT,
        &otp_email(&user.user_name, &pair.code, state.config.otp_ttl_minutes),
    )
    .await;

    info!(user_id = %user.id, "otp reissued");
    Ok(Json(MessageResponse::new(
        "A new OTP has been sent to your email",
    )))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = validation::email_only(payload)?;

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    if !user.verified {
        warn!(user_id = %user.id, "reset requested for unverified account");
        return Err(ApiError::unauthenticated("Please verify your email first"));
    }

    let pair = otp::issue(
        user.reset().as_ref(),
        OffsetDateTime::now_utc(),
        state.config.otp_ttl_minutes,
    )?;
    User::set_reset_token(&state.db, user.id, &pair).await?;

    dispatch_email(
        &state,
        &user.email,
        RESET_SUBJECT,
        &reset_email(&user.user_name, &pair.code, state.config.otp_ttl_minutes),
    )
    .await;

    info!(user_id = %user.id, "reset token issued");
    Ok(Json(MessageResponse::new(
        "A password reset code has been sent to your email",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let data = validation::reset_password(payload)?;

    let password_hash = state.hasher.hash(&data.password)?;
    let user = User::consume_reset_token(&state.db, &data.token, &password_hash)
        .await?
        .ok_or(ApiError::InvalidOrExpiredToken)?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse::new(
        "Password has been reset successfully",
    )))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, query.id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(UserResponse::new(
        "User fetched successfully",
        user.into(),
    )))
}

#[instrument(skip(state, current, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let data = validation::update_profile(payload)?;

    let user = User::update_profile(
        &state.db,
        current.id,
        ProfilePatch {
            user_name: data.user_name.as_deref(),
            first_name: data.first_name.as_deref(),
            last_name: data.last_name.as_deref(),
            gender: data.gender.as_deref(),
            bio: data.bio.as_deref(),
        },
    )
    .await?
    .ok_or(ApiError::AccountNotFound)?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(UserResponse::new(
        "Profile updated successfully",
        user.into(),
    )))
}

#[instrument(skip(state, current))]
pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::delete(&state.db, current.id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    // The row is gone either way; a failed cleanup only leaks the object.
    if let Some(external_id) = user.avatar_external_id.as_deref() {
        if let Err(error) = state.storage.delete(external_id).await {
            warn!(user_id = %user.id, error = %error, "avatar cleanup failed");
        }
    }

    info!(user_id = %user.id, "account deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_composes_with_app_state() {
        let _app: Router = routes().with_state(AppState::fake());
    }

    #[test]
    fn unverified_accounts_cannot_sign_in_regardless_of_password() {
        let with_correct_password = check_sign_in(true, false).unwrap_err();
        match with_correct_password {
            ApiError::Unauthenticated(message) => {
                assert_eq!(message, "Please verify your email first")
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(check_sign_in(false, false).is_err());
    }

    #[test]
    fn wrong_password_is_rejected_without_revealing_which_field_failed() {
        match check_sign_in(false, true).unwrap_err() {
            ApiError::Unauthenticated(message) => {
                assert_eq!(message, "Invalid login credentials")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn verified_accounts_with_the_right_password_pass_the_gate() {
        assert!(check_sign_in(true, true).is_ok());
    }

    #[test]
    fn success_envelopes_serialize_with_their_payload_field() {
        let token = serde_json::to_value(TokenResponse::new("User logged in successfully", "t".into()))
            .unwrap();
        assert_eq!(token["success"], true);
        assert_eq!(token["message"], "User logged in successfully");
        assert_eq!(token["token"], "t");
    }
}
