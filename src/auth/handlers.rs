use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{MIN_PASSWORD_LEN, hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{NewUser, UserProfile, normalize_optional},
    },
    models::{LoginReqDto, LoginResponse, RegisterReq, TokenPair, TokenType},
    state::AppState,
    store::StoreError,
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{TimeZone, Utc};
use tracing::{debug, error, info, instrument};

const INVALID_CREDENTIALS: &str = "Email atau kata sandi salah.";
const INVALID_SESSION: &str = "Sesi tidak valid. Silakan login kembali.";

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issues an access/refresh pair and records the refresh token's jti.
async fn issue_tokens(
    profile: &UserProfile,
    state: &AppState,
    config: &Config,
) -> AppResult<TokenPair> {
    let token_error = |e: jsonwebtoken::errors::Error| {
        error!(error = %e, "Failed to sign token");
        AppError::Internal
    };

    let access_token = generate_access_token(
        &profile.id,
        &profile.email,
        profile.role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(token_error)?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        &profile.id,
        &profile.email,
        profile.role,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(token_error)?;

    debug!(user_id = %profile.id, jti = %refresh_claims.jti, "Storing refresh token");
    let expires_at = Utc
        .timestamp_opt(refresh_claims.exp as i64, 0)
        .single()
        .ok_or(AppError::Internal)?;
    state
        .users
        .store_refresh_token(&profile.id, &refresh_claims.jti, expires_at)
        .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn required(value: &str, message: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(message));
    }
    Ok(trimmed.to_string())
}

/// User registration handler. The role follows the stated jabatan.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Registered", body = UserProfile),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
#[instrument(name = "auth_register", skip(body, state), fields(email = %body.email))]
pub async fn register(
    body: web::Json<RegisterReq>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();

    let email = required(&body.email, "Email wajib diisi.")?.to_lowercase();
    if !email.contains('@') {
        return Err(AppError::validation("Format email tidak valid."));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Kata sandi minimal {} karakter.",
            MIN_PASSWORD_LEN
        )));
    }
    let name = required(&body.name, "Nama wajib diisi.")?;
    let nip = required(&body.nip, "NIP wajib diisi.")?;
    let jabatan = required(&body.jabatan, "Jabatan wajib diisi.")?;

    let password_hash = hash_password(&body.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        AppError::Internal
    })?;

    let profile = state
        .users
        .create(NewUser {
            email,
            password_hash,
            name,
            nip,
            pangkat: body.pangkat.as_deref().and_then(normalize_optional),
            role: Role::from_jabatan(&jabatan),
            jabatan,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AppError::conflict("Email sudah terdaftar."),
            other => other.into(),
        })?;

    info!(user_id = %profile.id, role = %profile.role, "User registered");
    Ok(HttpResponse::Created().json(profile))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[instrument(name = "auth_login", skip(body, state, config), fields(email = %body.email))]
pub async fn login(
    body: web::Json<LoginReqDto>,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    if body.email.trim().is_empty() || body.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AppError::validation("Email dan kata sandi wajib diisi."));
    }

    let credentials = match state.users.credentials_by_email(body.email.trim()).await? {
        Some(c) => c,
        None => {
            info!("Invalid credentials: user not found");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
    };

    if let Err(e) = verify_password(&body.password, &credentials.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let tokens = issue_tokens(&credentials.profile, &state, &config).await?;

    info!(user_id = %credentials.profile.id, "Login successful");
    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: credentials.profile,
    }))
}

/// Rotates a refresh token: the presented one is revoked and a new pair is
/// issued with the user's current role.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid or revoked")
    )
)]
pub async fn refresh_token(
    req: HttpRequest,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let token = bearer(&req).ok_or_else(|| AppError::Unauthorized(INVALID_SESSION.into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized(INVALID_SESSION.into()))?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized(INVALID_SESSION.into()));
    }

    if !state.users.revoke_refresh_token(&claims.jti).await? {
        info!(jti = %claims.jti, "Refresh token already revoked or unknown");
        return Err(AppError::Unauthorized(INVALID_SESSION.into()));
    }

    let profile = state
        .users
        .get(&claims.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_SESSION.into()))?;

    let tokens = issue_tokens(&profile, &state, &config).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Revokes the presented refresh token. Always 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = state.users.revoke_refresh_token(&claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}
