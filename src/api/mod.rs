pub mod admin;
pub mod overtime;
pub mod user;

use crate::auth::auth::{ADMIN_ONLY, AuthUser};
use crate::error::{AppError, AppResult};
use crate::model::user::UserProfile;
use crate::state::AppState;

/// Loads the caller's profile. A token that outlived its account is
/// treated as signed out.
pub(crate) async fn current_profile(auth: &AuthUser, state: &AppState) -> AppResult<UserProfile> {
    state
        .users
        .get(&auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Akun tidak ditemukan. Silakan login kembali.".into()))
}

/// Admin check against the stored role, not the one baked into the token.
pub(crate) async fn require_admin(auth: &AuthUser, state: &AppState) -> AppResult<UserProfile> {
    let profile = current_profile(auth, state).await?;
    if profile.role.is_admin() {
        Ok(profile)
    } else {
        Err(AppError::Forbidden(ADMIN_ONLY.to_string()))
    }
}
