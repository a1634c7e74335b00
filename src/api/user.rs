use crate::api::current_profile;
use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::user::{UserPatch, UserProfile};
use crate::state::AppState;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

/// Self-service profile edit. Role is not editable here.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileReq {
    pub name: Option<String>,
    pub nip: Option<String>,
    /// Empty string clears the rank
    pub pangkat: Option<String>,
    pub jabatan: Option<String>,
}

/// Trims and rejects blank values for required profile fields.
pub(crate) fn required_field(value: Option<String>, label: &str) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(AppError::validation(format!("{} tidak boleh kosong.", label))),
        other => Ok(other),
    }
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn me(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let profile = current_profile(&auth, &state).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Update the caller's profile
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateProfileReq,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Nothing to update or blank field"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_me(
    auth: AuthUser,
    body: web::Json<UpdateProfileReq>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let caller = current_profile(&auth, &state).await?;
    let body = body.into_inner();
    let patch = UserPatch {
        name: required_field(body.name, "Nama")?,
        nip: required_field(body.nip, "NIP")?,
        pangkat: body.pangkat,
        jabatan: required_field(body.jabatan, "Jabatan")?,
        role: None,
    };
    if patch.is_empty() {
        return Err(AppError::validation("Tidak ada data yang diubah."));
    }

    let profile = state.users.update(&caller.id, patch).await?;
    info!(user_id = %profile.id, "Profile updated");
    Ok(HttpResponse::Ok().json(profile))
}
