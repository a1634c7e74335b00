use crate::api::require_admin;
use crate::api::user::required_field;
use crate::auth::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::model::overtime::{OvertimeRecord, PhotoKind, VerificationStatus};
use crate::model::role::Role;
use crate::model::user::{UserPatch, UserProfile};
use crate::service::report::{ReportPeriod, export_csv, export_filename, paginate, period_bounds};
use crate::service::uploader::UploadFailure;
use crate::service::verification::Decision;
use crate::state::AppState;
use crate::store::RecordFilter;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, web};
use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportParams {
    /// daily | weekly | monthly | all
    pub period: Option<ReportPeriod>,
    /// Filter by employee (user id)
    pub employee_id: Option<String>,
    /// Case-insensitive substring of the purpose
    pub purpose: Option<String>,
    /// Pending | Accepted | Rejected
    pub verification_status: Option<VerificationStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    /// Items per page, at most 100
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
#[aliases(OvertimePage = Page<OvertimeRecord>)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 1)]
    pub total: u64,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct VerifyReq {
    /// Omit to clear an earlier note
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AdminUpdateUserReq {
    pub name: Option<String>,
    pub nip: Option<String>,
    pub pangkat: Option<String>,
    pub jabatan: Option<String>,
    pub role: Option<Role>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn report_filter(params: &ReportParams, offset: FixedOffset) -> RecordFilter {
    let (since, until) = period_bounds(params.period.unwrap_or_default(), Utc::now(), offset);
    RecordFilter {
        employee_id: non_blank(&params.employee_id),
        verification_status: params.verification_status,
        since,
        until,
        purpose_contains: non_blank(&params.purpose),
        ..Default::default()
    }
}

/// List overtime records (admin)
#[utoipa::path(
    get,
    path = "/api/admin/overtime",
    params(ReportParams),
    responses(
        (status = 200, description = "Paginated records, newest first", body = OvertimePage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_records(
    auth: AuthUser,
    query: web::Query<ReportParams>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;

    let (page, per_page, offset) = paginate(query.page, query.per_page);
    let filter = report_filter(&query, state.report_offset);
    let total = state.records.count(&filter).await?;
    let data = state
        .records
        .query(&RecordFilter {
            limit: Some(per_page),
            offset,
            ..filter
        })
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data,
        page,
        per_page,
        total,
    }))
}

async fn verify(
    auth: AuthUser,
    path: web::Path<String>,
    body: Option<web::Json<VerifyReq>>,
    state: web::Data<AppState>,
    decision: Decision,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    let notes = body.and_then(|b| b.into_inner().notes);
    let record = state.desk.verify(&path.into_inner(), decision, notes).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Accept a completed overtime session
#[utoipa::path(
    put,
    path = "/api/admin/overtime/{id}/accept",
    params(("id" = String, Path, description = "Overtime record id")),
    request_body(content = VerifyReq, description = "Optional note"),
    responses(
        (status = 200, description = "Accepted", body = OvertimeRecord),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Session not checked out yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn accept(
    auth: AuthUser,
    path: web::Path<String>,
    body: Option<web::Json<VerifyReq>>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    verify(auth, path, body, state, Decision::Accepted).await
}

/// Reject a completed overtime session
#[utoipa::path(
    put,
    path = "/api/admin/overtime/{id}/reject",
    params(("id" = String, Path, description = "Overtime record id")),
    request_body(content = VerifyReq, description = "Optional note"),
    responses(
        (status = 200, description = "Rejected", body = OvertimeRecord),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Session not checked out yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn reject(
    auth: AuthUser,
    path: web::Path<String>,
    body: Option<web::Json<VerifyReq>>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    verify(auth, path, body, state, Decision::Rejected).await
}

/// Permanently delete an overtime record
#[utoipa::path(
    delete,
    path = "/api/admin/overtime/{id}",
    params(("id" = String, Path, description = "Overtime record id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_record(
    auth: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    state.desk.delete(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Re-run person detection on a stored photo
#[utoipa::path(
    post,
    path = "/api/admin/overtime/{id}/photos/{kind}/validate",
    params(
        ("id" = String, Path, description = "Overtime record id"),
        ("kind" = PhotoKind, Path, description = "checkIn | checkOut")
    ),
    responses(
        (status = 200, description = "Record with the new validation result", body = OvertimeRecord),
        (status = 400, description = "Photo classifier not configured"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Photo not uploaded yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn revalidate_photo(
    auth: AuthUser,
    path: web::Path<(String, PhotoKind)>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    let (id, kind) = path.into_inner();
    let record = state.desk.revalidate_photo(&id, kind).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Download the filtered report as CSV
#[utoipa::path(
    get,
    path = "/api/admin/overtime/export",
    params(ReportParams),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn export(
    auth: AuthUser,
    query: web::Query<ReportParams>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;

    let records = state
        .records
        .query(&report_filter(&query, state.report_offset))
        .await?;
    let filename = export_filename(Utc::now(), state.report_offset);
    info!(rows = records.len(), filename = %filename, "Exporting overtime report");

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(export_csv(&records, state.report_offset)))
}

/// Photo uploads that exhausted their retries
#[utoipa::path(
    get,
    path = "/api/admin/uploads/failures",
    responses((status = 200, description = "Failed uploads, oldest first", body = [UploadFailure])),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn upload_failures(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    Ok(HttpResponse::Ok().json(state.uploader.failures()))
}

/// Retry a failed photo upload
#[utoipa::path(
    post,
    path = "/api/admin/uploads/failures/{id}/{kind}/retry",
    params(
        ("id" = String, Path, description = "Overtime record id"),
        ("kind" = PhotoKind, Path, description = "checkIn | checkOut")
    ),
    responses(
        (status = 202, description = "Upload re-queued"),
        (status = 404, description = "No failed upload for this photo")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn retry_upload(
    auth: AuthUser,
    path: web::Path<(String, PhotoKind)>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    let (id, kind) = path.into_inner();
    match state.uploader.retry_failed(&id, kind) {
        Some(_) => Ok(HttpResponse::Accepted().finish()),
        None => Err(AppError::not_found("Tidak ada unggahan gagal untuk foto ini.")),
    }
}

/// List registered users
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses((status = 200, description = "All users", body = [UserProfile])),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_users(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    Ok(HttpResponse::Ok().json(state.users.list().await?))
}

/// Edit a user's profile or role
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = AdminUpdateUserReq,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Nothing to update or blank field"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_user(
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<AdminUpdateUserReq>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    let body = body.into_inner();
    let patch = UserPatch {
        name: required_field(body.name, "Nama")?,
        nip: required_field(body.nip, "NIP")?,
        pangkat: body.pangkat,
        jabatan: required_field(body.jabatan, "Jabatan")?,
        role: body.role,
    };
    if patch.is_empty() {
        return Err(AppError::validation("Tidak ada data yang diubah."));
    }

    let profile = state.users.update(&path.into_inner(), patch).await?;
    info!(user_id = %profile.id, role = %profile.role, "User updated by admin");
    Ok(HttpResponse::Ok().json(profile))
}

/// Delete a user. Their overtime records are kept.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Cannot delete own account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn delete_user(
    auth: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    require_admin(&auth, &state).await?;
    let id = path.into_inner();
    if id == auth.user_id {
        return Err(AppError::validation("Anda tidak dapat menghapus akun Anda sendiri."));
    }
    if !state.users.delete(&id).await? {
        return Err(AppError::not_found("Pengguna tidak ditemukan."));
    }
    info!(user_id = %id, "User deleted");
    Ok(HttpResponse::NoContent().finish())
}
