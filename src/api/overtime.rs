use crate::api::current_profile;
use crate::auth::auth::AuthUser;
use crate::error::AppResult;
use crate::model::overtime::{GeoLocation, OvertimeRecord};
use crate::service::attendance::Capture;
use crate::state::AppState;
use crate::store::RecordEvent;
use actix_web::{HttpResponse, web};
use futures::stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "purpose": "Menyelesaikan laporan kegiatan",
    "photo": "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ...",
    "location": { "latitude": 3.5952, "longitude": 98.6722 }
}))]
pub struct CheckInReq {
    /// Keterangan lembur
    pub purpose: String,
    /// `data:image/jpeg;base64,...`
    pub photo: Option<String>,
    pub location: Option<GeoLocation>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutReq {
    pub photo: Option<String>,
    pub location: Option<GeoLocation>,
}

/// Start an overtime session
#[utoipa::path(
    post,
    path = "/api/overtime/check-in",
    request_body = CheckInReq,
    responses(
        (status = 201, description = "Checked in; the photo uploads in the background", body = OvertimeRecord),
        (status = 400, description = "Missing photo, location or purpose"),
        (status = 409, description = "An active session already exists"),
        (status = 422, description = "Photo is not a person"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn check_in(
    auth: AuthUser,
    body: web::Json<CheckInReq>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let profile = current_profile(&auth, &state).await?;
    let body = body.into_inner();

    let submitted = state
        .attendance
        .check_in(
            &profile,
            &body.purpose,
            Capture {
                photo: body.photo,
                location: body.location,
            },
        )
        .await?;

    Ok(HttpResponse::Created().json(submitted.record))
}

/// Finish the caller's overtime session
#[utoipa::path(
    put,
    path = "/api/overtime/{id}/check-out",
    params(("id" = String, Path, description = "Overtime record id")),
    request_body = CheckOutReq,
    responses(
        (status = 200, description = "Checked out", body = OvertimeRecord),
        (status = 400, description = "Missing photo or location"),
        (status = 403, description = "Record belongs to another employee"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Session already completed"),
        (status = 422, description = "Photo is not a person")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn check_out(
    auth: AuthUser,
    path: web::Path<String>,
    body: web::Json<CheckOutReq>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let profile = current_profile(&auth, &state).await?;
    let body = body.into_inner();

    let submitted = state
        .attendance
        .check_out(
            &profile,
            &path.into_inner(),
            Capture {
                photo: body.photo,
                location: body.location,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(submitted.record))
}

/// The caller's active session, or `null`
#[utoipa::path(
    get,
    path = "/api/overtime/active",
    responses((status = 200, description = "Active session, or null when none", body = OvertimeRecord)),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn active(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let record = state.attendance.active_record(&auth.user_id).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// The caller's overtime history, newest first
#[utoipa::path(
    get,
    path = "/api/overtime",
    responses((status = 200, description = "History", body = [OvertimeRecord])),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn history(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let records = state.attendance.history(&auth.user_id).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Live record changes as server-sent events. Employees receive their own
/// records; administrators receive all.
#[utoipa::path(
    get,
    path = "/api/overtime/events",
    responses((status = 200, description = "text/event-stream of created/updated/deleted events")),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn events(auth: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let profile = current_profile(&auth, &state).await?;
    let rx = state.records.subscribe();
    let scope = if profile.role.is_admin() {
        None
    } else {
        Some(profile.id)
    };

    let stream = stream::unfold((rx, scope), |(mut rx, scope)| async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagging");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };
            if !visible_to(&event, scope.as_deref()) {
                continue;
            }
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Failed to encode record event");
                    continue;
                }
            };
            let frame = web::Bytes::from(format!("data: {}\n\n", payload));
            return Some((Ok::<_, actix_web::Error>(frame), (rx, scope)));
        }
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

fn visible_to(event: &RecordEvent, employee_id: Option<&str>) -> bool {
    employee_id.is_none_or(|id| event.employee_id() == id)
}
