use crate::api::admin::{AdminUpdateUserReq, OvertimePage, VerifyReq};
use crate::api::overtime::{CheckInReq, CheckOutReq};
use crate::api::user::UpdateProfileReq;
use crate::model::overtime::{
    GeoLocation, OvertimeRecord, PersonVerdict, PhotoKind, RecordStatus, VerificationStatus,
};
use crate::model::role::Role;
use crate::model::user::UserProfile;
use crate::models::{LoginReqDto, LoginResponse, RegisterReq, TokenPair};
use crate::service::report::ReportPeriod;
use crate::service::uploader::UploadFailure;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lembur API",
        version = "1.0.0",
        description = r#"
## Overtime (lembur) attendance

Employees check in and out of overtime sessions with a photo and a location;
administrators verify completed sessions and export reports.

### Key Features
- **Check-in / check-out** with photo and GPS location, one active session per employee
- **Photo gate**: optional person detection before a photo is accepted
- **Verification**: accept or reject completed sessions, with notes
- **Reporting**: daily, weekly, monthly filters and CSV export

### Security
Endpoints under `/api` require a **JWT Bearer** access token.
`/api/admin/*` requires the Admin role.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::me,
        crate::api::user::update_me,

        crate::api::overtime::check_in,
        crate::api::overtime::check_out,
        crate::api::overtime::active,
        crate::api::overtime::history,
        crate::api::overtime::events,

        crate::api::admin::list_records,
        crate::api::admin::accept,
        crate::api::admin::reject,
        crate::api::admin::delete_record,
        crate::api::admin::revalidate_photo,
        crate::api::admin::export,
        crate::api::admin::upload_failures,
        crate::api::admin::retry_upload,
        crate::api::admin::list_users,
        crate::api::admin::update_user,
        crate::api::admin::delete_user
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            TokenPair,
            UserProfile,
            Role,
            UpdateProfileReq,
            AdminUpdateUserReq,
            CheckInReq,
            CheckOutReq,
            GeoLocation,
            PersonVerdict,
            OvertimeRecord,
            RecordStatus,
            VerificationStatus,
            PhotoKind,
            OvertimePage,
            VerifyReq,
            ReportPeriod,
            UploadFailure
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token rotation"),
        (name = "User", description = "The caller's profile"),
        (name = "Overtime", description = "Employee check-in / check-out"),
        (name = "Admin", description = "Verification, reporting and user management"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
