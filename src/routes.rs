use crate::{
    api::{admin, overtime, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    middleware::{Condition, from_fn},
    web,
};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let limited = config.rate_limit_enabled;
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(Condition::new(limited, login_limiter.clone()))
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(Condition::new(limited, register_limiter))
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(Condition::new(limited, refresh_limiter))
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(Condition::new(limited, login_limiter))
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(Condition::new(limited, protected_limiter)) // rate limiting
            .service(
                web::resource("/me")
                    .route(web::get().to(user::me))
                    .route(web::put().to(user::update_me)),
            )
            .service(
                web::scope("/overtime")
                    // /overtime
                    .service(web::resource("").route(web::get().to(overtime::history)))
                    .service(web::resource("/check-in").route(web::post().to(overtime::check_in)))
                    .service(web::resource("/active").route(web::get().to(overtime::active)))
                    .service(web::resource("/events").route(web::get().to(overtime::events)))
                    // /overtime/{id}/check-out
                    .service(
                        web::resource("/{id}/check-out").route(web::put().to(overtime::check_out)),
                    ),
            )
            .service(
                web::scope("/admin")
                    .service(web::resource("/overtime").route(web::get().to(admin::list_records)))
                    .service(
                        web::resource("/overtime/export").route(web::get().to(admin::export)),
                    )
                    .service(
                        web::resource("/overtime/{id}")
                            .route(web::delete().to(admin::delete_record)),
                    )
                    .service(
                        web::resource("/overtime/{id}/accept").route(web::put().to(admin::accept)),
                    )
                    .service(
                        web::resource("/overtime/{id}/reject").route(web::put().to(admin::reject)),
                    )
                    .service(
                        web::resource("/overtime/{id}/photos/{kind}/validate")
                            .route(web::post().to(admin::revalidate_photo)),
                    )
                    .service(
                        web::resource("/uploads/failures")
                            .route(web::get().to(admin::upload_failures)),
                    )
                    .service(
                        web::resource("/uploads/failures/{id}/{kind}/retry")
                            .route(web::post().to(admin::retry_upload)),
                    )
                    .service(web::resource("/users").route(web::get().to(admin::list_users)))
                    .service(
                        web::resource("/users/{id}")
                            .route(web::put().to(admin::update_user))
                            .route(web::delete().to(admin::delete_user)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access + refresh pair, old refresh revoked
