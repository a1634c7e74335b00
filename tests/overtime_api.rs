use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::http::{StatusCode, header};
use actix_web::{App, test};
use async_trait::async_trait;
use futures::future::poll_fn;
use serde_json::{Value, json};

use lembur::blob::memory::InMemoryBlobStore;
use lembur::classifier::{
    ClassifierError, DEFAULT_CONFIDENCE_THRESHOLD, PhotoClassifier, PhotoGate,
};
use lembur::config::Config;
use lembur::configure_app;
use lembur::model::overtime::PersonVerdict;
use lembur::state::AppState;
use lembur::store::memory::{InMemoryRecordStore, InMemoryUserStore};

const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

struct FixedVerdict(PersonVerdict);

#[async_trait]
impl PhotoClassifier for FixedVerdict {
    async fn classify(&self, _photo: &str) -> Result<PersonVerdict, ClassifierError> {
        Ok(self.0)
    }
}

fn state_with(config: &Config, gate: PhotoGate) -> AppState {
    AppState::new(
        config,
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryBlobStore::new()),
        gate,
    )
}

macro_rules! app {
    ($gate:expr) => {{
        let config = Config::for_tests("integration-secret");
        let state = state_with(&config, $gate);
        test::init_service(
            App::new().configure(move |cfg| configure_app(cfg, config.clone(), state.clone())),
        )
        .await
    }};
}

fn check_in_body(purpose: &str) -> Value {
    json!({
        "purpose": purpose,
        "photo": PHOTO,
        "location": { "latitude": 3.5952, "longitude": 98.6722 }
    })
}

fn check_out_body() -> Value {
    json!({
        "photo": PHOTO,
        "location": { "latitude": 3.5953, "longitude": 98.6721 }
    })
}

/// Registers and logs in, returning `(user_id, access_token, refresh_token)`.
macro_rules! sign_up {
    ($app:expr, $email:expr, $jabatan:expr) => {{
        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "email": $email,
                "password": "rahasia123",
                "name": $email.split('@').next().unwrap(),
                "nip": "198705122010011003",
                "jabatan": $jabatan
            }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": $email, "password": "rahasia123" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&$app, req).await;
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_web::test]
async fn budi_checks_in_out_and_gets_accepted() {
    let app = app!(PhotoGate::disabled());
    let (_, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf Teknis");
    let (_, admin, _) = sign_up!(app, "admin@medan.go.id", "ADMIN");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("Finish report"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let record: Value = test::read_body_json(resp).await;
    let id = record["id"].as_str().unwrap().to_string();
    assert_eq!(record["status"], "Checked In");
    assert_eq!(record["verificationStatus"], "Pending");
    assert_eq!(record["employeeName"], "budi");

    let req = test::TestRequest::get()
        .uri("/api/overtime/active")
        .insert_header(bearer(&budi))
        .to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(active["id"], id.as_str());

    let req = test::TestRequest::put()
        .uri(&format!("/api/overtime/{}/check-out", id))
        .insert_header(bearer(&budi))
        .set_json(check_out_body())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let done: Value = test::read_body_json(resp).await;
    assert_eq!(done["status"], "Checked Out");
    assert!(done["checkOutTime"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/overtime/active")
        .insert_header(bearer(&budi))
        .to_request();
    let active: Value = test::call_and_read_body_json(&app, req).await;
    assert!(active.is_null());

    let req = test::TestRequest::get()
        .uri("/api/admin/overtime")
        .insert_header(bearer(&admin))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["verificationStatus"], "Pending");

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/overtime/{}/accept", id))
        .insert_header(bearer(&admin))
        .set_json(json!({ "notes": "Sesuai" }))
        .to_request();
    let accepted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(accepted["verificationStatus"], "Accepted");
    assert_eq!(accepted["verificationNotes"], "Sesuai");

    // re-deciding without a note clears the old one
    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/overtime/{}/reject", id))
        .insert_header(bearer(&admin))
        .to_request();
    let rejected: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rejected["verificationStatus"], "Rejected");
    assert_eq!(rejected["verificationNotes"], "");

    let req = test::TestRequest::get()
        .uri("/api/overtime")
        .insert_header(bearer(&budi))
        .to_request();
    let history: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["verificationStatus"], "Rejected");
}

#[actix_web::test]
async fn check_in_rules_are_enforced() {
    let app = app!(PhotoGate::disabled());
    let (_, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(json!({ "purpose": "rapat", "photo": PHOTO }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Foto dan lokasi dibutuhkan untuk melanjutkan.");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body(""))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("rapat"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("rapat lagi"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );
}

#[actix_web::test]
async fn photo_that_is_not_a_person_creates_nothing() {
    let gate = PhotoGate::new(
        Some(Arc::new(FixedVerdict(PersonVerdict {
            is_person: false,
            confidence: 0.95,
        }))),
        DEFAULT_CONFIDENCE_THRESHOLD,
    );
    let app = app!(gate);
    let (_, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (_, admin, _) = sign_up!(app, "admin@medan.go.id", "admin");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("rapat"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    let req = test::TestRequest::get()
        .uri("/api/admin/overtime")
        .insert_header(bearer(&admin))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 0);
}

#[actix_web::test]
async fn access_rules() {
    let app = app!(PhotoGate::disabled());
    let (_, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (_, citra, _) = sign_up!(app, "citra@medan.go.id", "Staf");
    let (_, admin, _) = sign_up!(app, "admin@medan.go.id", "ADMIN");

    let req = test::TestRequest::get().uri("/api/overtime").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::get()
        .uri("/api/admin/overtime")
        .insert_header(bearer(&budi))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("rapat"))
        .to_request();
    let record: Value = test::call_and_read_body_json(&app, req).await;
    let id = record["id"].as_str().unwrap().to_string();

    // still checked in: cannot be verified
    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/overtime/{}/accept", id))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );

    let req = test::TestRequest::put()
        .uri(&format!("/api/overtime/{}/check-out", id))
        .insert_header(bearer(&citra))
        .set_json(check_out_body())
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/overtime/{}", id))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/overtime/{}", id))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn export_is_csv_with_bom() {
    let app = app!(PhotoGate::disabled());
    let (_, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (_, admin, _) = sign_up!(app, "admin@medan.go.id", "ADMIN");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("Lembur, rapat anggaran"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/admin/overtime/export?period=daily")
        .insert_header(bearer(&admin))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Laporan Lembur - "));

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with('\u{feff}'));
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("budi,"));
    assert!(lines[1].contains("\"Lembur, rapat anggaran\""));
    assert!(lines[1].contains(",-,"));
}

#[actix_web::test]
async fn registration_and_token_rotation() {
    let app = app!(PhotoGate::disabled());

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "email": "x@medan.go.id",
            "password": "123",
            "name": "X",
            "nip": "1",
            "jabatan": "Staf"
        }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let (_, access, refresh) = sign_up!(app, "budi@medan.go.id", "Staf");

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({
            "email": "BUDI@medan.go.id",
            "password": "rahasia123",
            "name": "Budi lagi",
            "nip": "2",
            "jabatan": "Staf"
        }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );

    // access tokens cannot be used to refresh
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .insert_header(bearer(&access))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .insert_header(bearer(&refresh))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let pair: Value = test::read_body_json(resp).await;
    assert!(pair["access_token"].is_string());

    // the old refresh token was revoked by the rotation
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .insert_header(bearer(&refresh))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(bearer(&access))
        .to_request();
    let me: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(me["email"], "budi@medan.go.id");
    assert_eq!(me["role"], "User");
}

#[actix_web::test]
async fn admin_manages_users_but_not_itself() {
    let app = app!(PhotoGate::disabled());
    let (budi_id, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (admin_id, admin, _) = sign_up!(app, "admin@medan.go.id", "ADMIN");

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("rapat"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/users/{}", budi_id))
        .insert_header(bearer(&admin))
        .set_json(json!({ "pangkat": "Penata / III-c" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["pangkat"], "Penata / III-c");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/users/{}", admin_id))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/users/{}", budi_id))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    // records outlive the account
    let req = test::TestRequest::get()
        .uri("/api/admin/overtime")
        .insert_header(bearer(&admin))
        .to_request();
    let page: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(page["total"], 1);

    // a token for a deleted account no longer works
    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(bearer(&budi))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
    let req = test::TestRequest::put()
        .uri("/api/me")
        .insert_header(bearer(&budi))
        .set_json(json!({ "name": "Budi S." }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn admin_rights_follow_the_stored_role() {
    let app = app!(PhotoGate::disabled());
    let (budi_id, _, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (ani_id, ani, _) = sign_up!(app, "ani@medan.go.id", "ADMIN");
    let (_, rina, _) = sign_up!(app, "rina@medan.go.id", "ADMIN");
    let (citra_id, citra, _) = sign_up!(app, "citra@medan.go.id", "ADMIN");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/users/{}", ani_id))
        .insert_header(bearer(&rina))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::put()
        .uri(&format!("/api/admin/users/{}", citra_id))
        .insert_header(bearer(&rina))
        .set_json(json!({ "role": "User" }))
        .to_request();
    let demoted: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(demoted["role"], "User");

    // old tokens still carry the Admin claim
    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(bearer(&ani))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/users/{}", budi_id))
        .insert_header(bearer(&ani))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(bearer(&citra))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/admin/overtime/export")
        .insert_header(bearer(&citra))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // budi survived both attempts
    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(bearer(&rina))
        .to_request();
    let users: Value = test::call_and_read_body_json(&app, req).await;
    let ids: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&budi_id.as_str()));
    assert!(!ids.contains(&ani_id.as_str()));
}

/// Reads the next `data:` frame from an event stream.
async fn next_event<B: MessageBody>(body: &mut Pin<Box<B>>) -> Value {
    let chunk = tokio::time::timeout(
        Duration::from_secs(5),
        poll_fn(|cx| body.as_mut().poll_next(cx)),
    )
    .await
    .expect("no event within timeout")
    .expect("event stream closed");
    let Ok(chunk) = chunk else {
        panic!("event stream failed");
    };
    let text = std::str::from_utf8(&chunk).unwrap();
    let payload = text.trim().strip_prefix("data: ").unwrap();
    serde_json::from_str(payload).unwrap()
}

fn event_owner(event: &Value) -> &str {
    match event["type"].as_str() {
        Some("deleted") => event["employee_id"].as_str().unwrap(),
        _ => event["record"]["employeeId"].as_str().unwrap(),
    }
}

/// Collects frames up to and including the deletion of `record_id`.
async fn events_until_deleted<B: MessageBody>(body: &mut Pin<Box<B>>, record_id: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(body).await;
        let done = event["type"] == "deleted" && event["id"] == record_id;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[actix_web::test]
async fn live_events_are_scoped_to_the_viewer() {
    let app = app!(PhotoGate::disabled());
    let (budi_id, budi, _) = sign_up!(app, "budi@medan.go.id", "Staf");
    let (siti_id, siti, _) = sign_up!(app, "siti@medan.go.id", "Staf");
    let (_, admin, _) = sign_up!(app, "admin@medan.go.id", "ADMIN");

    let req = test::TestRequest::get()
        .uri("/api/overtime/events")
        .insert_header(bearer(&budi))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let mut budi_feed = Box::pin(resp.into_body());

    let req = test::TestRequest::get()
        .uri("/api/overtime/events")
        .insert_header(bearer(&admin))
        .to_request();
    let mut admin_feed = Box::pin(test::call_service(&app, req).await.into_body());

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&siti))
        .set_json(check_in_body("Rekap absensi"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/overtime/check-in")
        .insert_header(bearer(&budi))
        .set_json(check_in_body("Finish report"))
        .to_request();
    let record: Value = test::call_and_read_body_json(&app, req).await;
    let budi_record = record["id"].as_str().unwrap().to_string();

    let first = next_event(&mut budi_feed).await;
    assert_eq!(first["type"], "created");
    assert_eq!(first["record"]["id"], budi_record.as_str());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/overtime/{}", budi_record))
        .insert_header(bearer(&admin))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    let budi_events = events_until_deleted(&mut budi_feed, &budi_record).await;
    assert!(budi_events.iter().all(|e| event_owner(e) == budi_id));

    let admin_events = events_until_deleted(&mut admin_feed, &budi_record).await;
    assert_eq!(admin_events[0]["type"], "created");
    assert_eq!(event_owner(&admin_events[0]), siti_id);
    assert!(admin_events.iter().any(|e| event_owner(e) == budi_id));
}
