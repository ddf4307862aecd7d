use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone as _, Utc};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt as _, Full};
use raffle_board_backend::routes::handle;
use raffle_board_backend::AppState;
use raffle_board_config::{Config, StorageConfig};
use raffle_board_lifecycle::content::Unconfigured;
use raffle_board_lifecycle::{Engine, FixedClock, MemoryStore, StaticTokens};
use serde_json::{json, Value};

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

fn config() -> Config {
    Config {
        url: "http://localhost:3000".to_owned(),
        listen: "127.0.0.1:0".parse().unwrap(),
        storage: StorageConfig::Memory,
        openidconnect: None,
        dev_tokens: HashMap::new(),
        content_generation: None,
        utc_offset_minutes: 0,
    }
}

fn app() -> (AppState, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2030, 1, 5, 12, 0, 0).unwrap(),
    ));
    let identity = StaticTokens::default()
        .with_token(ALICE, "alice")
        .with_token(BOB, "bob");
    let engine = Engine::new(Arc::new(MemoryStore::new()), Arc::new(identity))
        .with_clock(clock.clone());
    (AppState::new(engine, Arc::new(Unconfigured), config()), clock)
}

async fn call(
    state: &AppState,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = request
        .body(Full::new(Bytes::from(body.unwrap_or_default().to_owned())))
        .unwrap();
    let response = handle(state.clone(), request).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn new_raffle(name: &str) -> String {
    json!({
        "name": name,
        "description": "A red bike",
        "terms": "Paid slots only",
        "slot_price": 500,
    })
    .to_string()
}

async fn create(state: &AppState, token: &str, name: &str) -> String {
    let (status, body) = call(
        state,
        Method::POST,
        "/raffles",
        Some(token),
        Some(&new_raffle(name)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn created_raffle_is_readable_with_all_slots() {
    let (state, _clock) = app();
    let id = create(&state, ALICE, "Bike").await;

    let (status, board) = call(&state, Method::GET, &format!("/raffles/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["raffle"]["status"], "active");
    assert_eq!(board["raffle"]["owner_id"], "alice");
    assert_eq!(board["raffle"]["winner_slot_number"], Value::Null);
    let slots = board["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 100);
    assert_eq!(slots[0]["slot_number"], 1);
    assert_eq!(slots[99]["slot_number"], 100);
    assert!(slots.iter().all(|slot| slot["status"] == "available"));

    let (status, count) = call(&state, Method::GET, "/raffles/active-count", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count, json!({"active": 1, "limit": 2}));

    let (_, mine) = call(&state, Method::GET, "/raffles", Some(ALICE), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = call(&state, Method::GET, "/raffles", Some(BOB), None).await;
    assert_eq!(theirs, json!([]));
}

#[tokio::test]
async fn third_active_raffle_is_refused() {
    let (state, _clock) = app();
    create(&state, ALICE, "First").await;
    create(&state, ALICE, "Second").await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/raffles",
        Some(ALICE),
        Some(&new_raffle("Third")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "QuotaExceeded");

    // other users have their own quota
    create(&state, BOB, "Bob's").await;
}

#[tokio::test]
async fn errors_carry_kind_and_status() {
    let (state, _clock) = app();
    let id = create(&state, ALICE, "Bike").await;
    let slot = format!("/raffles/{id}/slots/42");
    let paid = r#"{"participant_name":"Jane","status":"paid"}"#;

    let cases = [
        (Method::POST, "/raffles".to_owned(), None, Some(new_raffle("Bike")), StatusCode::UNAUTHORIZED, "Unauthenticated"),
        (Method::POST, "/raffles".to_owned(), Some("forged"), Some(new_raffle("Bike")), StatusCode::UNAUTHORIZED, "Unauthenticated"),
        (Method::PUT, slot.clone(), Some(BOB), Some(paid.to_owned()), StatusCode::FORBIDDEN, "Forbidden"),
        (Method::PUT, "/raffles/missing/slots/1".to_owned(), Some(ALICE), Some(paid.to_owned()), StatusCode::NOT_FOUND, "NotFound"),
        (Method::PUT, format!("/raffles/{id}/slots/101"), Some(ALICE), Some(paid.to_owned()), StatusCode::BAD_REQUEST, "ValidationError"),
        (Method::PUT, format!("/raffles/{id}/slots/abc"), Some(ALICE), Some(paid.to_owned()), StatusCode::BAD_REQUEST, "ValidationError"),
        (Method::PUT, slot.clone(), Some(ALICE), Some(r#"{"status":"sold"}"#.to_owned()), StatusCode::BAD_REQUEST, "ValidationError"),
        (Method::POST, "/raffles".to_owned(), Some(ALICE), Some("{not json".to_owned()), StatusCode::BAD_REQUEST, "ValidationError"),
        (Method::GET, "/raffles/missing".to_owned(), None, None, StatusCode::NOT_FOUND, "NotFound"),
        (Method::GET, "/nowhere".to_owned(), None, None, StatusCode::NOT_FOUND, "NotFound"),
        (Method::DELETE, format!("/raffles/{id}"), Some(ALICE), None, StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed"),
    ];
    for (method, path, token, body, status, kind) in cases {
        let (actual_status, actual_body) =
            call(&state, method.clone(), &path, token, body.as_deref()).await;
        assert_eq!(actual_status, status, "{method} {path}: {actual_body}");
        assert_eq!(actual_body["kind"], kind, "{method} {path}");
        assert!(actual_body["message"].is_string());
    }

    // nothing above reached the board
    let (_, board) = call(&state, Method::GET, &format!("/raffles/{id}"), None, None).await;
    assert_eq!(board["slots"][41]["status"], "available");
}

#[tokio::test]
async fn raffle_runs_from_creation_to_winner() {
    let (state, clock) = app();
    let id = create(&state, ALICE, "Bike").await;

    let (status, slot) = call(
        &state,
        Method::PUT,
        &format!("/raffles/{id}/slots/42"),
        Some(ALICE),
        Some(r#"{"participant_name":"  Jane ","status":"paid"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slot, json!({"slot_number": 42, "participant_name": "Jane", "status": "paid"}));

    let finalize = format!("/raffles/{id}/finalize");
    let winner = Some(r#"{"winner_slot_number":42}"#);
    let (status, body) = call(&state, Method::POST, &finalize, Some(ALICE), winner).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "NoScheduledDate");

    let (status, raffle) = call(
        &state,
        Method::PATCH,
        &format!("/raffles/{id}"),
        Some(ALICE),
        Some(r#"{"finalization_date":"2030-01-10"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raffle["finalization_date"], "2030-01-10");

    let (status, body) = call(&state, Method::POST, &finalize, Some(ALICE), winner).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "TooEarly");

    clock.set(Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 1).unwrap());
    let (status, raffle) = call(&state, Method::POST, &finalize, Some(ALICE), winner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raffle["status"], "finalized");
    assert_eq!(raffle["winner_slot_number"], 42);
    assert!(raffle["finalized_at"].is_string());

    let (status, body) = call(
        &state,
        Method::POST,
        &finalize,
        Some(ALICE),
        Some(r#"{"winner_slot_number":7}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "AlreadyFinalized");

    let (_, count) = call(&state, Method::GET, "/raffles/active-count", Some(ALICE), None).await;
    assert_eq!(count["active"], 0);

    let activity = format!("/raffles/{id}/activity");
    let (status, body) = call(&state, Method::GET, &activity, Some(BOB), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, log) = call(&state, Method::GET, &activity, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = log
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        ["raffle_created", "slot_updated", "raffle_updated", "raffle_finalized"]
    );
}

#[tokio::test]
async fn draw_picks_a_paid_slot() {
    let (state, clock) = app();
    let id = create(&state, ALICE, "Bike").await;
    let draw = format!("/raffles/{id}/draw");

    call(
        &state,
        Method::PATCH,
        &format!("/raffles/{id}"),
        Some(ALICE),
        Some(r#"{"finalization_date":"2030-01-05"}"#),
    )
    .await;
    let (status, body) = call(&state, Method::POST, &draw, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    call(
        &state,
        Method::PUT,
        &format!("/raffles/{id}/slots/13"),
        Some(ALICE),
        Some(r#"{"participant_name":"Jane","status":"paid"}"#),
    )
    .await;
    clock.set(Utc.with_ymd_and_hms(2030, 1, 6, 0, 0, 0).unwrap());
    let (status, raffle) = call(&state, Method::POST, &draw, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raffle["winner_slot_number"], 13);
}

#[tokio::test]
async fn events_stream_changes_of_one_raffle() {
    let (state, _clock) = app();
    let id = create(&state, ALICE, "Bike").await;
    let other = create(&state, ALICE, "Other").await;

    let request = Request::builder()
        .uri(format!("/raffles/{id}/events"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(state.clone(), request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
    let mut body = response.into_body();

    let paid = Some(r#"{"participant_name":"Jane","status":"paid"}"#);
    call(&state, Method::PUT, &format!("/raffles/{other}/slots/1"), Some(ALICE), paid).await;
    call(&state, Method::PUT, &format!("/raffles/{id}/slots/5"), Some(ALICE), paid).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let event = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(event.starts_with("event: slot_updated\n"), "{event}");
    assert!(event.contains(&format!("\"raffle_id\":\"{id}\"")));
    assert!(event.contains("\"slot_number\":5"));

    // shutting down ends the stream
    state.shutdown.cancel();
    let end = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap();
    assert!(end.is_none());

    let (status, _) = call(&state, Method::GET, "/raffles/missing/events", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generation_falls_back_when_unconfigured() {
    let (state, _clock) = app();

    let prompt = Some(r#"{"prompt":"Mountain bike\nbarely used"}"#);
    let (status, _) = call(&state, Method::POST, "/generate/text", None, prompt).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, text) = call(&state, Method::POST, "/generate/text", Some(ALICE), prompt).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text["name"], "Mountain bike");
    assert!(!text["terms"].as_str().unwrap().is_empty());

    let (status, images) = call(
        &state,
        Method::POST,
        "/generate/images",
        Some(ALICE),
        Some(r#"{"description":"a red bike"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(images["image_urls"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn login_needs_openid_connect() {
    let (state, _clock) = app();
    let (status, body) = call(&state, Method::GET, "/openidconnect-login", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}
