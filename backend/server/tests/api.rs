use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
};
use bank::{BloodGroup, DeliveryStatus, GeoPoint, Role, User};
use serde_json::{Value, json};
use server::{
    auth::{self, Registration},
    config::Config,
    events::{Event, Room},
    router,
    state::AppState,
};
use tokio::time::timeout;
use tower::ServiceExt;
use uuid::Uuid;

fn test_state() -> Arc<AppState> {
    AppState::in_memory(Config {
        rate_limit_max: 10_000,
        ..Config::default()
    })
}

async fn signup(
    state: &AppState,
    email: &str,
    role: Role,
    blood_group: Option<BloodGroup>,
    location: Option<GeoPoint>,
) -> (User, String) {
    let (_, raw) = auth::register(
        state,
        Registration {
            name: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            phone: None,
            role: Some(role),
            blood_group,
            medical_history: None,
            location,
        },
    )
    .await
    .unwrap();

    auth::verify_email(state, &raw).await.unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

async fn open_request(app: &Router, token: &str, blood_group: &str, units: u32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/requests",
        Some(token),
        Some(json!({
            "patientName": "Asha",
            "bloodGroup": blood_group,
            "units": units,
            "urgency": "critical",
            "hospital": "City General"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    body["data"]["id"].as_str().unwrap().to_string()
}

/// Registers the driver's vehicle and assigns it to the request, returning the delivery id.
async fn dispatch(app: &Router, transport: &str, dispatcher: &str, request: &str, driver: Uuid) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/transport",
        Some(transport),
        Some(json!({
            "agencyName": "Rapid Wheels",
            "vehicleNo": "ka-01-ab-1234",
            "vehicleType": "refrigerated-van",
            "driverName": "Kiran",
            "driverPhone": "9000000000"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/transport/assignments",
        Some(dispatcher),
        Some(json!({ "requestId": request, "transportId": driver })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_healthz() {
    let app = router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_register_and_login() {
    let state = test_state();
    let app = router(state.clone());

    let registration = json!({
        "name": "Ravi",
        "email": "Ravi@Example.com",
        "password": "secret123",
        "role": "donor",
        "bloodGroup": "B+"
    });

    let (status, body) = send(&app, Method::POST, "/api/v1/auth/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"], "ravi@example.com");
    assert_eq!(body["data"]["verified"], false);

    let (status, body) = send(&app, Method::POST, "/api/v1/auth/register", None, Some(registration)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let credentials = json!({ "email": "ravi@example.com", "password": "secret123" });
    let (status, body) = send(&app, Method::POST, "/api/v1/auth/login", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Please verify your email first");

    let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let state = test_state();
    let app = router(state.clone());
    signup(&state, "meera@example.com", Role::Ngo, None, None).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "meera@example.com", "password": "secret123" }).to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap().to_string();
    let request = Request::builder()
        .uri("/api/v1/auth/me")
        .header(header::COOKIE, session)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_payload() {
    let app = router(test_state());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\": "))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_role_enforcement() {
    let state = test_state();
    let app = router(state.clone());
    let (_, donor) = signup(&state, "donor@example.com", Role::Donor, Some(BloodGroup::APositive), None).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/admin/stats", Some(&donor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, Method::GET, "/api/v1/inventory", Some(&donor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_request_units_must_be_positive() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/requests",
        Some(&beneficiary),
        Some(json!({ "patientName": "Asha", "bloodGroup": "O+", "units": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn test_concurrent_accepts_assign_once() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let id = open_request(&app, &beneficiary, "O+", 1).await;

    let mut donors = Vec::new();
    for i in 0..6 {
        let email = format!("donor{i}@example.com");
        let (_, token) = signup(&state, &email, Role::Donor, Some(BloodGroup::ONegative), None).await;
        donors.push(token);
    }

    let handles: Vec<_> = donors
        .into_iter()
        .map(|token| {
            let app = app.clone();
            let uri = format!("/api/v1/requests/{id}/accept");
            tokio::spawn(async move { send(&app, Method::PUT, &uri, Some(&token), None).await.0 })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let won = statuses.iter().filter(|&&s| s == StatusCode::OK).count();
    let lost = statuses.iter().filter(|&&s| s == StatusCode::CONFLICT).count();
    assert_eq!(won, 1);
    assert_eq!(lost, 5);

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/requests/{id}"), Some(&beneficiary), None).await;
    assert_eq!(body["data"]["status"], "assigned");
    assert_eq!(body["data"]["assigneeKind"], "donor");
    assert_eq!(body["data"]["donorResponses"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_incompatible_donor_rejected() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let (_, donor) = signup(&state, "ab@example.com", Role::Donor, Some(BloodGroup::AbPositive), None).await;
    let id = open_request(&app, &beneficiary, "O-", 1).await;

    let (status, _) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/accept"), Some(&donor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inventory_updates() {
    let state = test_state();
    let app = router(state.clone());
    let (_, bank) = signup(&state, "bank@example.com", Role::BloodBank, None, None).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "A-", "action": "increase", "units": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["bloodGroups"]["A-"], 4);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "A-", "action": "decrease", "units": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["bloodGroups"]["A-"], 0);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "A-", "action": "increase", "units": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nearby_donors_sorted_by_distance() {
    let state = test_state();
    let app = router(state.clone());
    let (_, ngo) = signup(&state, "ngo@example.com", Role::Ngo, None, None).await;

    let far = GeoPoint::new(12.99, 77.59).unwrap();
    let near = GeoPoint::new(12.972, 77.595).unwrap();
    let outside = GeoPoint::new(13.5, 78.2).unwrap();
    signup(&state, "far@example.com", Role::Donor, Some(BloodGroup::BPositive), Some(far)).await;
    signup(&state, "near@example.com", Role::Donor, Some(BloodGroup::BPositive), Some(near)).await;
    signup(&state, "outside@example.com", Role::Donor, Some(BloodGroup::BPositive), Some(outside)).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/donors/nearby?lat=12.9716&lng=77.5946&radius=5",
        Some(&ngo),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["email"], "near@example.com");
    assert_eq!(body["data"][1]["email"], "far@example.com");
    assert!(body["data"][0]["distanceInMeters"].as_f64().unwrap() < 1000.0);
    for donor in body["data"].as_array().unwrap() {
        let meters = donor["distanceInMeters"].as_f64().unwrap();
        assert_eq!(donor["distance"].as_f64().unwrap(), meters / 1000.0);
    }

    let (status, _) = send(&app, Method::GET, "/api/v1/donors/nearby?lat=12.97", Some(&ngo), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bank_accept_through_delivery() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let (_, bank) = signup(&state, "bank@example.com", Role::BloodBank, None, None).await;
    let (driver, transport) = signup(&state, "driver@example.com", Role::Transport, None, None).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "O+", "action": "increase", "units": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = open_request(&app, &beneficiary, "O+", 2).await;

    let (status, body) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/accept"), Some(&bank), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["assigneeKind"], "blood-bank");

    let (_, body) = send(&app, Method::GET, "/api/v1/inventory", Some(&bank), None).await;
    assert_eq!(body["data"]["bloodGroups"]["O+"], 3);

    let delivery = dispatch(&app, &transport, &bank, &id, driver.id).await;

    let status_uri = format!("/api/v1/transport/assignments/{delivery}/status");

    let (status, _) = send(
        &app,
        Method::PUT,
        &status_uri,
        Some(&transport),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for step in ["picked", "in-transit", "delivered"] {
        let (status, body) = send(
            &app,
            Method::PUT,
            &status_uri,
            Some(&transport),
            Some(json!({ "status": step })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        assert_eq!(body["data"]["status"], step);
    }

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/requests/{id}"), Some(&beneficiary), None).await;
    assert_eq!(body["data"]["status"], "completed");
}

#[tokio::test]
async fn test_only_creator_cancels() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let (_, other) = signup(&state, "other@example.com", Role::Beneficiary, None, None).await;
    let id = open_request(&app, &beneficiary, "A+", 1).await;
    let uri = format!("/api/v1/requests/{id}/cancel");

    let (status, _) = send(&app, Method::PUT, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::PUT, &uri, Some(&beneficiary), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, _) = send(&app, Method::PUT, &uri, Some(&beneficiary), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_returns_bank_stock() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let (_, bank) = signup(&state, "bank@example.com", Role::BloodBank, None, None).await;

    send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "B-", "action": "increase", "units": 5 })),
    )
    .await;
    let id = open_request(&app, &beneficiary, "B-", 2).await;

    let (status, _) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/accept"), Some(&bank), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, Method::GET, "/api/v1/inventory", Some(&bank), None).await;
    assert_eq!(body["data"]["bloodGroups"]["B-"], 3);

    let (status, body) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/cancel"), Some(&beneficiary), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = send(&app, Method::GET, "/api/v1/inventory", Some(&bank), None).await;
    assert_eq!(body["data"]["bloodGroups"]["B-"], 5);
}

#[tokio::test]
async fn test_cancel_calls_off_delivery() {
    let state = test_state();
    let app = router(state.clone());
    let (_, beneficiary) = signup(&state, "family@example.com", Role::Beneficiary, None, None).await;
    let (_, donor) = signup(&state, "donor@example.com", Role::Donor, Some(BloodGroup::APositive), None).await;
    let (_, bank) = signup(&state, "bank@example.com", Role::BloodBank, None, None).await;
    let (driver, transport) = signup(&state, "driver@example.com", Role::Transport, None, None).await;

    let id = open_request(&app, &beneficiary, "A+", 1).await;
    let (status, _) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/accept"), Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);

    let delivery = dispatch(&app, &transport, &bank, &id, driver.id).await;
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/transport/assignments/{delivery}/status"),
        Some(&transport),
        Some(json!({ "status": "picked" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/complete"), Some(&donor), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut driver_feed = state.events.subscribe();
    driver_feed.join(Room::User(driver.id));

    let (status, body) = send(&app, Method::PUT, &format!("/api/v1/requests/{id}/cancel"), Some(&beneficiary), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let dispatched = timeout(Duration::from_secs(1), driver_feed.next())
        .await
        .unwrap()
        .unwrap();
    match &dispatched.event {
        Event::DeliveryStatusChanged { delivery: changed, .. } => {
            assert_eq!(changed.id.to_string(), delivery);
            assert_eq!(changed.status, DeliveryStatus::Cancelled);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/transport/assignments/{delivery}"), Some(&transport), None).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let (_, body) = send(&app, Method::GET, "/api/v1/transport", Some(&bank), None).await;
    assert_eq!(body["data"][0]["status"], "available");
    assert_eq!(body["data"][0]["currentDelivery"], Value::Null);
}

#[tokio::test]
async fn test_rate_limit() {
    let app = router(AppState::in_memory(Config {
        rate_limit_max: 2,
        ..Config::default()
    }));

    for _ in 0..2 {
        let (status, _) = send(&app, Method::GET, "/api/v1/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, Method::GET, "/api/v1/auth/logout", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn logout_from(app: &Router, peer: &str, forwarded: Option<&str>) -> StatusCode {
    let mut builder = Request::builder().uri("/api/v1/auth/logout");
    if let Some(forwarded) = forwarded {
        builder = builder.header("x-forwarded-for", forwarded);
    }

    let mut request = builder.body(Body::empty()).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));

    app.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_rate_limit_ignores_forwarded_header() {
    let app = router(AppState::in_memory(Config {
        rate_limit_max: 3,
        ..Config::default()
    }));

    let mut limited = 0;
    for i in 0..50 {
        let forwarded = format!("203.0.113.{i}");
        if logout_from(&app, "192.0.2.10:5000", Some(&forwarded)).await == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 47);

    assert_eq!(logout_from(&app, "192.0.2.11:5000", None).await, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_per_forwarded_client_behind_proxy() {
    let app = router(AppState::in_memory(Config {
        rate_limit_max: 1,
        trust_proxy: true,
        ..Config::default()
    }));

    let proxy = "10.0.0.2:443";
    assert_eq!(logout_from(&app, proxy, Some("198.51.100.1")).await, StatusCode::OK);
    assert_eq!(logout_from(&app, proxy, Some("198.51.100.2")).await, StatusCode::OK);
    assert_eq!(
        logout_from(&app, proxy, Some("203.0.113.9, 198.51.100.1")).await,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_blood_bank_profile() {
    let state = test_state();
    let app = router(state.clone());
    let (bank_user, bank) = signup(&state, "bank@example.com", Role::BloodBank, None, None).await;
    let (_, donor) = signup(&state, "donor@example.com", Role::Donor, Some(BloodGroup::OPositive), None).await;

    let profile = json!({
        "name": "City Blood Bank",
        "address": { "city": "Bengaluru" },
        "location": { "lat": 12.972, "lng": 77.595 },
        "contactInfo": { "phone": "080-1234", "emergencyContact": "108" },
        "storageCapacity": 50,
        "operatingHours": { "open": "08:00", "close": "20:00", "days": ["Mon", "Tue"] },
        "services": ["whole blood", "plasma"]
    });

    let (status, _) = send(&app, Method::PUT, "/api/v1/blood-banks/profile", Some(&donor), Some(profile.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::PUT, "/api/v1/blood-banks/profile", Some(&bank), Some(profile)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["id"], bank_user.id.to_string());
    assert_eq!(body["data"]["verified"], false);
    assert_eq!(body["data"]["operatingHours"]["days"][1], "Tue");

    let (_, body) = send(&app, Method::GET, "/api/v1/inventory", Some(&bank), None).await;
    assert_eq!(body["data"]["storageCapacity"], 50);
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/inventory",
        Some(&bank),
        Some(json!({ "bloodGroup": "O+", "action": "increase", "units": 51 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/blood-banks/nearby?lat=12.9716&lng=77.5946&radius=2",
        Some(&donor),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "City Blood Bank");
    let meters = body["data"][0]["distanceInMeters"].as_f64().unwrap();
    assert_eq!(body["data"][0]["distance"].as_f64().unwrap(), meters / 1000.0);

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/blood-banks/{}", Uuid::new_v4()), Some(&donor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_verifies_organisations() {
    let state = test_state();
    let app = router(state.clone());
    let (ngo_user, ngo) = signup(&state, "ngo@example.com", Role::Ngo, None, None).await;
    let (_, other_ngo) = signup(&state, "other@example.com", Role::Ngo, None, None).await;
    auth::ensure_admin(&state, "admin@example.com", "adminpass").await.unwrap();
    let (_, admin) = auth::login(&state, "admin@example.com", "adminpass").await.unwrap();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/ngos/profile",
        Some(&ngo),
        Some(json!({ "organizationName": "Red Drop", "registrationNumber": "ka/ngo/77" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["registrationNumber"], "KA/NGO/77");

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/ngos/profile",
        Some(&other_ngo),
        Some(json!({ "organizationName": "Copycat", "registrationNumber": "KA/NGO/77" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let verify_uri = format!("/api/v1/ngos/{}/verify", ngo_user.id);
    let (status, _) = send(&app, Method::PUT, &verify_uri, Some(&ngo), Some(json!({ "verified": true }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::PUT, &verify_uri, Some(&admin), Some(json!({ "verified": true }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["verified"], true);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/camps",
        Some(&ngo),
        Some(json!({ "title": "Campus drive", "date": "2026-11-02T09:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, Method::GET, "/api/v1/ngos?verified=true", Some(&other_ngo), None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["totalCampaigns"], 1);

    let (_, body) = send(&app, Method::GET, "/api/v1/admin/stats", Some(&admin), None).await;
    assert_eq!(body["data"]["ngos"], 1);
    assert_eq!(body["data"]["bloodBanks"], 0);
}
