// tests/admin_application_tests.rs
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use common::*;
use serde_json::{json, Value};
use serial_test::serial;

const EMS_ID: &str = "2025-01-10T10:00:00.000Z";

fn seed_sheets(h: &TestHarness) {
  h.sheets.put(
    SHEET_EMS,
    vec![
      vec!["Timestamp", "Username", "Discord ID"],
      vec![EMS_ID, "Medic Applicant", "555000555"],
    ],
  );
  h.sheets.put(
    SHEET_POLICE,
    vec![
      vec!["Timestamp", "Username", "Discord ID"],
      vec!["2025-01-11T09:00:00.000Z", "Cadet", "666000666"],
    ],
  );
}

#[actix_web::test]
#[serial]
async fn test_admin_check_reports_designation() {
  let h = harness();
  let app = init_app!(h.state);

  let req = TestRequest::get().uri("/api/admin/check").to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let stranger = session_token(&h.state, OTHER_USER_ID, Some("nobody@example.com"));
  let req = TestRequest::get()
    .uri("/api/admin/check")
    .insert_header(bearer(&stranger))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["isAdmin"], false);

  let admin = session_token(&h.state, USER_ID, Some("EMS.Lead@example.com"));
  let req = TestRequest::get()
    .uri("/api/admin/check")
    .insert_header(bearer(&admin))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["isAdmin"], true);
  assert_eq!(body["designation"], "ems");
  assert_eq!(body["discordId"], "333");
}

#[actix_web::test]
#[serial]
async fn test_admin_list_is_scoped_to_designation() {
  let h = harness();
  seed_sheets(&h);
  let app = init_app!(h.state);

  let ems_admin = session_token(&h.state, USER_ID, Some(ADMIN_EMAIL));
  let req = TestRequest::get()
    .uri("/api/admin/applications")
    .insert_header(bearer(&ems_admin))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  let apps = body["applications"].as_array().unwrap();
  assert_eq!(apps.len(), 1);
  assert_eq!(apps[0]["id"], EMS_ID);
  assert_eq!(apps[0]["type"], "ems");
  assert_eq!(apps[0]["username"], "Medic Applicant");
  assert_eq!(apps[0]["status"], "pending");

  let owner = session_token(&h.state, USER_ID, Some("owner@example.com"));
  let req = TestRequest::get()
    .uri("/api/admin/applications")
    .insert_header(bearer(&owner))
    .to_request();
  let resp = test::call_service(&app, req).await;
  let body: Value = test::read_body_json(resp).await;
  let kinds: Vec<&str> = body["applications"]
    .as_array()
    .unwrap()
    .iter()
    .map(|a| a["type"].as_str().unwrap())
    .collect();
  assert_eq!(kinds, vec!["ems", "police"]);

  let stranger = session_token(&h.state, USER_ID, Some("nobody@example.com"));
  let req = TestRequest::get()
    .uri("/api/admin/applications")
    .insert_header(bearer(&stranger))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "You do not have permission to access this page");
}

#[actix_web::test]
#[serial]
async fn test_review_writes_back_and_notifies() {
  let h = harness();
  seed_sheets(&h);
  let app = init_app!(h.state);
  let ems_admin = session_token(&h.state, USER_ID, Some(ADMIN_EMAIL));

  let req = TestRequest::put()
    .uri("/api/admin/applications")
    .insert_header(bearer(&ems_admin))
    .set_json(json!({ "id": EMS_ID, "type": "ems", "status": "approved" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let updates = h.sheets.updates.lock().clone();
  let ranges: Vec<&str> = updates.iter().map(|(_, range, _)| range.as_str()).collect();
  assert_eq!(ranges, vec!["Sheet1!O2", "Sheet1!P2", "Sheet1!Q2"]);
  assert_eq!(updates[0].2, "approved");
  assert_eq!(updates[1].2, "Test User");

  let notices = h.discord.notices.lock().clone();
  assert_eq!(notices.len(), 1);
  assert!(notices[0].approved);
  assert_eq!(notices[0].applicant_id, "555000555");
  assert_eq!(notices[0].kind, "ems");
}

#[actix_web::test]
#[serial]
async fn test_review_outside_designation_or_missing_row() {
  let h = harness();
  seed_sheets(&h);
  let app = init_app!(h.state);
  let ems_admin = session_token(&h.state, USER_ID, Some(ADMIN_EMAIL));

  let req = TestRequest::put()
    .uri("/api/admin/applications")
    .insert_header(bearer(&ems_admin))
    .set_json(json!({ "id": "2025-01-11T09:00:00.000Z", "type": "police", "status": "rejected" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "You do not have permission to modify this type of application");

  let req = TestRequest::put()
    .uri("/api/admin/applications")
    .insert_header(bearer(&ems_admin))
    .set_json(json!({ "id": "no-such-row", "type": "ems", "status": "rejected" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  assert!(h.sheets.updates.lock().is_empty());
}

#[actix_web::test]
#[serial]
async fn test_submit_application_appends_row() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, Some("tester@example.com"));

  let req = TestRequest::post()
    .uri("/api/applications/ems/submit")
    .insert_header(bearer(&token))
    .set_json(json!({ "discordId": "555000555", "unknownField": "ignored" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["message"], "Application submitted successfully");

  let appends = h.sheets.appends.lock().clone();
  assert_eq!(appends.len(), 1);
  let (sheet_id, range, row) = &appends[0];
  assert_eq!(sheet_id, SHEET_EMS);
  assert_eq!(range, "Sheet1!A1");
  assert_eq!(row.len(), 17);
  assert_eq!(row[1], "Test User");
  assert_eq!(row[2], "555000555");
  assert_eq!(row[14], "pending");
}

#[actix_web::test]
#[serial]
async fn test_submit_rejects_unknown_or_unconfigured_kind() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);

  for kind in ["bogus", "whitelist"] {
    let req = TestRequest::post()
      .uri(&format!("/api/applications/{}/submit", kind))
      .insert_header(bearer(&token))
      .set_json(json!({ "discordId": "1" }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "kind {}", kind);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid application type");
  }

  let req = TestRequest::post()
    .uri("/api/applications/ems/submit")
    .set_json(json!({ "discordId": "1" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(h.sheets.appends.lock().is_empty());
}

#[actix_web::test]
#[serial]
async fn test_contact_form() {
  let h = harness();
  let app = init_app!(h.state);

  let req = TestRequest::post()
    .uri("/api/contact")
    .set_json(json!({ "username": "x", "message": "Hello there, I need help." }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let req = TestRequest::post()
    .uri("/api/contact")
    .set_json(json!({ "username": "Visitor", "message": "Hello there, I need help." }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let appends = h.sheets.appends.lock().clone();
  assert_eq!(appends[0].0, SHEET_CONTACT);
  assert_eq!(appends[0].2[1..], ["Visitor".to_string(), "Hello there, I need help.".to_string()]);
}

#[actix_web::test]
#[serial]
async fn test_discord_role_and_server_join() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);

  let req = TestRequest::get()
    .uri("/api/discord/check-role")
    .insert_header(bearer(&token))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body, json!({ "hasRole": false }));

  *h.discord.roles.lock() = Some(vec!["other".to_string(), "role-member".to_string()]);
  let req = TestRequest::get()
    .uri("/api/discord/check-role")
    .insert_header(bearer(&token))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body, json!({ "hasRole": true }));

  let req = TestRequest::post()
    .uri("/api/discord/server-join")
    .insert_header(bearer(&token))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body["isInServer"], true);
  assert_eq!(h.discord.added_members.lock().clone(), vec![USER_ID.to_string()]);

  h.discord.guilds.lock().push("guild-1".to_string());
  let req = TestRequest::post()
    .uri("/api/discord/server-join")
    .insert_header(bearer(&token))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(h.discord.added_members.lock().len(), 1);
}

#[actix_web::test]
#[serial]
async fn test_oauth_callback_issues_a_session() {
  let h = harness();
  let app = init_app!(h.state);

  let req = TestRequest::get()
    .uri("/api/auth/discord/callback?code=good-code")
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["user"]["name"], "Test User");
  let token = body["token"].as_str().unwrap().to_string();

  let req = TestRequest::get()
    .uri("/api/auth/session")
    .insert_header(bearer(&token))
    .to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body["user"]["id"], USER_ID);
  assert!(body["user"].get("accessToken").is_none());

  let req = TestRequest::get().uri("/api/auth/discord/callback").to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
#[serial]
async fn test_public_catalogue_routes() {
  let h = harness();
  let app = init_app!(h.state);

  let req = TestRequest::get().uri("/api/health").to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  assert_eq!(body, json!({ "status": "ok" }));

  let req = TestRequest::get().uri("/api/memberships").to_request();
  let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
  let tiers = body["memberships"].as_array().unwrap();
  assert_eq!(tiers.len(), 7);
  assert_eq!(tiers[1]["name"], "Silver Membership");
  assert_eq!(tiers[1]["badgeIcon"], "silver");
}
