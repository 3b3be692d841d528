//! HTTP surface tests: envelope shape, authentication and access rules.

mod common;

use common::{TestApp, STARTER_PLAN_ID};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .map(|s| s.parse().unwrap())
        .unwrap_or_else(|| value.to_string().parse().unwrap())
}

#[tokio::test]
async fn plans_are_public_and_listed() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/plans", app.http_address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], 0);
    let slugs: Vec<&str> = body["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["free", "starter", "professional", "enterprise"]);

    let missing = app
        .client
        .get(format!("{}/plans/slug/nope", app.http_address))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error_code"], 404);

    app.cleanup().await;
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!("{}/organizations", app.http_address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], 401);

    app.cleanup().await;
}

#[tokio::test]
async fn organization_created_over_http() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();

    let response = app
        .post(
            "/organizations",
            user,
            json!({ "name": "Globex", "slug": "globex-http" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], 0);
    assert_eq!(body["data"]["slug"], "globex-http");

    let duplicate = app
        .post(
            "/organizations",
            Uuid::new_v4(),
            json!({ "name": "Other", "slug": "globex-http" }),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let invalid = app
        .post("/organizations", user, json!({ "name": "Bad", "slug": "Not A Slug" }))
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await;
}

#[tokio::test]
async fn non_members_are_forbidden() {
    let app = TestApp::spawn().await;
    let (org, _) = app.organization().await;

    let response = app
        .get(&format!("/organizations/{}/billing/overview", org.id), Uuid::new_v4())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], 403);

    let unknown = app
        .get(
            &format!("/organizations/{}/billing/overview", Uuid::new_v4()),
            Uuid::new_v4(),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    app.cleanup().await;
}

#[tokio::test]
async fn subscribe_invoice_and_pay_over_http() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;
    let base = format!("/organizations/{}", org.id);

    let created = app
        .post(
            &format!("{}/subscription", base),
            owner,
            json!({ "plan_id": STARTER_PLAN_ID, "billing_cycle": "monthly" }),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    assert_eq!(body["data"]["status"], "pending");
    let subscription_id = body["data"]["id"].as_str().unwrap().to_string();

    let activated = app
        .post(
            &format!("{}/subscriptions/{}/activate", base, subscription_id),
            owner,
            json!({}),
        )
        .await;
    assert_eq!(activated.status(), StatusCode::OK);

    let invoice = app
        .post(
            &format!("{}/invoices", base),
            owner,
            json!({
                "line_items": [
                    { "description": "Seats", "quantity": 2, "unit_price": "10.00" },
                    { "description": "Support", "quantity": 1, "unit_price": "5.00" }
                ]
            }),
        )
        .await;
    assert_eq!(invoice.status(), StatusCode::CREATED);
    let body: Value = invoice.json().await.unwrap();
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["currency"], "USD");
    assert_eq!(decimal(&body["data"]["total_amount"]), Decimal::new(2500, 2));
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let paid = app
        .post(&format!("{}/invoices/{}/pay", base, invoice_id), owner, json!({}))
        .await;
    assert_eq!(paid.status(), StatusCode::OK);

    let again = app
        .post(&format!("{}/invoices/{}/pay", base, invoice_id), owner, json!({}))
        .await;
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    let overview: Value = app
        .get(&format!("{}/billing/overview", base), owner)
        .await
        .json()
        .await
        .unwrap();
    let data = &overview["data"];
    assert_eq!(data["current_plan"]["slug"], "starter");
    assert_eq!(decimal(&data["next_billing_amount"]), Decimal::new(1900, 2));
    assert_eq!(data["unpaid_invoices"].as_array().unwrap().len(), 0);
    assert_eq!(data["recent_payments"].as_array().unwrap().len(), 1);
    assert_eq!(data["current_usage"]["users_count"], 1);

    let history: Value = app
        .get(&format!("{}/billing/history", base), owner)
        .await
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = history["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"invoice"));
    assert!(kinds.contains(&"payment"));
    assert_eq!(history["meta"]["total"], 2);

    let events: Value = app
        .get(&format!("{}/billing/events", base), owner)
        .await
        .json()
        .await
        .unwrap();
    assert!(events["meta"]["total"].as_i64().unwrap() >= 3);

    app.cleanup().await;
}

#[tokio::test]
async fn members_read_but_cannot_write() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;
    let base = format!("/organizations/{}", org.id);

    let invitation = app
        .state
        .organizations
        .invite_member(
            org.id,
            owner,
            &billing_service::models::InviteMember {
                email: "reader@example.com".to_string(),
                role: billing_service::models::MemberRole::Member,
            },
        )
        .await
        .unwrap();
    let reader = Uuid::new_v4();
    let accepted = app
        .post(
            "/invitations/accept",
            reader,
            json!({ "token": invitation.token }),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);

    let read = app.get(&format!("{}/invoices", base), reader).await;
    assert_eq!(read.status(), StatusCode::OK);

    let write = app
        .post(
            &format!("{}/invoices", base),
            reader,
            json!({ "line_items": [{ "description": "x", "quantity": 1, "unit_price": "1.00" }] }),
        )
        .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);

    let increment = app
        .post(
            &format!("{}/usage/increment", base),
            reader,
            json!({ "field": "api_requests_count" }),
        )
        .await;
    assert_eq!(increment.status(), StatusCode::OK);

    let events = app.get(&format!("{}/billing/events", base), reader).await;
    assert_eq!(events.status(), StatusCode::FORBIDDEN);

    app.cleanup().await;
}

#[tokio::test]
async fn out_of_range_pages_are_rejected() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;
    let base = format!("/organizations/{}", org.id);

    let response = app.get(&format!("{}/invoices?page=-1", base), owner).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for path in ["invoices", "payments", "usage/history", "billing/events", "billing/history"] {
        let response = app
            .get(&format!("{}/{}?page={}", base, path, i64::MAX), owner)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error_code"], 400);
    }

    let last = app
        .get(&format!("{}/invoices?page=1000000", base), owner)
        .await;
    assert_eq!(last.status(), StatusCode::OK);
    let body: Value = last.json().await.unwrap();
    assert_eq!(body["list"].as_array().unwrap().len(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn pay_rejects_malformed_body_and_accepts_empty_one() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;
    let base = format!("/organizations/{}", org.id);

    let invoice: Value = app
        .post(
            &format!("{}/invoices", base),
            owner,
            json!({ "line_items": [{ "description": "Seats", "quantity": 1, "unit_price": "10.00" }] }),
        )
        .await
        .json()
        .await
        .unwrap();
    let pay_url = format!(
        "{}{}/invoices/{}/pay",
        app.http_address,
        base,
        invoice["data"]["id"].as_str().unwrap()
    );

    let malformed = app
        .client
        .post(&pay_url)
        .header("X-User-ID", owner.to_string())
        .header("Content-Type", "application/json")
        .body("{\"external_payment_id\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.count("payments").await, 0);

    let empty = app
        .client
        .post(&pay_url)
        .header("X-User-ID", owner.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::OK);
    assert_eq!(app.count("payments").await, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn oversized_line_item_description_is_a_validation_error() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let response = app
        .post(
            &format!("/organizations/{}/invoices", org.id),
            owner,
            json!({
                "line_items": [{ "description": "x".repeat(300), "quantity": 1, "unit_price": "1.00" }]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error_code"], 400);

    let response = app
        .post(
            &format!("/organizations/{}/invoices", org.id),
            owner,
            json!({
                "line_items": [{ "description": "Seats", "quantity": 1, "unit_price": "250000000.00" }]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.count("invoices").await, 0);

    app.cleanup().await;
}

#[tokio::test]
async fn overview_without_subscription_leaves_plan_sections_null() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let response = app
        .get(&format!("/organizations/{}/billing/overview", org.id), owner)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let data = &body["data"];

    assert!(data["current_subscription"].is_null());
    assert!(data["current_plan"].is_null());
    assert!(data["next_billing_date"].is_null());
    assert!(data["next_billing_amount"].is_null());
    assert!(data["plan_limits"].is_null());
    assert_eq!(data["current_usage"]["users_count"], 1);
    assert_eq!(data["unpaid_invoices"].as_array().unwrap().len(), 0);
    assert_eq!(data["recent_payments"].as_array().unwrap().len(), 0);

    app.cleanup().await;
}
