//! Usage meter integration tests.

mod common;

use billing_service::models::UsageField;
use common::TestApp;
use service_core::error::AppError;
use std::collections::BTreeMap;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_increments_are_not_lost() {
    let app = TestApp::spawn().await;
    let (org, _) = app.organization().await;

    let tasks = (0..25).map(|_| {
        let usage = app.state.usage.clone();
        async move {
            usage
                .increment_usage(org.id, UsageField::ApiRequestsCount, 1)
                .await
        }
    });
    for result in futures::future::join_all(tasks).await {
        result.expect("increment failed");
    }

    let usage = app.state.usage.get_current_usage(org.id).await.unwrap().unwrap();
    assert_eq!(usage.api_requests_count, 25);
    assert_eq!(app.count("organization_usage").await, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn set_usage_overwrites_only_given_fields() {
    let app = TestApp::spawn().await;
    let (org, _) = app.organization().await;

    app.state
        .usage
        .increment_usage(org.id, UsageField::ProjectsCount, 3)
        .await
        .unwrap();

    let values = BTreeMap::from([(UsageField::SchemasCount, 7), (UsageField::ProjectsCount, 1)]);
    let usage = app
        .state
        .usage
        .upsert_current_usage(org.id, &values)
        .await
        .unwrap();

    assert_eq!(usage.schemas_count, 7);
    assert_eq!(usage.projects_count, 1);
    assert_eq!(usage.users_count, 1);

    let empty = app
        .state
        .usage
        .upsert_current_usage(org.id, &BTreeMap::new())
        .await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    app.cleanup().await;
}

#[tokio::test]
async fn usage_for_unknown_organization_is_not_found() {
    let app = TestApp::spawn().await;

    let result = app
        .state
        .usage
        .increment_usage(Uuid::new_v4(), UsageField::UsersCount, 1)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    app.cleanup().await;
}

#[tokio::test]
async fn history_contains_current_period() {
    let app = TestApp::spawn().await;
    let (org, _) = app.organization().await;

    let history = app.state.usage.usage_history(org.id, 0).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.items[0].users_count, 1);

    app.cleanup().await;
}
