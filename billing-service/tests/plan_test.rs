//! Plan catalog integration tests.

mod common;

use billing_service::models::{CreatePlan, PlanLimits};
use common::{plan, TestApp, STARTER_PLAN_ID};
use rust_decimal::Decimal;
use service_core::error::AppError;

fn team_plan(slug: &str) -> CreatePlan {
    CreatePlan {
        name: "Team".to_string(),
        slug: slug.to_string(),
        description: Some("For growing teams".to_string()),
        price_monthly: Decimal::new(2900, 2),
        price_yearly: Decimal::new(29000, 2),
        limits: PlanLimits {
            max_users: 10,
            max_projects: 20,
            max_environments: 5,
            max_schemas: 50,
            max_test_records_per_schema: 10_000,
        },
        features: vec!["sso".to_string()],
    }
}

#[tokio::test]
async fn seeded_plans_resolve_by_id_and_slug() {
    let app = TestApp::spawn().await;

    let by_slug = app.state.plans.get_by_slug("starter").await.unwrap();
    assert_eq!(by_slug.id, plan(STARTER_PLAN_ID));
    assert_eq!(by_slug.price_monthly, Decimal::new(1900, 2));

    let plans = app.state.plans.list_active().await.unwrap();
    let prices: Vec<Decimal> = plans.iter().map(|p| p.price_monthly).collect();
    let mut sorted = prices.clone();
    sorted.sort();
    assert_eq!(prices, sorted);

    app.cleanup().await;
}

#[tokio::test]
async fn created_plan_is_listed_until_deactivated() {
    let app = TestApp::spawn().await;

    let created = app.state.plans.create_plan(&team_plan("team")).await.unwrap();
    assert!(created.is_active);
    assert!(app
        .state
        .plans
        .compare()
        .await
        .unwrap()
        .iter()
        .any(|p| p.id == created.id));

    let duplicate = app.state.plans.create_plan(&team_plan("team")).await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));

    app.state.plans.deactivate_plan(created.id).await.unwrap();

    let hidden = app.state.plans.get_by_id(created.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound(_))));
    let retained = app.state.plans.find_any(created.id).await.unwrap();
    assert!(retained.is_some_and(|p| !p.is_active));

    app.cleanup().await;
}

#[tokio::test]
async fn fractional_cent_price_is_rejected() {
    let app = TestApp::spawn().await;

    let mut input = team_plan("odd");
    input.price_monthly = Decimal::new(1999, 3);
    let result = app.state.plans.create_plan(&input).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    app.cleanup().await;
}
