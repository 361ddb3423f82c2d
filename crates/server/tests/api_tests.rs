//! HTTP-level tests against the full router.

use axum_test::TestServer;
use membership_comms::AppResources;
use membership_comms::api::build_router;
use membership_comms::config::{AppConfig, SmtpConfig};
use membership_comms::entity::automation_rule;
use membership_comms::entity::email_campaign::{self, CampaignStatus};
use membership_comms::entity::user::{self, ReminderTags};
use membership_comms::mailer::{EmailTransport, InMemoryTransport};
use migration::MigratorTrait;
use sea_orm::{ActiveModelTrait, ActiveValue, Database, DatabaseConnection, EntityTrait};
use serde_json::json;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use time::format_description::well_known::Rfc3339;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        smtp: SmtpConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: "mailer".into(),
            password: "secret".into(),
            from: "Membership <no-reply@example.com>".into(),
            provider: "smtp".into(),
        },
        dashboard_url: "https://app.example.com".into(),
        environment: "test".into(),
        default_program_name: "your program".into(),
    }
}

async fn test_server() -> (TestServer, AppResources, Arc<InMemoryTransport>) {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    migration::Migrator::up(&db, None).await.expect("migrate");
    let transport = Arc::new(InMemoryTransport::new());
    let resources = AppResources {
        db: Arc::new(db),
        mailer: transport.clone() as Arc<dyn EmailTransport>,
        config: Arc::new(test_config()),
    };
    let server = TestServer::new(build_router(resources.clone())).expect("build test server");
    (server, resources, transport)
}

async fn insert_user(db: &DatabaseConnection) -> user::Model {
    user::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set("member@example.com".to_string()),
        first_name: ActiveValue::Set("Sarah".to_string()),
        last_name: ActiveValue::Set("Doe".to_string()),
        last_login_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        terms_accepted: ActiveValue::Set(true),
        disclaimer_accepted: ActiveValue::Set(true),
        has_whatsapp_support: ActiveValue::Set(false),
        whatsapp_support_expiry_date: ActiveValue::Set(None),
        whatsapp_reminders_sent: ActiveValue::Set(ReminderTags::default()),
    }
    .insert(db)
    .await
    .expect("insert user")
}

async fn insert_campaign(db: &DatabaseConnection, status: CampaignStatus) -> email_campaign::Model {
    email_campaign::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set("Spring newsletter".to_string()),
        subject: ActiveValue::Set("Hello {{firstName}}".to_string()),
        html_content: ActiveValue::Set("<p>News</p>".to_string()),
        status: ActiveValue::Set(status),
        scheduled_for: ActiveValue::Set(None),
        sent_at: ActiveValue::Set(None),
        sent_count: ActiveValue::Set(0),
        failed_count: ActiveValue::Set(0),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert campaign")
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (server, _resources, _transport) = test_server().await;
    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn trigger_endpoint_accepts_and_sends_in_background() {
    let (server, resources, transport) = test_server().await;
    let db = resources.db.as_ref();
    let member = insert_user(db).await;
    automation_rule::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set("Welcome".to_string()),
        trigger_type: ActiveValue::Set("welcome".to_string()),
        subject: ActiveValue::Set("Welcome {{firstName}}!".to_string()),
        html_content: ActiveValue::Set("<p>Hi {{firstName}}</p>".to_string()),
        enabled: ActiveValue::Set(true),
        times_sent: ActiveValue::Set(0),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert rule");

    let response = server
        .post("/api/automations/trigger")
        .json(&json!({ "triggerType": "welcome", "userId": member.id }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    response.assert_json(&json!({ "queued": "welcome" }));

    // The send is spawned; give it a moment to land.
    for _ in 0..50 {
        if !transport.sent().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome Sarah!");
}

#[tokio::test]
async fn unknown_trigger_is_still_accepted() {
    let (server, resources, _transport) = test_server().await;
    let member = insert_user(resources.db.as_ref()).await;

    let response = server
        .post("/api/automations/trigger")
        .json(&json!({ "triggerType": "no_such_rule", "userId": member.id }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
}

#[tokio::test]
async fn scheduling_a_draft_campaign_succeeds() {
    let (server, resources, _transport) = test_server().await;
    let campaign = insert_campaign(resources.db.as_ref(), CampaignStatus::Draft).await;
    let due = (OffsetDateTime::now_utc() + Duration::hours(2))
        .format(&Rfc3339)
        .unwrap();

    let response = server
        .post(&format!("/api/campaigns/{}/schedule", campaign.id))
        .json(&json!({ "scheduledFor": due }))
        .await;
    response.assert_status_ok();

    let reloaded = email_campaign::Entity::find_by_id(campaign.id)
        .one(resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, CampaignStatus::Scheduled);
    assert!(reloaded.scheduled_for.is_some());
}

#[tokio::test]
async fn scheduling_rejects_bad_input() {
    let (server, resources, _transport) = test_server().await;
    let draft = insert_campaign(resources.db.as_ref(), CampaignStatus::Draft).await;
    let sent = insert_campaign(resources.db.as_ref(), CampaignStatus::Sent).await;

    let response = server
        .post(&format!("/api/campaigns/{}/schedule", draft.id))
        .json(&json!({ "scheduledFor": "tomorrow-ish" }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/campaigns/999/schedule")
        .json(&json!({ "scheduledFor": "2030-01-01T00:00:00Z" }))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);

    let response = server
        .post(&format!("/api/campaigns/{}/schedule", sent.id))
        .json(&json!({ "scheduledFor": "2030-01-01T00:00:00Z" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}
