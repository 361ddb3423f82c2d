//! Tests for the inactivity and WhatsApp-expiry scanners.

use membership_comms::AppResources;
use membership_comms::automation::schedulers::{inactivity_scan_tick, whatsapp_expiry_scan_tick};
use membership_comms::config::{AppConfig, SmtpConfig};
use membership_comms::entity::communications_log::{self, SendStatus};
use membership_comms::entity::user::{self, ReminderTags};
use membership_comms::entity::automation_rule;
use membership_comms::mailer::{EmailTransport, InMemoryTransport};
use migration::MigratorTrait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

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

async fn test_resources() -> (AppResources, Arc<InMemoryTransport>) {
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
    (resources, transport)
}

struct UserSeed {
    email: &'static str,
    last_login_days_ago: Option<i64>,
    created_days_ago: i64,
    terms: bool,
    disclaimer: bool,
    whatsapp_expiry_days: Option<i64>,
    reminders_sent: Vec<String>,
}

impl Default for UserSeed {
    fn default() -> Self {
        Self {
            email: "member@example.com",
            last_login_days_ago: None,
            created_days_ago: 100,
            terms: true,
            disclaimer: true,
            whatsapp_expiry_days: None,
            reminders_sent: Vec::new(),
        }
    }
}

async fn insert_user(db: &DatabaseConnection, seed: UserSeed) -> user::Model {
    let now = OffsetDateTime::now_utc();
    // An hour of slack keeps whole-day arithmetic inside the intended bucket.
    user::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set(seed.email.to_string()),
        first_name: ActiveValue::Set("Sarah".to_string()),
        last_name: ActiveValue::Set("Doe".to_string()),
        last_login_at: ActiveValue::Set(
            seed.last_login_days_ago
                .map(|d| now - Duration::days(d) - Duration::hours(1)),
        ),
        created_at: ActiveValue::Set(now - Duration::days(seed.created_days_ago) - Duration::hours(1)),
        terms_accepted: ActiveValue::Set(seed.terms),
        disclaimer_accepted: ActiveValue::Set(seed.disclaimer),
        has_whatsapp_support: ActiveValue::Set(seed.whatsapp_expiry_days.is_some()),
        whatsapp_support_expiry_date: ActiveValue::Set(
            seed.whatsapp_expiry_days
                .map(|d| now + Duration::days(d) + Duration::hours(1)),
        ),
        whatsapp_reminders_sent: ActiveValue::Set(ReminderTags(seed.reminders_sent)),
    }
    .insert(db)
    .await
    .expect("insert user")
}

async fn insert_rule(db: &DatabaseConnection, trigger_type: &str) {
    automation_rule::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set(format!("{trigger_type} rule")),
        trigger_type: ActiveValue::Set(trigger_type.to_string()),
        subject: ActiveValue::Set("We miss you {{firstName}}".to_string()),
        html_content: ActiveValue::Set("<p>Come back: {{dashboardUrl}}</p>".to_string()),
        enabled: ActiveValue::Set(true),
        times_sent: ActiveValue::Set(0),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert rule");
}

async fn sent_count(db: &DatabaseConnection, message_type: &str) -> u64 {
    communications_log::Entity::find()
        .filter(communications_log::Column::MessageType.eq(message_type))
        .filter(communications_log::Column::Status.eq(SendStatus::Sent))
        .count(db)
        .await
        .unwrap()
}

// =============================================================================
// Inactivity scanner
// =============================================================================

#[tokio::test]
async fn fourteen_day_user_fires_only_14d_bucket() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    insert_rule(db, "user_inactivity_7d").await;
    insert_rule(db, "user_inactivity_14d").await;
    insert_rule(db, "user_inactivity_30d").await;
    insert_user(
        db,
        UserSeed {
            last_login_days_ago: Some(14),
            ..Default::default()
        },
    )
    .await;

    inactivity_scan_tick(&resources).await;

    assert_eq!(sent_count(db, "user_inactivity_14d").await, 1);
    assert_eq!(sent_count(db, "user_inactivity_7d").await, 0);
    assert_eq!(sent_count(db, "user_inactivity_30d").await, 0);
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.sent()[0].subject, "We miss you Sarah");
}

#[tokio::test]
async fn rescan_is_deduped_by_trigger_engine() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    insert_rule(db, "user_inactivity_7d").await;
    insert_user(
        db,
        UserSeed {
            last_login_days_ago: Some(7),
            ..Default::default()
        },
    )
    .await;

    inactivity_scan_tick(&resources).await;
    inactivity_scan_tick(&resources).await;

    // Trigger-time bucket and delivery-time window agree: one email.
    assert_eq!(sent_count(db, "user_inactivity_7d").await, 1);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn users_outside_buckets_are_skipped() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    insert_rule(db, "user_inactivity_7d").await;
    insert_user(
        db,
        UserSeed {
            email: "fresh@example.com",
            last_login_days_ago: Some(2),
            ..Default::default()
        },
    )
    .await;
    insert_user(
        db,
        UserSeed {
            email: "gap@example.com",
            last_login_days_ago: Some(9),
            ..Default::default()
        },
    )
    .await;

    inactivity_scan_tick(&resources).await;

    assert_eq!(transport.sent().len(), 0);
}

#[tokio::test]
async fn incomplete_signup_fires_for_unaccepted_users() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    insert_rule(db, "incomplete_signup_3d").await;
    insert_user(
        db,
        UserSeed {
            email: "straggler@example.com",
            created_days_ago: 3,
            terms: false,
            ..Default::default()
        },
    )
    .await;
    insert_user(
        db,
        UserSeed {
            email: "complete@example.com",
            created_days_ago: 3,
            ..Default::default()
        },
    )
    .await;

    inactivity_scan_tick(&resources).await;

    assert_eq!(sent_count(db, "incomplete_signup_3d").await, 1);
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.sent()[0].to_email, "straggler@example.com");
}

// =============================================================================
// WhatsApp expiry scanner
// =============================================================================

#[tokio::test]
async fn seven_day_reminder_sent_once_and_tagged() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    let member = insert_user(
        db,
        UserSeed {
            whatsapp_expiry_days: Some(7),
            ..Default::default()
        },
    )
    .await;

    whatsapp_expiry_scan_tick(&resources).await;
    whatsapp_expiry_scan_tick(&resources).await;

    assert_eq!(transport.sent().len(), 1);
    assert!(transport.sent()[0].subject.contains("7 days"));
    assert_eq!(sent_count(db, "whatsapp_expiry_7d").await, 1);

    let updated = user::Entity::find_by_id(member.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.whatsapp_reminders_sent.contains("7-day"));
}

#[tokio::test]
async fn tagged_user_still_gets_later_reminder_kind() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();

    // Already reminded at 7 days; now at 3 days remaining.
    let member = insert_user(
        db,
        UserSeed {
            whatsapp_expiry_days: Some(3),
            reminders_sent: vec!["7-day".to_string()],
            ..Default::default()
        },
    )
    .await;

    whatsapp_expiry_scan_tick(&resources).await;

    assert_eq!(transport.sent().len(), 1);
    assert!(transport.sent()[0].subject.contains("3 days"));
    let updated = user::Entity::find_by_id(member.id)
        .one(db)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.whatsapp_reminders_sent.contains("7-day"));
    assert!(updated.whatsapp_reminders_sent.contains("3-day"));
}

#[tokio::test]
async fn already_tagged_kind_is_not_resent() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();
    insert_user(
        db,
        UserSeed {
            whatsapp_expiry_days: Some(7),
            reminders_sent: vec!["7-day".to_string()],
            ..Default::default()
        },
    )
    .await;

    whatsapp_expiry_scan_tick(&resources).await;

    assert_eq!(transport.sent().len(), 0);
}

#[tokio::test]
async fn expired_or_unsubscribed_users_are_skipped() {
    let (resources, transport) = test_resources().await;
    let db = resources.db.as_ref();

    // Support disabled.
    insert_user(
        db,
        UserSeed {
            email: "nosupport@example.com",
            ..Default::default()
        },
    )
    .await;
    // Mid-window, no reminder due.
    insert_user(
        db,
        UserSeed {
            email: "midwindow@example.com",
            whatsapp_expiry_days: Some(20),
            ..Default::default()
        },
    )
    .await;

    whatsapp_expiry_scan_tick(&resources).await;

    assert_eq!(transport.sent().len(), 0);
}
