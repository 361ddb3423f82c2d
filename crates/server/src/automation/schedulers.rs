//! Periodic scanners and their timer entry points.
//!
//! Each `start_*_scheduler` spawns its own settle-delay + interval loop
//! and returns immediately. Ticks swallow per-user errors: nothing a
//! scan encounters may stop the interval timer.
//!
//! Outside production the inactivity and campaign schedulers are
//! log-only no-ops; the WhatsApp-expiry scanner always runs because its
//! dedup state (the per-user tag list) must stay accurate in every
//! environment.

use crate::AppResources;
use crate::automation::comms::{self, SendContext};
use crate::automation::retry::RetryPolicy;
use crate::automation::template::TriggerContext;
use crate::automation::trigger::trigger_automation;
use crate::automation::{campaign, template};
use crate::entity::user;
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection, EntityTrait};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::Duration;

/// Campaign sender: settle for a minute, then every five minutes.
pub const CAMPAIGN_SETTLE_DELAY: Duration = Duration::from_secs(60);
pub const CAMPAIGN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Population scanners: short settle, then daily.
pub const SCAN_SETTLE_DELAY: Duration = Duration::from_secs(10);
pub const SCAN_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Inactivity day-buckets, each a half-open interval [N, N+1) so a user
/// is in at most one bucket per run.
pub fn inactivity_trigger(days_since_login: i64) -> Option<&'static str> {
    match days_since_login {
        7 => Some("user_inactivity_7d"),
        14 => Some("user_inactivity_14d"),
        30 => Some("user_inactivity_30d"),
        _ => None,
    }
}

/// Incomplete signup fires 3-4 whole days after account creation while
/// either acceptance checkbox is still missing.
pub fn incomplete_signup_due(days_since_created: i64, terms: bool, disclaimer: bool) -> bool {
    (3..=4).contains(&days_since_created) && (!terms || !disclaimer)
}

/// WhatsApp-expiry reminder kind for a whole-day countdown, matching the
/// tags stored in `whatsapp_reminders_sent`.
pub fn whatsapp_reminder_kind(days_remaining: i64) -> Option<&'static str> {
    match days_remaining {
        7 => Some("7-day"),
        3 => Some("3-day"),
        _ => None,
    }
}

/// One pass of the inactivity / incomplete-signup scanner.
#[tracing::instrument(skip_all)]
pub async fn inactivity_scan_tick(resources: &AppResources) {
    let users = match user::Entity::find().all(resources.db.as_ref()).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(
                name = "schedulers.inactivity.query_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to load users for inactivity scan"
            );
            return;
        }
    };

    let now = OffsetDateTime::now_utc();
    for member in users {
        // Both conditions delegate to the trigger engine, which enforces
        // its own dedup window; trigger_automation never errors.
        if let Some(last_login) = member.last_login_at {
            let days = (now - last_login).whole_days();
            if let Some(trigger_type) = inactivity_trigger(days) {
                let outcome = trigger_automation(
                    resources.db.as_ref(),
                    resources.mailer.as_ref(),
                    &resources.config,
                    trigger_type,
                    member.id,
                    &TriggerContext::default(),
                )
                .await;
                tracing::debug!(
                    name = "schedulers.inactivity.trigger",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    user_id = member.id,
                    trigger_type,
                    triggered = outcome.triggered,
                    reason = outcome.reason.as_deref().unwrap_or(""),
                    message = "Inactivity trigger evaluated"
                );
            }
        }

        let days_since_created = (now - member.created_at).whole_days();
        if incomplete_signup_due(
            days_since_created,
            member.terms_accepted,
            member.disclaimer_accepted,
        ) {
            let outcome = trigger_automation(
                resources.db.as_ref(),
                resources.mailer.as_ref(),
                &resources.config,
                "incomplete_signup_3d",
                member.id,
                &TriggerContext::default(),
            )
            .await;
            tracing::debug!(
                name = "schedulers.incomplete_signup.trigger",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                user_id = member.id,
                triggered = outcome.triggered,
                reason = outcome.reason.as_deref().unwrap_or(""),
                message = "Incomplete-signup trigger evaluated"
            );
        }
    }
}

/// One pass of the WhatsApp support expiry scanner.
///
/// Sends directly through the transport rather than the trigger engine:
/// "exactly N days remaining" becomes true only once per membership
/// period, so dedup is the persistent per-user tag list, not a time
/// window.
#[tracing::instrument(skip_all)]
pub async fn whatsapp_expiry_scan_tick(resources: &AppResources) {
    let users = match user::Entity::find().all(resources.db.as_ref()).await {
        Ok(users) => users,
        Err(e) => {
            tracing::error!(
                name = "schedulers.whatsapp.query_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to load users for WhatsApp expiry scan"
            );
            return;
        }
    };

    let now = OffsetDateTime::now_utc();
    for member in users {
        if !member.has_whatsapp_support || member.email.trim().is_empty() {
            continue;
        }
        let Some(expiry) = member.whatsapp_support_expiry_date else {
            continue;
        };
        if expiry <= now {
            continue;
        }

        let days_remaining = (expiry - now).whole_days();
        let Some(kind) = whatsapp_reminder_kind(days_remaining) else {
            continue;
        };
        if member.whatsapp_reminders_sent.contains(kind) {
            continue;
        }

        send_whatsapp_reminder(resources.db.as_ref(), resources, &member, days_remaining, kind)
            .await;
    }
}

async fn send_whatsapp_reminder(
    db: &DatabaseConnection,
    resources: &AppResources,
    member: &user::Model,
    days_remaining: i64,
    kind: &str,
) {
    let subject = format!("Your WhatsApp support expires in {days_remaining} days");
    let html_template = concat!(
        "<p>Hi {{firstName}},</p>",
        "<p>Your WhatsApp support access ends in {{daysRemaining}} days. ",
        "Renew from your dashboard to keep it: {{dashboardUrl}}</p>",
    );
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("firstName".to_string(), member.first_name.clone());
    vars.insert("daysRemaining".to_string(), days_remaining.to_string());
    vars.insert(
        "dashboardUrl".to_string(),
        format!("{}/dashboard", resources.config.dashboard_url),
    );
    let html = template::render(html_template, &vars);

    let message = crate::mailer::OutboundEmail {
        to_email: member.email.clone(),
        to_name: Some(member.full_name()),
        subject,
        text: template::html_to_text(&html),
        html,
        reply_to: None,
    };

    let message_type = format!("whatsapp_expiry_{days_remaining}d");
    match comms::send_and_log(
        db,
        resources.mailer.as_ref(),
        &message,
        SendContext {
            message_type: &message_type,
            user_id: Some(member.id),
        },
    )
    .await
    {
        Ok(_) => {
            // Tag before anything else can re-fire; the tag is the sole
            // idempotency guard on this path.
            let mut tags = member.whatsapp_reminders_sent.clone();
            tags.push(kind);
            let update = user::ActiveModel {
                id: ActiveValue::Unchanged(member.id),
                whatsapp_reminders_sent: ActiveValue::Set(tags),
                ..Default::default()
            };
            if let Err(e) = update.update(db).await {
                tracing::error!(
                    name = "schedulers.whatsapp.tag_update_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    user_id = member.id,
                    kind,
                    message = "Failed to record WhatsApp reminder tag"
                );
            }
            tracing::info!(
                name = "schedulers.whatsapp.reminder_sent",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                user_id = member.id,
                kind,
                message = "WhatsApp expiry reminder sent"
            );
        }
        Err(e) => {
            tracing::error!(
                name = "schedulers.whatsapp.send_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                user_id = member.id,
                kind,
                message = "Failed to send WhatsApp expiry reminder"
            );
        }
    }
}

/// Spawn the campaign sender loop: 1 minute settle, then every 5 minutes.
pub fn start_campaign_scheduler(resources: Arc<AppResources>) {
    tokio::spawn(async move {
        tokio::time::sleep(CAMPAIGN_SETTLE_DELAY).await;
        let mut interval = tokio::time::interval(CAMPAIGN_INTERVAL);
        loop {
            interval.tick().await;
            if !resources.config.is_production() {
                tracing::debug!(
                    name = "schedulers.campaign.skipped",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Non-production environment, campaign tick skipped"
                );
                continue;
            }
            campaign::process_scheduled_campaigns(
                resources.db.as_ref(),
                resources.mailer.as_ref(),
                &resources.config,
                RetryPolicy::default(),
            )
            .await;
        }
    });
}

/// Spawn the inactivity/incomplete-signup scanner: short settle, then daily.
pub fn start_inactivity_scheduler(resources: Arc<AppResources>) {
    tokio::spawn(async move {
        tokio::time::sleep(SCAN_SETTLE_DELAY).await;
        let mut interval = tokio::time::interval(SCAN_INTERVAL);
        loop {
            interval.tick().await;
            if !resources.config.is_production() {
                tracing::debug!(
                    name = "schedulers.inactivity.skipped",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Non-production environment, inactivity scan skipped"
                );
                continue;
            }
            inactivity_scan_tick(&resources).await;
        }
    });
}

/// Spawn the WhatsApp-expiry scanner: short settle, then daily. Runs in
/// every environment.
pub fn start_whatsapp_reminder_scheduler(resources: Arc<AppResources>) {
    tokio::spawn(async move {
        tokio::time::sleep(SCAN_SETTLE_DELAY).await;
        let mut interval = tokio::time::interval(SCAN_INTERVAL);
        loop {
            interval.tick().await;
            whatsapp_expiry_scan_tick(&resources).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_buckets_are_exclusive() {
        assert_eq!(inactivity_trigger(6), None);
        assert_eq!(inactivity_trigger(7), Some("user_inactivity_7d"));
        assert_eq!(inactivity_trigger(8), None);
        assert_eq!(inactivity_trigger(14), Some("user_inactivity_14d"));
        assert_eq!(inactivity_trigger(15), None);
        assert_eq!(inactivity_trigger(30), Some("user_inactivity_30d"));
        assert_eq!(inactivity_trigger(31), None);
    }

    #[test]
    fn user_at_14_days_only_fires_14d() {
        // Whole-day bucketing: [14, 15) maps to exactly one trigger.
        let t = inactivity_trigger(14).unwrap();
        assert_eq!(t, "user_inactivity_14d");
        assert_ne!(t, "user_inactivity_7d");
        assert_ne!(t, "user_inactivity_30d");
    }

    #[test]
    fn incomplete_signup_window() {
        assert!(!incomplete_signup_due(2, false, false));
        assert!(incomplete_signup_due(3, false, true));
        assert!(incomplete_signup_due(4, true, false));
        assert!(!incomplete_signup_due(5, false, false));
        // Fully accepted users are never nagged.
        assert!(!incomplete_signup_due(3, true, true));
    }

    #[test]
    fn whatsapp_kinds() {
        assert_eq!(whatsapp_reminder_kind(7), Some("7-day"));
        assert_eq!(whatsapp_reminder_kind(3), Some("3-day"));
        assert_eq!(whatsapp_reminder_kind(8), None);
        assert_eq!(whatsapp_reminder_kind(4), None);
        assert_eq!(whatsapp_reminder_kind(0), None);
    }
}
