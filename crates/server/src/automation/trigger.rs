//! Trigger engine for per-event automated emails.
//!
//! `trigger_automation` is fire-and-forget safe: every failure path,
//! expected or not, comes back as `TriggerOutcome { triggered: false }`
//! with a human-readable reason. Nothing here panics or returns `Err`
//! across the public boundary.

use crate::automation::comms::{self, SendContext};
use crate::automation::template::{TriggerContext, build_variables, html_to_text, render};
use crate::config::AppConfig;
use crate::entity::{automation_rule, user};
use crate::error::AutomationError;
use crate::mailer::{EmailTransport, OutboundEmail};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

/// Dedup window for inactivity-class triggers.
pub const INACTIVITY_DEDUP_WINDOW: Duration = Duration::days(7);

/// Dedup window for event-class triggers.
pub const EVENT_DEDUP_WINDOW: Duration = Duration::hours(24);

/// Result of a trigger attempt. `reason` is set whenever `triggered`
/// is false.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TriggerOutcome {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TriggerOutcome {
    pub fn sent() -> Self {
        Self {
            triggered: true,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            triggered: false,
            reason: Some(reason.into()),
        }
    }
}

/// Inactivity-class triggers fire off slow-moving user state, so a
/// repeat within a week is noise; event-class triggers may legitimately
/// recur daily.
pub fn is_inactivity_class(trigger_type: &str) -> bool {
    trigger_type.contains("inactivity") || trigger_type.contains("incomplete_signup")
}

pub fn dedup_window_for(trigger_type: &str) -> Duration {
    if is_inactivity_class(trigger_type) {
        INACTIVITY_DEDUP_WINDOW
    } else {
        EVENT_DEDUP_WINDOW
    }
}

/// Fire the automation identified by `trigger_type` for one user.
///
/// At most one successful send per (user, trigger type) per dedup
/// window: the window check reads the communications log, and the log
/// row for this send is written before this function returns.
#[tracing::instrument(skip(db, transport, config, context))]
pub async fn trigger_automation(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    config: &AppConfig,
    trigger_type: &str,
    user_id: i32,
    context: &TriggerContext,
) -> TriggerOutcome {
    match run_trigger(db, transport, config, trigger_type, user_id, context).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                name = "automation.trigger.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                trigger_type,
                user_id,
                message = "Trigger aborted by internal error"
            );
            TriggerOutcome::skipped(format!("Internal error: {e}"))
        }
    }
}

async fn run_trigger(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    config: &AppConfig,
    trigger_type: &str,
    user_id: i32,
    context: &TriggerContext,
) -> Result<TriggerOutcome, AutomationError> {
    let Some(rule) = automation_rule::Entity::find()
        .filter(automation_rule::Column::TriggerType.eq(trigger_type))
        .one(db)
        .await?
    else {
        return Ok(TriggerOutcome::skipped(format!(
            "No automation rule for trigger type '{trigger_type}'"
        )));
    };

    if !rule.enabled {
        return Ok(TriggerOutcome::skipped(format!(
            "Rule '{}' is disabled",
            rule.name
        )));
    }

    let Some(member) = user::Entity::find_by_id(user_id).one(db).await? else {
        return Ok(TriggerOutcome::skipped(format!("User {user_id} not found")));
    };
    if member.email.trim().is_empty() {
        return Ok(TriggerOutcome::skipped(format!(
            "User {user_id} has no email address"
        )));
    }

    let now = OffsetDateTime::now_utc();
    let window = dedup_window_for(trigger_type);
    if comms::sent_within_window(db, user_id, trigger_type, window, now).await? {
        return Ok(TriggerOutcome::skipped(format!(
            "Already sent '{trigger_type}' to user {user_id} within dedup window"
        )));
    }

    let vars = build_variables(&member, context, config, None);
    let html = render(&rule.html_content, &vars);
    let message = OutboundEmail {
        to_email: member.email.clone(),
        to_name: Some(member.full_name()),
        subject: render(&rule.subject, &vars),
        text: html_to_text(&html),
        html,
        reply_to: None,
    };

    // No retries on this path: single-trigger emails are cheap to lose,
    // retrying is the campaign sender's job.
    if let Err(e) = comms::send_and_log(
        db,
        transport,
        &message,
        SendContext {
            message_type: trigger_type,
            user_id: Some(user_id),
        },
    )
    .await
    {
        return Ok(TriggerOutcome::skipped(format!("Send failed: {e}")));
    }

    // Best-effort counter bump; the email is already out.
    let rule_name = rule.name.clone();
    let times_sent = rule.times_sent;
    let mut active: automation_rule::ActiveModel = rule.into();
    active.times_sent = ActiveValue::Set(times_sent + 1);
    if let Err(e) = active.update(db).await {
        tracing::error!(
            name = "automation.trigger.counter_update_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            rule = %rule_name,
            message = "Failed to increment rule sent counter"
        );
    }

    tracing::info!(
        name = "automation.trigger.sent",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        trigger_type,
        user_id,
        message = "Automated email sent"
    );

    Ok(TriggerOutcome::sent())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactivity_classification() {
        assert!(is_inactivity_class("user_inactivity_7d"));
        assert!(is_inactivity_class("user_inactivity_30d"));
        assert!(is_inactivity_class("incomplete_signup_3d"));
        assert!(!is_inactivity_class("welcome"));
        assert!(!is_inactivity_class("program_completed"));
    }

    #[test]
    fn window_selection() {
        assert_eq!(dedup_window_for("user_inactivity_14d"), Duration::days(7));
        assert_eq!(dedup_window_for("welcome"), Duration::hours(24));
    }
}
