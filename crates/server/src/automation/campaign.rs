//! Scheduled campaign batch sender.
//!
//! `process_scheduled_campaigns` is idempotent and safe to invoke from a
//! timer: due campaigns are claimed with a conditional status update
//! (scheduled -> sending) checked by affected-row count, so overlapping
//! invocations or multiple instances never process the same campaign
//! twice. Within a campaign, one recipient's failure never aborts the
//! batch.

use crate::automation::comms::{self, SendContext};
use crate::automation::retry::{RetryPolicy, send_with_retry};
use crate::automation::template::{TriggerContext, build_variables, html_to_text, render};
use crate::config::AppConfig;
use crate::entity::campaign_recipient::{self, RecipientStatus};
use crate::entity::email_campaign::{self, CampaignStatus};
use crate::entity::user;
use crate::error::AutomationError;
use crate::mailer::{EmailTransport, OutboundEmail};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;

/// Message type recorded in the communications log for campaign sends.
pub const CAMPAIGN_MESSAGE_TYPE: &str = "campaign";

/// Final campaign status: failed only when every pending recipient
/// failed and there was at least one.
pub fn final_status(sent_count: i32, failed_count: i32) -> CampaignStatus {
    if failed_count > 0 && sent_count == 0 {
        CampaignStatus::Failed
    } else {
        CampaignStatus::Sent
    }
}

/// Process every campaign that is scheduled and due. Never propagates an
/// error: campaign-level failures mark that campaign failed and move on.
#[tracing::instrument(skip_all)]
pub async fn process_scheduled_campaigns(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    config: &AppConfig,
    policy: RetryPolicy,
) {
    let now = OffsetDateTime::now_utc();
    let due = match email_campaign::Entity::find()
        .filter(email_campaign::Column::Status.eq(CampaignStatus::Scheduled))
        .filter(email_campaign::Column::ScheduledFor.lte(now))
        .all(db)
        .await
    {
        Ok(campaigns) => campaigns,
        Err(e) => {
            tracing::error!(
                name = "automation.campaign.query_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to query due campaigns"
            );
            return;
        }
    };

    if due.is_empty() {
        return;
    }

    tracing::info!(
        name = "automation.campaign.batch_start",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        due = due.len(),
        message = "Processing due campaigns"
    );

    for campaign in due {
        let campaign_id = campaign.id;

        // Claim: scheduled -> sending, conditional on the status still
        // being scheduled. Zero affected rows means another instance or
        // an overlapping tick got there first.
        let claim = email_campaign::Entity::update_many()
            .set(email_campaign::ActiveModel {
                status: ActiveValue::Set(CampaignStatus::Sending),
                ..Default::default()
            })
            .filter(email_campaign::Column::Id.eq(campaign_id))
            .filter(email_campaign::Column::Status.eq(CampaignStatus::Scheduled))
            .exec(db)
            .await;
        match claim {
            Ok(res) if res.rows_affected == 0 => {
                tracing::info!(
                    name = "automation.campaign.claim_lost",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    campaign_id,
                    message = "Campaign already claimed elsewhere, skipping"
                );
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    name = "automation.campaign.claim_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    campaign_id,
                    message = "Failed to claim campaign"
                );
                continue;
            }
        }

        if let Err(e) = process_one_campaign(db, transport, config, policy, &campaign).await {
            tracing::error!(
                name = "automation.campaign.fatal",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                campaign_id,
                message = "Campaign processing aborted, marking failed"
            );
            let failed = email_campaign::ActiveModel {
                id: ActiveValue::Unchanged(campaign_id),
                status: ActiveValue::Set(CampaignStatus::Failed),
                ..Default::default()
            };
            let _ = failed.update(db).await;
        }
    }
}

async fn process_one_campaign(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    config: &AppConfig,
    policy: RetryPolicy,
    campaign: &email_campaign::Model,
) -> Result<(), AutomationError> {
    let pending: Vec<campaign_recipient::Model> = campaign_recipient::Entity::find()
        .filter(campaign_recipient::Column::CampaignId.eq(campaign.id))
        .filter(campaign_recipient::Column::Status.eq(RecipientStatus::Pending))
        .all(db)
        .await?;

    let mut sent_count = 0;
    let mut failed_count = 0;

    for recipient in &pending {
        match process_recipient(db, transport, config, policy, campaign, recipient).await {
            Ok(true) => sent_count += 1,
            Ok(false) => failed_count += 1,
            Err(e) => {
                // Per-recipient failures are terminal for the recipient,
                // never for the batch.
                failed_count += 1;
                tracing::error!(
                    name = "automation.campaign.recipient_error",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    campaign_id = campaign.id,
                    recipient_id = recipient.id,
                    message = "Recipient processing failed"
                );
                let _ = mark_recipient_failed(db, recipient.id, &e.to_string()).await;
            }
        }
    }

    let done = email_campaign::ActiveModel {
        id: ActiveValue::Unchanged(campaign.id),
        status: ActiveValue::Set(final_status(sent_count, failed_count)),
        sent_at: ActiveValue::Set(Some(OffsetDateTime::now_utc())),
        sent_count: ActiveValue::Set(sent_count),
        failed_count: ActiveValue::Set(failed_count),
        ..Default::default()
    };
    done.update(db).await?;

    tracing::info!(
        name = "automation.campaign.done",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        campaign_id = campaign.id,
        sent_count,
        failed_count,
        message = "Campaign processed"
    );
    Ok(())
}

/// Sends to one recipient. `Ok(true)` if the message went out.
async fn process_recipient(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    config: &AppConfig,
    policy: RetryPolicy,
    campaign: &email_campaign::Model,
    recipient: &campaign_recipient::Model,
) -> Result<bool, AutomationError> {
    let member = user::Entity::find_by_id(recipient.user_id).one(db).await?;
    let member = match member {
        Some(m) if !m.email.trim().is_empty() => m,
        _ => {
            mark_recipient_failed(db, recipient.id, "User not found or no email").await?;
            return Ok(false);
        }
    };

    let vars = build_variables(
        &member,
        &TriggerContext::default(),
        config,
        Some((campaign.id, recipient.id)),
    );
    let html = render(&campaign.html_content, &vars);
    let message = OutboundEmail {
        to_email: member.email.clone(),
        to_name: Some(member.full_name()),
        subject: render(&campaign.subject, &vars),
        text: html_to_text(&html),
        html,
        reply_to: None,
    };

    let result = send_with_retry(transport, &message, policy).await;
    comms::record_outcome(
        db,
        transport.provider_name(),
        &message,
        &SendContext {
            message_type: CAMPAIGN_MESSAGE_TYPE,
            user_id: Some(member.id),
        },
        &result,
    )
    .await;

    match result {
        Ok(receipt) => {
            let update = campaign_recipient::ActiveModel {
                id: ActiveValue::Unchanged(recipient.id),
                status: ActiveValue::Set(RecipientStatus::Sent),
                sent_at: ActiveValue::Set(Some(OffsetDateTime::now_utc())),
                provider_message_id: ActiveValue::Set(receipt.message_id),
                ..Default::default()
            };
            update.update(db).await?;
            Ok(true)
        }
        Err(e) => {
            mark_recipient_failed(db, recipient.id, &e.to_string()).await?;
            Ok(false)
        }
    }
}

async fn mark_recipient_failed(
    db: &DatabaseConnection,
    recipient_id: i32,
    error: &str,
) -> Result<(), AutomationError> {
    let update = campaign_recipient::ActiveModel {
        id: ActiveValue::Unchanged(recipient_id),
        status: ActiveValue::Set(RecipientStatus::Failed),
        error_message: ActiveValue::Set(Some(error.to_string())),
        ..Default::default()
    };
    update.update(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_failed_campaign_is_failed() {
        assert_eq!(final_status(0, 3), CampaignStatus::Failed);
    }

    #[test]
    fn partial_failure_is_sent() {
        assert_eq!(final_status(1, 2), CampaignStatus::Sent);
    }

    #[test]
    fn empty_pending_list_is_sent() {
        assert_eq!(final_status(0, 0), CampaignStatus::Sent);
    }
}
