//! Communications-log plumbing shared by the trigger engine, the
//! campaign sender and the expiry scanner.
//!
//! Every send attempt, successful or not, produces exactly one log row
//! before control returns to the caller. This ordering is what makes the
//! dedup check in [`crate::automation::trigger`] observe a send performed
//! by an immediately preceding call.

use crate::entity::communications_log::{self, SendStatus};
use crate::error::TransportError;
use crate::mailer::{EmailTransport, OutboundEmail, SendReceipt};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use time::{Duration, OffsetDateTime};

/// Stored body snapshot length; the full content is not worth keeping.
const PREVIEW_LEN: usize = 500;

/// Channel recorded for all current traffic.
pub const CHANNEL_EMAIL: &str = "email";

/// Metadata attached to the log row for one outbound message.
pub struct SendContext<'a> {
    pub message_type: &'a str,
    pub user_id: Option<i32>,
}

fn truncate_preview(html: &str) -> String {
    if html.len() <= PREVIEW_LEN {
        return html.to_string();
    }
    let mut end = PREVIEW_LEN;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    html[..end].to_string()
}

/// Send `message` through `transport` and append the outcome to the
/// communications log. The log row is written for both outcomes; a
/// failure to write it is logged but does not change the send result.
pub async fn send_and_log(
    db: &DatabaseConnection,
    transport: &dyn EmailTransport,
    message: &OutboundEmail,
    ctx: SendContext<'_>,
) -> Result<SendReceipt, TransportError> {
    let result = transport.send(message).await;
    record_outcome(db, transport.provider_name(), message, &ctx, &result).await;
    result
}

/// Append one log row for a send outcome. Used directly by the campaign
/// sender, which runs its own retry loop and logs the final result.
pub async fn record_outcome(
    db: &DatabaseConnection,
    provider: &str,
    message: &OutboundEmail,
    ctx: &SendContext<'_>,
    result: &Result<SendReceipt, TransportError>,
) {
    let (status, provider_message_id, error_message) = match result {
        Ok(receipt) => (SendStatus::Sent, receipt.message_id.clone(), None),
        Err(e) => (SendStatus::Failed, None, Some(e.to_string())),
    };

    let entry = communications_log::ActiveModel {
        id: ActiveValue::NotSet,
        channel: ActiveValue::Set(CHANNEL_EMAIL.to_string()),
        direction: ActiveValue::Set("outgoing".to_string()),
        provider: ActiveValue::Set(provider.to_string()),
        recipient_email: ActiveValue::Set(message.to_email.clone()),
        recipient_name: ActiveValue::Set(message.to_name.clone()),
        user_id: ActiveValue::Set(ctx.user_id),
        subject: ActiveValue::Set(message.subject.clone()),
        content_preview: ActiveValue::Set(truncate_preview(&message.html)),
        message_type: ActiveValue::Set(ctx.message_type.to_string()),
        status: ActiveValue::Set(status),
        provider_message_id: ActiveValue::Set(provider_message_id),
        error_message: ActiveValue::Set(error_message),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    };

    if let Err(e) = entry.insert(db).await {
        tracing::error!(
            name = "comms.log_insert_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            message_type = ctx.message_type,
            message = "Failed to append communications log entry"
        );
    }
}

/// Indexed dedup lookup: has a message of this type been successfully
/// sent to this user within `window` of `now`?
pub async fn sent_within_window(
    db: &DatabaseConnection,
    user_id: i32,
    message_type: &str,
    window: Duration,
    now: OffsetDateTime,
) -> Result<bool, DbErr> {
    let count = communications_log::Entity::find()
        .filter(communications_log::Column::UserId.eq(user_id))
        .filter(communications_log::Column::MessageType.eq(message_type))
        .filter(communications_log::Column::Channel.eq(CHANNEL_EMAIL))
        .filter(communications_log::Column::Status.eq(SendStatus::Sent))
        .filter(communications_log::Column::CreatedAt.gte(now - window))
        .count(db)
        .await?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let body = "ä".repeat(400); // 800 bytes of two-byte chars
        let preview = truncate_preview(&body);
        assert!(preview.len() <= PREVIEW_LEN);
        assert!(preview.chars().all(|c| c == 'ä'));
    }

    #[test]
    fn short_preview_unchanged() {
        assert_eq!(truncate_preview("<p>Hi</p>"), "<p>Hi</p>");
    }
}
