//! Append-only audit log of every outbound message attempt.
//!
//! One row is written per send attempt, success or failure, and rows are
//! never mutated afterwards. The trigger engine's dedup check reads this
//! table by (user_id, message_type, status, created_at), so the migration
//! carries a covering index on exactly those columns.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Outcome of a single send attempt.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SendStatus {
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "communications_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Delivery channel, currently always "email".
    pub channel: String,
    /// Always "outgoing"; inbound channels may share this table later.
    pub direction: String,
    /// Provider name the message was handed to, e.g. "smtp".
    pub provider: String,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub user_id: Option<i32>,
    pub subject: String,
    /// Truncated body snapshot, not the full content.
    pub content_preview: String,
    /// Maps 1:1 to a trigger type, or "campaign"/"custom"/"test".
    pub message_type: String,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
