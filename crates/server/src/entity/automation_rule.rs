//! Administrator-managed rules for trigger-based automated emails.
//!
//! The trigger engine treats rules as read-only apart from the
//! `times_sent` counter, which is incremented best-effort after a
//! successful send.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "automation_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// Stable string key, e.g. "user_inactivity_7d" or "welcome".
    #[sea_orm(unique)]
    pub trigger_type: String,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub html_content: String,
    pub enabled: bool,
    pub times_sent: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
