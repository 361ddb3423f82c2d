//! Member records, consumed (not owned) by the communications core.
//!
//! The only field this core mutates is `whatsapp_reminders_sent`: the
//! expiry scanner appends a tag per reminder kind it has issued.

use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Reminder-kind tags already issued to a user, e.g. "7-day", "3-day".
///
/// A persistent tag list rather than a time-window dedup: "exactly N days
/// remaining" only ever becomes true once per membership period, so the
/// tag never needs to expire.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct ReminderTags(pub Vec<String>);

impl ReminderTags {
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn push(&mut self, tag: &str) {
        if !self.contains(tag) {
            self.0.push(tag.to_string());
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub terms_accepted: bool,
    pub disclaimer_accepted: bool,
    pub has_whatsapp_support: bool,
    pub whatsapp_support_expiry_date: Option<OffsetDateTime>,
    #[sea_orm(column_type = "Json")]
    pub whatsapp_reminders_sent: ReminderTags,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Display name for the `fullName` template variable.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
