//! SeaORM entities for the communications core.

pub mod automation_rule;
pub mod campaign_recipient;
pub mod communications_log;
pub mod email_campaign;
pub mod user;
