//! Email automation core.
//!
//! This module contains:
//! - `template` - `{{variable}}` substitution and plain-text derivation
//! - `comms` - communications-log append + dedup window queries
//! - `trigger` - the trigger engine for per-event automated emails
//! - `retry` - retry policy for the campaign send path
//! - `campaign` - the scheduled campaign batch sender
//! - `schedulers` - inactivity / incomplete-signup / WhatsApp-expiry scanners

pub mod campaign;
pub mod comms;
pub mod retry;
pub mod schedulers;
pub mod template;
pub mod trigger;

pub use campaign::process_scheduled_campaigns;
pub use retry::RetryPolicy;
pub use template::{TriggerContext, build_variables, html_to_text, render};
pub use trigger::{TriggerOutcome, trigger_automation};
