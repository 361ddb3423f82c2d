//! Email automation and campaign delivery core for the membership platform.
//!
//! Covers trigger-based automated emails with per-user dedup windows,
//! scheduled bulk campaigns with bounded retries, the append-only
//! communications log, and the periodic inactivity / signup / WhatsApp
//! expiry scanners.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::mailer::EmailTransport;

pub mod api;
pub mod automation;
pub mod config;
pub mod entity;
pub mod error;
pub mod mailer;

/// Shared handles injected into every component. The transport is a
/// trait object so tests can swap the SMTP mailer for an in-memory one.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<dyn EmailTransport>,
    pub config: Arc<AppConfig>,
}
