use thiserror::Error;

/// Errors from the outbound email transport.
///
/// These never cross the public boundary of the core: the trigger engine
/// folds them into a `TriggerOutcome` reason and the campaign sender into
/// a recipient `error_message`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Provider rejected message: {0}")]
    Rejected(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Message build error: {0}")]
    Build(String),
}

impl TransportError {
    /// Provider-side failures may clear up between attempts; malformed
    /// input never does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::Rejected(_)
        )
    }
}

/// Internal errors of the automation core. Transport failures are folded
/// into outcomes and log rows at the call site, so only database errors
/// propagate this far.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
