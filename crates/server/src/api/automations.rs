//! Automation trigger endpoint.
//!
//! Route handlers elsewhere in the platform fire automations without
//! waiting for the send: the endpoint spawns the trigger and answers
//! immediately. Failures are visible in the communications log, not to
//! the caller.

use crate::AppResources;
use crate::automation::template::TriggerContext;
use crate::automation::trigger::trigger_automation;
use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const AUTOMATIONS_TAG: &str = "Automations API";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    /// Stable trigger key, e.g. "welcome" or "program_completed".
    pub trigger_type: String,
    pub user_id: i32,
    #[serde(default)]
    pub context: TriggerContext,
}

/// Creates the automations API router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(fire_trigger))
}

#[tracing::instrument(skip(resources, payload), fields(trigger_type = payload.trigger_type, user_id = payload.user_id))]
#[utoipa::path(
    post,
    path = "/trigger",
    operation_id = "Fire Automation Trigger",
    tag = AUTOMATIONS_TAG,
    summary = "Fire an automation trigger for a user",
    description = "Queues an automated email for the given trigger type and user.\n\n\
                   The send happens in the background; the dedup window and rule \
                   checks may still suppress it. Outcomes are recorded in the \
                   communications log.",
    request_body = TriggerRequest,
    responses(
        (status = 202, description = "Trigger queued", body = serde_json::Value)
    )
)]
async fn fire_trigger(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<TriggerRequest>,
) -> impl IntoResponse {
    let trigger_type = payload.trigger_type.clone();
    tokio::spawn(async move {
        let outcome = trigger_automation(
            resources.db.as_ref(),
            resources.mailer.as_ref(),
            &resources.config,
            &payload.trigger_type,
            payload.user_id,
            &payload.context,
        )
        .await;
        if !outcome.triggered {
            tracing::info!(
                name = "api.automations.not_triggered",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                trigger_type = %payload.trigger_type,
                user_id = payload.user_id,
                reason = outcome.reason.as_deref().unwrap_or(""),
                message = "Trigger did not result in a send"
            );
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "queued": trigger_type })),
    )
}
