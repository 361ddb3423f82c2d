//! Campaign scheduling endpoint.

use crate::AppResources;
use crate::entity::email_campaign::{self, CampaignStatus};
use axum::{Extension, Json, extract::Path, http::StatusCode, response::IntoResponse};
use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const CAMPAIGNS_TAG: &str = "Campaigns API";

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// RFC 3339 timestamp the campaign becomes due at.
    pub scheduled_for: String,
}

/// Creates the campaigns API router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(schedule_campaign))
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/{id}/schedule",
    operation_id = "Schedule Campaign",
    tag = CAMPAIGNS_TAG,
    summary = "Schedule a draft campaign",
    description = "Moves a draft campaign to scheduled with the given due time. \
                   The batch sender picks it up on its next tick once the time \
                   has passed. Only draft campaigns can be scheduled.",
    params(("id" = i32, Path, description = "Campaign id")),
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Campaign scheduled", body = email_campaign::Model),
        (status = 400, description = "Invalid timestamp"),
        (status = 404, description = "Campaign not found"),
        (status = 409, description = "Campaign is not a draft")
    )
)]
async fn schedule_campaign(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<i32>,
    Json(payload): Json<ScheduleRequest>,
) -> impl IntoResponse {
    let scheduled_for = match OffsetDateTime::parse(&payload.scheduled_for, &Rfc3339) {
        Ok(t) => t,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "scheduledFor must be an RFC 3339 timestamp" })),
            )
                .into_response();
        }
    };

    let campaign = match email_campaign::Entity::find_by_id(id)
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Campaign not found" })),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(
                name = "api.campaigns.lookup_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                campaign_id = id,
                message = "Failed to load campaign"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if campaign.status != CampaignStatus::Draft {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Only draft campaigns can be scheduled" })),
        )
            .into_response();
    }

    let mut active: email_campaign::ActiveModel = campaign.into();
    active.status = ActiveValue::Set(CampaignStatus::Scheduled);
    active.scheduled_for = ActiveValue::Set(Some(scheduled_for));
    match active.update(resources.db.as_ref()).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => {
            tracing::error!(
                name = "api.campaigns.schedule_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                campaign_id = id,
                message = "Failed to schedule campaign"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
