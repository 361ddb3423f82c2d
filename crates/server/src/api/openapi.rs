//! OpenAPI/Utoipa configuration.

use crate::api::{automations::AUTOMATIONS_TAG, campaigns::CAMPAIGNS_TAG, health::MISC_TAG};
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Membership Communications API",
        version = "1.0.0",
        description = "Email automation and campaign delivery for the membership platform."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTOMATIONS_TAG, description = "Automation trigger endpoints"),
        (name = CAMPAIGNS_TAG, description = "Campaign scheduling endpoints")
    )
)]
pub struct ApiDoc;
