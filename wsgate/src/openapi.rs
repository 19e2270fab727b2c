//! Interface documentation (`/docs`, `/openapi.json`)

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ErrorEnvelope;
use crate::health::{HealthResponse, SystemInfoResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "wsgate",
        description = "Authenticated real-time WebSocket gateway. The primary \
                       surface is the `/web` WebSocket endpoint; frames are \
                       JSON or protobuf envelopes routed by numeric package id.",
    ),
    paths(crate::health::health, crate::health::system_info),
    components(schemas(HealthResponse, SystemInfoResponse, ErrorEnvelope))
)]
pub struct ApiDoc;

/// Swagger UI router serving `/docs` and `/openapi.json`
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi())
}
