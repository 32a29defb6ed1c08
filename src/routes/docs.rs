use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const SWAGGER_UI_PATH: &str = "/docs";
const OPENAPI_JSON_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI for the room and health endpoints. The WebSocket event protocol is described
/// in the operation docs of `/ws` and `/ws/notifications`.
pub fn router(state: SharedState) -> Router<SharedState> {
    let ui: Router<SharedState> = SwaggerUi::new(SWAGGER_UI_PATH)
        .url(OPENAPI_JSON_PATH, ApiDoc::openapi())
        .into();

    ui.with_state(state)
}
