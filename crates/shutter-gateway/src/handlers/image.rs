use axum::extract::{Path, State};
use axum::response::Response;
use http::HeaderMap;

use crate::render::render;
use crate::state::AppState;

pub async fn image_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Response {
    render(state.router().handle(&raw, &headers).await)
}
