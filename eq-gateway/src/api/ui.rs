//! Demo recording page
//!
//! GET / serves a small embedded page that captures microphone audio
//! and streams it to /listen, for manual end-to-end checks.

use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::AppState;

const DEMO_PAGE: &str = include_str!("../../static/index.html");

/// GET /
pub async fn demo_page() -> Html<&'static str> {
    Html(DEMO_PAGE)
}

/// Build UI routes
pub fn ui_routes() -> Router<AppState> {
    Router::new().route("/", get(demo_page))
}
