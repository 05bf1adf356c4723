mod detail;
mod peers;
mod search;
mod update;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search::search))
        .route("/update/{year}", post(update::update_catalog))
        .route("/{code}", get(detail::module_detail))
        .route("/{code}/users", get(peers::module_peers))
}
