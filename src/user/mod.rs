mod connections;
mod enrolments;
mod profile;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(profile::own_profile).put(profile::update_own_profile))
        .route("/modules", get(enrolments::enrolled_modules))
        .route("/modules/enroll", post(enrolments::enroll).delete(enrolments::unenroll))
        .route(
            "/modules/status/{module_code}",
            get(enrolments::module_status).put(enrolments::set_module_status),
        )
        .route(
            "/connections",
            get(connections::list_connections)
                .post(connections::request_connection)
                .put(connections::respond_to_connection),
        )
        .route("/{id}", get(profile::user_profile))
}
