use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{extract::AppJson, identity, session, AppResult, AppState};

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    nus_email: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct SignedIn {
    pub(crate) user_id: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    AppJson(LoginRequest { nus_email, password }): AppJson<LoginRequest>,
) -> AppResult<Json<SignedIn>> {
    let user = identity::authenticate(&db_pool, &nus_email, &password).await?;
    session::sign_in(&session, user.id).await?;

    tracing::info!(user_id = user.id, "signed in");
    Ok(Json(SignedIn { user_id: user.id }))
}
