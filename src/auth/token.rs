use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{identity, session::CurrentUser, AppError, AppResult, AppState};

use super::login::SignedIn;

/// Issues a fresh session id for the same user.
#[debug_handler(state = AppState)]
pub(crate) async fn refresh(CurrentUser(user_id): CurrentUser, session: Session) -> AppResult<Json<SignedIn>> {
    session.cycle_id().await?;
    Ok(Json(SignedIn { user_id }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn verify(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<SignedIn>> {
    identity::find_user(&db_pool, user_id)
        .await
        .map_err(|_| AppError::Unauthenticated("session user no longer exists".into()))?;
    Ok(Json(SignedIn { user_id }))
}
