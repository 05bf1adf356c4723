use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;

use crate::{
    connections,
    extract::{AppJson, AppPath},
    identity::{self, ProfilePatch},
    session::CurrentUser,
    views::{own_profile_view, profile_view, relationship, OwnProfileView, ProfileView},
    AppResult, AppState,
};

#[debug_handler(state = AppState)]
pub(crate) async fn own_profile(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<OwnProfileView>> {
    let user = identity::find_user(&db_pool, user_id).await?;
    Ok(Json(own_profile_view(&user)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_own_profile(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppJson(patch): AppJson<ProfilePatch>,
) -> AppResult<Json<OwnProfileView>> {
    let user = identity::update_profile(&db_pool, user_id, patch).await?;
    Ok(Json(own_profile_view(&user)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn user_profile(
    State(db_pool): State<SqlitePool>,
    CurrentUser(viewer_id): CurrentUser,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ProfileView>> {
    let user = identity::find_user(&db_pool, id).await?;
    let accepted = connections::accepted_with(&db_pool, viewer_id).await?;
    Ok(Json(profile_view(&user, relationship(viewer_id, user.id, &accepted))))
}
