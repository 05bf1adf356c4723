use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    catalog::Module,
    connections::{self, ConnectionFilters, ConnectionListing, Direction},
    extract::{AppJson, AppQuery},
    session::CurrentUser,
    status::{connection_code, ConnectionStatus},
    views::{profile_view, relationship, ProfileView},
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(crate) struct NewConnection {
    accepter_id: i64,
    module_code: String,
}

#[derive(Deserialize)]
pub(crate) struct ConnectionUpdate {
    connection_id: i64,
    status: ConnectionStatus,
}

#[derive(Serialize)]
pub(crate) struct ConnectionView {
    connection_id: i64,
    module: Module,
    counterpart: ProfileView,
    status: i64,
    created_at: i64,
    direction: Direction,
}

#[derive(Serialize)]
pub(crate) struct ConnectionState {
    connection_id: i64,
    status: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_connections(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppQuery(filters): AppQuery<ConnectionFilters>,
) -> AppResult<Json<Vec<ConnectionView>>> {
    let listings = connections::list_for_user(&db_pool, user_id, &filters).await?;
    let accepted = connections::accepted_with(&db_pool, user_id).await?;

    let views = listings
        .into_iter()
        .map(|ConnectionListing { connection, module, counterpart, direction }| ConnectionView {
            connection_id: connection.id,
            module,
            counterpart: profile_view(&counterpart, relationship(user_id, counterpart.id, &accepted)),
            status: connection.status.code(),
            created_at: connection.created_at,
            direction,
        })
        .collect();
    Ok(Json(views))
}

#[debug_handler(state = AppState)]
pub(crate) async fn request_connection(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppJson(NewConnection { accepter_id, module_code }): AppJson<NewConnection>,
) -> AppResult<(StatusCode, Json<ConnectionState>)> {
    let connection =
        connections::request(&db_pool, user_id, accepter_id, &module_code, OffsetDateTime::now_utc()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ConnectionState { connection_id: connection.id, status: connection.status.code() }),
    ))
}

/// Rejecting removes the connection; the response then carries status `0`.
#[debug_handler(state = AppState)]
pub(crate) async fn respond_to_connection(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppJson(ConnectionUpdate { connection_id, status }): AppJson<ConnectionUpdate>,
) -> AppResult<Json<ConnectionState>> {
    let connection = connections::respond(&db_pool, connection_id, user_id, status).await?;
    Ok(Json(ConnectionState {
        connection_id,
        status: connection_code(connection.map(|c| c.status)),
    }))
}
