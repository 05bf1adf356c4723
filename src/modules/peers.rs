use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;

use crate::{
    extract::{AppPath, AppQuery},
    pagination::Listing,
    peers::{self, PeerQuery, RawPeerQuery},
    session::CurrentUser,
    views::PeerView,
    AppResult, AppState,
};

#[debug_handler(state = AppState)]
pub(crate) async fn module_peers(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppPath(code): AppPath<String>,
    AppQuery(raw): AppQuery<RawPeerQuery>,
) -> AppResult<Json<Listing<PeerView>>> {
    let query = PeerQuery::parse(raw)?;
    Ok(Json(peers::list_module_peers(&db_pool, user_id, &code, &query).await?))
}
