use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    catalog::{self, Module},
    extract::AppQuery,
    pagination::Page,
    AppError, AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    q: Option<String>,
    page: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn search(
    State(db_pool): State<SqlitePool>,
    AppQuery(SearchQuery { q, page }): AppQuery<SearchQuery>,
) -> AppResult<Json<Page<Module>>> {
    let page = match page.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Validation(format!("{raw:?} is not a valid page")))?,
        None => 1,
    };
    Ok(Json(catalog::search_modules(&db_pool, q.as_deref(), page).await?))
}
