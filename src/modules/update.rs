use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    catalog::{self, CatalogClient},
    extract::AppPath,
    session::AdminUser,
    AppResult, AppState,
};

#[derive(Serialize)]
pub(crate) struct Imported {
    imported: usize,
}

/// Pulls the module list for an academic year (e.g. `2024-2025`) and
/// upserts it into the catalog.
#[debug_handler(state = AppState)]
pub(crate) async fn update_catalog(
    State(db_pool): State<SqlitePool>,
    State(catalog_client): State<CatalogClient>,
    AdminUser(admin_id): AdminUser,
    AppPath(year): AppPath<String>,
) -> AppResult<Json<Imported>> {
    let entries = catalog_client.fetch(&year).await?;
    let imported = catalog::import_catalog(&db_pool, &entries).await?;

    tracing::info!(admin_id, %year, imported, "catalog updated");
    Ok(Json(Imported { imported }))
}
