use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{catalog, enrolment, extract::AppPath, session::CurrentUser, status::UNENROLLED, AppResult, AppState};

#[derive(Serialize)]
pub(crate) struct ModuleDetail {
    module_code: String,
    title: String,
    is_enrolled: bool,
    user_status: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn module_detail(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppPath(code): AppPath<String>,
) -> AppResult<Json<ModuleDetail>> {
    let module = catalog::find_module(&db_pool, &code).await?;
    let user_status = enrolment::get_status(&db_pool, user_id, &module.module_code).await?;

    Ok(Json(ModuleDetail {
        module_code: module.module_code,
        title: module.title,
        is_enrolled: user_status != UNENROLLED,
        user_status,
    }))
}
