use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    enrolment::{self, EnrolledModule},
    extract::{AppJson, AppPath},
    session::CurrentUser,
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(crate) struct ModuleRef {
    module_code: String,
}

#[derive(Deserialize, Serialize)]
pub(crate) struct StatusBody {
    status: i64,
}

#[derive(Serialize)]
pub(crate) struct Enrolled {
    module_code: String,
    status: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn enrolled_modules(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<Vec<EnrolledModule>>> {
    Ok(Json(enrolment::list_enrolled_modules(&db_pool, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn enroll(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppJson(ModuleRef { module_code }): AppJson<ModuleRef>,
) -> AppResult<(StatusCode, Json<Enrolled>)> {
    let enrolment = enrolment::enroll(&db_pool, user_id, &module_code).await?;
    Ok((
        StatusCode::CREATED,
        Json(Enrolled { module_code: enrolment.module_code, status: enrolment.status.code() }),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unenroll(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppJson(ModuleRef { module_code }): AppJson<ModuleRef>,
) -> AppResult<StatusCode> {
    enrolment::unenroll(&db_pool, user_id, &module_code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Status code for the module, `3` when not enrolled.
#[debug_handler(state = AppState)]
pub(crate) async fn module_status(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppPath(module_code): AppPath<String>,
) -> AppResult<Json<StatusBody>> {
    let status = enrolment::get_status(&db_pool, user_id, &module_code).await?;
    Ok(Json(StatusBody { status }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn set_module_status(
    State(db_pool): State<SqlitePool>,
    CurrentUser(user_id): CurrentUser,
    AppPath(module_code): AppPath<String>,
    AppJson(StatusBody { status }): AppJson<StatusBody>,
) -> AppResult<Json<StatusBody>> {
    let enrolment = enrolment::set_status(&db_pool, user_id, &module_code, status).await?;
    Ok(Json(StatusBody { status: enrolment.status.code() }))
}
