use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::{
    config::Settings,
    extract::AppJson,
    identity::{self, NewUser},
    mailer::Mailer,
    AppResult, AppState,
};

#[derive(Serialize)]
pub(crate) struct Registered {
    id: i64,
    nus_email: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    State(settings): State<Arc<Settings>>,
    State(mailer): State<Arc<dyn Mailer>>,
    AppJson(new_user): AppJson<NewUser>,
) -> AppResult<(StatusCode, Json<Registered>)> {
    let now = OffsetDateTime::now_utc();
    let user = identity::register(&db_pool, &settings, new_user, now).await?;

    let code = identity::generate_code();
    if let Err(err) =
        identity::send_code(&db_pool, mailer.as_ref(), &user.nus_email, &code, now, settings.otp_cooldown_secs).await
    {
        // the account exists either way; /otp/send can retry
        tracing::warn!(user_id = user.id, error = %err, "could not send code after registration");
    }

    Ok((StatusCode::CREATED, Json(Registered { id: user.id, nus_email: user.nus_email })))
}
