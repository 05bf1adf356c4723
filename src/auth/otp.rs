use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::{
    config::Settings,
    extract::AppJson,
    identity::{self, IdentityError},
    mailer::Mailer,
    AppResult, AppState,
};

#[derive(Deserialize)]
pub(crate) struct SendOtpRequest {
    nus_email: String,
}

#[derive(Deserialize)]
pub(crate) struct VerifyOtpRequest {
    nus_email: String,
    otp: String,
}

#[derive(Serialize)]
pub(crate) struct Verified {
    verified: bool,
}

/// Always answers the same way for unknown, verified and unverified
/// addresses, including during the resend cooldown; only an unverified
/// address outside the cooldown gets mail.
#[debug_handler(state = AppState)]
pub(crate) async fn send_otp(
    State(db_pool): State<SqlitePool>,
    State(settings): State<Arc<Settings>>,
    State(mailer): State<Arc<dyn Mailer>>,
    AppJson(SendOtpRequest { nus_email }): AppJson<SendOtpRequest>,
) -> AppResult<Json<Value>> {
    let code = identity::generate_code();
    let sent = identity::send_code(
        &db_pool,
        mailer.as_ref(),
        &nus_email,
        &code,
        OffsetDateTime::now_utc(),
        settings.otp_cooldown_secs,
    )
    .await;
    match sent {
        Ok(_) => {}
        // answered like an unknown address
        Err(IdentityError::Cooldown { retry_after }) => {
            tracing::debug!(retry_after, "otp resend inside cooldown, nothing sent");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(Json(json!({})))
}

#[debug_handler(state = AppState)]
pub(crate) async fn verify_otp(
    State(db_pool): State<SqlitePool>,
    State(settings): State<Arc<Settings>>,
    AppJson(VerifyOtpRequest { nus_email, otp }): AppJson<VerifyOtpRequest>,
) -> AppResult<Json<Verified>> {
    identity::verify_code(&db_pool, &nus_email, &otp, OffsetDateTime::now_utc(), settings.otp_ttl_secs).await?;
    Ok(Json(Verified { verified: true }))
}
