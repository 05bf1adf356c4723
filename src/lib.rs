pub mod appresult;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod connections;
pub mod db;
pub mod enrolment;
pub mod extract;
pub mod identity;
pub mod logging;
pub mod mailer;
pub mod modules;
pub mod pagination;
pub mod password;
pub mod peers;
pub mod session;
pub mod status;
pub mod user;
pub mod views;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};

use catalog::CatalogClient;
use config::Settings;
use mailer::{LogMailer, Mailer, WebhookMailer};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub settings: Arc<Settings>,
    pub mailer: Arc<dyn Mailer>,
    pub catalog: CatalogClient,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, settings: Settings) -> Self {
        let mailer: Arc<dyn Mailer> = match &settings.mail_webhook_url {
            Some(url) => Arc::new(WebhookMailer::new(url.clone())),
            None => {
                tracing::warn!("MAIL_WEBHOOK_URL not set, one-time codes will only be logged");
                Arc::new(LogMailer)
            }
        };
        Self::with_mailer(db_pool, settings, mailer)
    }

    pub fn with_mailer(db_pool: SqlitePool, settings: Settings, mailer: Arc<dyn Mailer>) -> Self {
        AppState {
            db_pool,
            catalog: CatalogClient::new(settings.catalog_api_base.clone()),
            settings: Arc::new(settings),
            mailer,
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(app_state.settings.session_secure)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            app_state.settings.session_idle_minutes,
        )));

    Router::new()
        .merge(auth::router())
        .nest("/modules", modules::router())
        .nest("/user", user::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
}
