#![allow(dead_code)]

use std::{collections::HashMap, sync::{Arc, Mutex}};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use modmatch::{
    app, catalog, config::Settings, db, enrolment, identity::{self, NewUser, User}, mailer::Mailer, AppState,
};
use serde_json::Value;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse";

pub fn settings() -> Settings {
    let vars = HashMap::from([
        ("DATABASE_URL", "sqlite::memory:"),
        ("ADMIN_EMAILS", "admin@nus.edu"),
        ("OTP_COOLDOWN_SECS", "60"),
        ("OTP_TTL_SECS", "300"),
    ]);
    Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub async fn pool() -> SqlitePool {
    db::connect_in_memory().await.unwrap()
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Keeps every code it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent.lock().unwrap().iter().rev().find(|(email, _)| email == to).map(|(_, code)| code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((to.to_owned(), code.to_owned()));
        Ok(())
    }
}

pub async fn seed_module(db_pool: &SqlitePool, code: &str, title: &str) {
    catalog::upsert_module(db_pool, code, title).await.unwrap();
}

/// A verified user registered straight through the store.
pub async fn seed_user(db_pool: &SqlitePool, local: &str, name: &str) -> User {
    let new_user = NewUser {
        nus_email: format!("{local}@nus.edu"),
        password: PASSWORD.to_owned(),
        name: name.to_owned(),
        year: 2,
        major: "CS".to_owned(),
    };
    let user = identity::register(db_pool, &settings(), new_user, now()).await.unwrap();
    sqlx::query("UPDATE users SET is_verified=1, telegram_id=? WHERE id=?")
        .bind(format!("@{local}"))
        .bind(user.id)
        .execute(db_pool)
        .await
        .unwrap();
    identity::find_user(db_pool, user.id).await.unwrap()
}

pub async fn seed_enrolled(db_pool: &SqlitePool, local: &str, name: &str, module: &str, status: i64) -> User {
    let user = seed_user(db_pool, local, name).await;
    enrolment::enroll(db_pool, user.id, module).await.unwrap();
    enrolment::set_status(db_pool, user.id, module, status).await.unwrap();
    user
}

/// Drives the router in-process, carrying the session cookie between calls.
pub struct TestApp {
    pub router: Router,
    pub db_pool: SqlitePool,
    pub mailer: Arc<RecordingMailer>,
    cookie: Option<String>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_pool = pool().await;
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::with_mailer(db_pool.clone(), settings(), mailer.clone());
        TestApp { router: app(state), db_pool, mailer, cookie: None }
    }

    pub fn sign_out_locally(&mut self) {
        self.cookie = None;
    }

    pub async fn request(&mut self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_owned();
            self.cookie = Some(pair);
        }

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        (status, json)
    }

    /// Registers, verifies with the mailed code and signs in.
    pub async fn sign_up(&mut self, local: &str, name: &str) -> i64 {
        let email = format!("{local}@nus.edu");
        let (status, _) = self
            .request(
                Method::POST,
                "/register",
                Some(serde_json::json!({ "nus_email": email, "password": PASSWORD, "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let otp = self.mailer.last_code_for(&email).unwrap();
        let (status, _) = self
            .request(Method::POST, "/otp/verify", Some(serde_json::json!({ "nus_email": email, "otp": otp })))
            .await;
        assert_eq!(status, StatusCode::OK);

        self.sign_in(local).await
    }

    pub async fn sign_in(&mut self, local: &str) -> i64 {
        let (status, body) = self
            .request(
                Method::POST,
                "/login",
                Some(serde_json::json!({ "nus_email": format!("{local}@nus.edu"), "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["user_id"].as_i64().unwrap()
    }
}
