mod login;
mod logout;
mod otp;
mod register;
mod token;

use axum::{routing::post, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/otp/send", post(otp::send_otp))
        .route("/otp/verify", post(otp::verify_otp))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/token/refresh", post(token::refresh))
        .route("/token/verify", post(token::verify))
}
