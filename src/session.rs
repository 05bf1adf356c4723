use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{identity, AppError, AppResult};

pub const USER_ID: &str = "user_id";

/// The signed-in user's id, read from the session.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| anyhow::anyhow!(msg))?;
        match session.get::<i64>(USER_ID).await? {
            Some(user_id) => Ok(CurrentUser(user_id)),
            None => Err(AppError::Unauthenticated("authentication required".into())),
        }
    }
}

/// A signed-in user with the staff flag.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub i64);

impl<S> FromRequestParts<S> for AdminUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user_id) = CurrentUser::from_request_parts(parts, state).await?;
        let db_pool = SqlitePool::from_ref(state);
        let user = identity::find_user(&db_pool, user_id)
            .await
            .map_err(|_| AppError::Unauthenticated("session user no longer exists".into()))?;
        if !user.is_staff {
            return Err(AppError::Forbidden("staff only".into()));
        }
        Ok(AdminUser(user.id))
    }
}

/// Binds the session to `user_id` under a fresh session id.
pub async fn sign_in(session: &Session, user_id: i64) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(USER_ID, user_id).await?;
    Ok(())
}
