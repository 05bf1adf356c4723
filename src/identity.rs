//! Users, their verification state and one-time codes.

use rand::Rng;
use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    config::Settings,
    db::{begin_write, is_unique_violation},
    mailer::Mailer,
    password, AppError,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub nus_email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub is_staff: bool,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub year: i64,
    pub major: String,
    pub bio: String,
    pub telegram_id: String,
    pub phone_number: String,
    pub profile_picture: Option<String>,
    pub created_at: i64,
}

const USER_COLUMNS: &str = "id,nus_email,password_hash,is_verified,is_staff,name,first_name,last_name,\
    year,major,bio,telegram_id,phone_number,profile_picture,created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub nus_email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "first_year")]
    pub year: i64,
    #[serde(default)]
    pub major: String,
}

fn first_year() -> i64 {
    1
}

/// Fields a user may change on their own profile. `None` leaves the field
/// alone; an empty `profile_picture` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub year: Option<i64>,
    pub major: Option<String>,
    pub bio: Option<String>,
    pub telegram_id: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
}

impl ProfilePatch {
    fn validate(&self) -> Result<(), IdentityError> {
        let limits = [
            ("name", &self.name, 50),
            ("first_name", &self.first_name, 150),
            ("last_name", &self.last_name, 150),
            ("major", &self.major, 20),
            ("telegram_id", &self.telegram_id, 20),
            ("phone_number", &self.phone_number, 20),
        ];
        for (field, value, max) in limits {
            if value.as_ref().is_some_and(|v| v.chars().count() > max) {
                return Err(IdentityError::InvalidProfile(format!("{field} is longer than {max} characters")));
            }
        }
        if self.year.is_some_and(|year| !(1..=10).contains(&year)) {
            return Err(IdentityError::InvalidProfile("year must be between 1 and 10".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("{0:?} is not an institutional email address")]
    InvalidEmail(String),

    #[error("password must be at least 8 characters")]
    WeakPassword,

    #[error("email is already in use")]
    EmailTaken,

    #[error("the email is not registered")]
    NotRegistered,

    #[error("user {0} does not exist")]
    UserNotFound(i64),

    #[error("password is invalid")]
    InvalidPassword,

    #[error("email is not verified")]
    NotVerified,

    #[error("wrong OTP")]
    WrongCode,

    #[error("OTP has expired")]
    CodeExpired,

    #[error("a code was sent recently, retry in {retry_after} seconds")]
    Cooldown { retry_after: i64 },

    #[error("{0}")]
    InvalidProfile(String),

    #[error("could not deliver code: {0}")]
    Delivery(anyhow::Error),

    #[error("could not hash password: {0}")]
    Hashing(anyhow::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        use IdentityError::*;
        match err {
            InvalidEmail(_) | WeakPassword | WrongCode | CodeExpired | InvalidProfile(_) => {
                AppError::Validation(err.to_string())
            }
            EmailTaken => AppError::Conflict(err.to_string()),
            NotRegistered | UserNotFound(_) => AppError::NotFound(err.to_string()),
            InvalidPassword | NotVerified => AppError::Unauthenticated(err.to_string()),
            Cooldown { .. } => AppError::RateLimited(err.to_string()),
            Delivery(inner) => AppError::Internal(inner.context("otp delivery failed")),
            Hashing(inner) => AppError::Internal(inner),
            Database(inner) => AppError::Internal(inner.into()),
        }
    }
}

/// Trims, lowercases the domain, and checks it belongs to the institution
/// (`domain` itself or any subdomain of it).
pub fn normalize_email(raw: &str, domain: &str) -> Result<String, IdentityError> {
    let raw = raw.trim();
    let invalid = || IdentityError::InvalidEmail(raw.to_owned());
    let (local, host) = raw.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty() || local.contains(char::is_whitespace) {
        return Err(invalid());
    }

    let host = host.to_lowercase();
    let domain = domain.to_lowercase();
    if host != domain && !host.ends_with(&format!(".{domain}")) {
        return Err(invalid());
    }
    Ok(format!("{local}@{host}"))
}

pub fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

pub async fn register(
    db_pool: &SqlitePool,
    settings: &Settings,
    new_user: NewUser,
    now: OffsetDateTime,
) -> Result<User, IdentityError> {
    let nus_email = normalize_email(&new_user.nus_email, &settings.email_domain)?;
    if new_user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword);
    }
    ProfilePatch {
        name: Some(new_user.name.clone()),
        year: Some(new_user.year),
        major: Some(new_user.major.clone()),
        ..Default::default()
    }
    .validate()?;

    if find_by_email(db_pool, &nus_email).await?.is_some() {
        return Err(IdentityError::EmailTaken);
    }

    let is_staff = settings.is_admin_email(&nus_email);
    let password_hash = password::hash_password(&new_user.password).map_err(IdentityError::Hashing)?;
    let inserted = sqlx::query(
        "INSERT INTO users (nus_email,password_hash,is_staff,name,year,major,created_at) VALUES (?,?,?,?,?,?,?)",
    )
    .bind(&nus_email)
    .bind(password_hash)
    .bind(is_staff)
    .bind(new_user.name.trim())
    .bind(new_user.year)
    .bind(new_user.major.trim())
    .bind(now.unix_timestamp())
    .execute(db_pool)
    .await;

    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(IdentityError::EmailTaken),
        Err(err) => return Err(err.into()),
    };
    tracing::info!(user_id = id, is_staff, "registered user");
    find_user(db_pool, id).await
}

pub async fn find_user(db_pool: &SqlitePool, id: i64) -> Result<User, IdentityError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id=?"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(IdentityError::UserNotFound(id))
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> Result<Option<User>, IdentityError> {
    Ok(
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE nus_email=?"))
            .bind(email.trim())
            .fetch_optional(db_pool)
            .await?,
    )
}

pub async fn authenticate(db_pool: &SqlitePool, email: &str, password: &str) -> Result<User, IdentityError> {
    let user = find_by_email(db_pool, email).await?.ok_or(IdentityError::NotRegistered)?;
    if !password::verify_password(password, &user.password_hash) {
        return Err(IdentityError::InvalidPassword);
    }
    if !user.is_verified {
        return Err(IdentityError::NotVerified);
    }
    Ok(user)
}

/// Stores `code` for the user unless the previous code is younger than the
/// cooldown. The check and the write are one statement.
pub async fn issue_code(
    db_pool: &SqlitePool,
    user_id: i64,
    code: &str,
    now: OffsetDateTime,
    cooldown_secs: i64,
) -> Result<(), IdentityError> {
    let now = now.unix_timestamp();
    let result = sqlx::query(
        "INSERT INTO otp_codes (user_id,code,created_at) VALUES (?,?,?)
         ON CONFLICT(user_id) DO UPDATE SET code=excluded.code, created_at=excluded.created_at
         WHERE otp_codes.created_at <= ?",
    )
    .bind(user_id)
    .bind(code)
    .bind(now)
    .bind(now - cooldown_secs)
    .execute(db_pool)
    .await?;

    if result.rows_affected() == 0 {
        let (created_at,): (i64,) = sqlx::query_as("SELECT created_at FROM otp_codes WHERE user_id=?")
            .bind(user_id)
            .fetch_one(db_pool)
            .await?;
        return Err(IdentityError::Cooldown { retry_after: (created_at + cooldown_secs - now).max(1) });
    }
    Ok(())
}

/// Issues and mails a fresh code. Unknown and already-verified addresses
/// succeed without doing anything so the endpoint does not reveal which
/// accounts exist. Returns whether a code went out.
pub async fn send_code(
    db_pool: &SqlitePool,
    mailer: &dyn Mailer,
    email: &str,
    code: &str,
    now: OffsetDateTime,
    cooldown_secs: i64,
) -> Result<bool, IdentityError> {
    let Some(user) = find_by_email(db_pool, email).await? else {
        tracing::debug!("otp requested for unknown email");
        return Ok(false);
    };
    if user.is_verified {
        tracing::debug!(user_id = user.id, "otp requested for verified user");
        return Ok(false);
    }

    issue_code(db_pool, user.id, code, now, cooldown_secs).await?;
    if let Err(err) = mailer.send_code(&user.nus_email, code).await {
        // let the user retry immediately instead of waiting out the cooldown
        sqlx::query("DELETE FROM otp_codes WHERE user_id=? AND code=?")
            .bind(user.id)
            .bind(code)
            .execute(db_pool)
            .await?;
        return Err(IdentityError::Delivery(err));
    }
    tracing::info!(user_id = user.id, "otp issued");
    Ok(true)
}

/// Consumes a code. On success the user is verified and the code is gone,
/// so replaying it fails with `WrongCode`.
pub async fn verify_code(
    db_pool: &SqlitePool,
    email: &str,
    code: &str,
    now: OffsetDateTime,
    ttl_secs: i64,
) -> Result<User, IdentityError> {
    let user = find_by_email(db_pool, email).await?.ok_or(IdentityError::NotRegistered)?;

    let mut tx = begin_write(db_pool).await?;
    let stored: Option<(String, i64)> = sqlx::query_as("SELECT code,created_at FROM otp_codes WHERE user_id=?")
        .bind(user.id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some((stored_code, created_at)) = stored else {
        return Err(IdentityError::WrongCode);
    };
    if stored_code != code.trim() {
        return Err(IdentityError::WrongCode);
    }

    sqlx::query("DELETE FROM otp_codes WHERE user_id=?")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    if created_at + ttl_secs < now.unix_timestamp() {
        tx.commit().await?;
        return Err(IdentityError::CodeExpired);
    }
    sqlx::query("UPDATE users SET is_verified=1 WHERE id=?")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "user verified");
    find_user(db_pool, user.id).await
}

pub async fn update_profile(db_pool: &SqlitePool, id: i64, patch: ProfilePatch) -> Result<User, IdentityError> {
    patch.validate()?;
    let trimmed = |field: &Option<String>| field.as_deref().map(str::trim).map(str::to_owned);

    let result = sqlx::query(
        "UPDATE users SET
            name=COALESCE(?,name),
            first_name=COALESCE(?,first_name),
            last_name=COALESCE(?,last_name),
            year=COALESCE(?,year),
            major=COALESCE(?,major),
            bio=COALESCE(?,bio),
            telegram_id=COALESCE(?,telegram_id),
            phone_number=COALESCE(?,phone_number),
            profile_picture=CASE WHEN ? IS NULL THEN profile_picture ELSE NULLIF(?,'') END
         WHERE id=?",
    )
    .bind(trimmed(&patch.name))
    .bind(trimmed(&patch.first_name))
    .bind(trimmed(&patch.last_name))
    .bind(patch.year)
    .bind(trimmed(&patch.major))
    .bind(patch.bio.as_deref())
    .bind(trimmed(&patch.telegram_id))
    .bind(trimmed(&patch.phone_number))
    .bind(trimmed(&patch.profile_picture))
    .bind(trimmed(&patch.profile_picture))
    .bind(id)
    .execute(db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(IdentityError::UserNotFound(id));
    }
    find_user(db_pool, id).await
}
