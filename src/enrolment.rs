//! Who is enrolled where, and what they are looking for there.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::{
    catalog::{self, CatalogError},
    db::is_unique_violation,
    status::{EnrolmentStatus, UNENROLLED},
    AppError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enrolment {
    pub user_id: i64,
    pub module_code: String,
    pub status: EnrolmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrolledModule {
    pub module_code: String,
    pub title: String,
    pub status: i64,
}

#[derive(FromRow)]
struct EnrolledRow {
    module_code: String,
    title: String,
    status: String,
}

#[derive(Debug, Error)]
pub enum EnrolmentError {
    #[error("module {0} does not exist")]
    ModuleNotFound(String),

    #[error("already enrolled in {0}")]
    AlreadyEnrolled(String),

    #[error("not enrolled in {0}")]
    NotEnrolled(String),

    #[error("{0} is not a valid status code")]
    InvalidStatus(i64),

    #[error("stored status {0:?} is not recognised")]
    CorruptStatus(String),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CatalogError> for EnrolmentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ModuleNotFound(code) => Self::ModuleNotFound(code),
            CatalogError::Database(err) => Self::Database(err),
            other => Self::Catalog(other),
        }
    }
}

impl From<EnrolmentError> for AppError {
    fn from(err: EnrolmentError) -> Self {
        use EnrolmentError::*;
        match err {
            ModuleNotFound(_) => AppError::NotFound(err.to_string()),
            AlreadyEnrolled(_) => AppError::Conflict(err.to_string()),
            NotEnrolled(_) | InvalidStatus(_) => AppError::Validation(err.to_string()),
            CorruptStatus(_) | Catalog(_) | Database(_) => AppError::Internal(err.into()),
        }
    }
}

pub(crate) fn decode_status(stored: &str) -> Result<EnrolmentStatus, EnrolmentError> {
    EnrolmentStatus::from_stored(stored).ok_or_else(|| EnrolmentError::CorruptStatus(stored.to_owned()))
}

pub async fn enroll(db_pool: &SqlitePool, user_id: i64, module_code: &str) -> Result<Enrolment, EnrolmentError> {
    let module = catalog::find_module(db_pool, module_code).await?;
    let status = EnrolmentStatus::default();

    let inserted = sqlx::query("INSERT INTO enrolments (user_id,module_code,status) VALUES (?,?,?)")
        .bind(user_id)
        .bind(&module.module_code)
        .bind(status.stored())
        .execute(db_pool)
        .await;
    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(EnrolmentError::AlreadyEnrolled(module.module_code));
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(user_id, module = %module.module_code, "enrolled");
    Ok(Enrolment { user_id, module_code: module.module_code, status })
}

/// Removes the enrolment row. Connections made through the module stay.
pub async fn unenroll(db_pool: &SqlitePool, user_id: i64, module_code: &str) -> Result<(), EnrolmentError> {
    let module = catalog::find_module(db_pool, module_code).await?;
    let result = sqlx::query("DELETE FROM enrolments WHERE user_id=? AND module_code=?")
        .bind(user_id)
        .bind(&module.module_code)
        .execute(db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(EnrolmentError::NotEnrolled(module.module_code));
    }
    tracing::info!(user_id, module = %module.module_code, "unenrolled");
    Ok(())
}

pub async fn set_status(
    db_pool: &SqlitePool,
    user_id: i64,
    module_code: &str,
    status_code: i64,
) -> Result<Enrolment, EnrolmentError> {
    let status = EnrolmentStatus::from_code(status_code).ok_or(EnrolmentError::InvalidStatus(status_code))?;
    let module = catalog::find_module(db_pool, module_code).await?;

    let result = sqlx::query("UPDATE enrolments SET status=? WHERE user_id=? AND module_code=?")
        .bind(status.stored())
        .bind(user_id)
        .bind(&module.module_code)
        .execute(db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(EnrolmentError::NotEnrolled(module.module_code));
    }

    tracing::info!(user_id, module = %module.module_code, ?status, "status changed");
    Ok(Enrolment { user_id, module_code: module.module_code, status })
}

pub async fn find_status(
    db_pool: &SqlitePool,
    user_id: i64,
    module_code: &str,
) -> Result<Option<EnrolmentStatus>, EnrolmentError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM enrolments WHERE user_id=? AND module_code=?")
        .bind(user_id)
        .bind(module_code)
        .fetch_optional(db_pool)
        .await?;
    row.map(|(stored,)| decode_status(&stored)).transpose()
}

/// Status code of the enrolment, or [`UNENROLLED`] when there is none.
pub async fn get_status(db_pool: &SqlitePool, user_id: i64, module_code: &str) -> Result<i64, EnrolmentError> {
    let module = catalog::find_module(db_pool, module_code).await?;
    Ok(find_status(db_pool, user_id, &module.module_code)
        .await?
        .map_or(UNENROLLED, EnrolmentStatus::code))
}

pub async fn is_enrolled(db_pool: &SqlitePool, user_id: i64, module_code: &str) -> Result<bool, EnrolmentError> {
    Ok(find_status(db_pool, user_id, module_code).await?.is_some())
}

pub async fn list_enrolled_modules(db_pool: &SqlitePool, user_id: i64) -> Result<Vec<EnrolledModule>, EnrolmentError> {
    let rows = sqlx::query_as::<_, EnrolledRow>(
        "SELECT e.module_code,m.title,e.status FROM enrolments e
         JOIN modules m ON m.module_code=e.module_code
         WHERE e.user_id=? ORDER BY e.module_code",
    )
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(EnrolledModule {
                status: decode_status(&row.status)?.code(),
                module_code: row.module_code,
                title: row.title,
            })
        })
        .collect()
}
