//! Module catalog: lookup, search and the bulk import from the public
//! module list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::{
    pagination::{page_offset, Page, PageError},
    AppError, GetField,
};

pub const PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Module {
    pub module_code: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("module {0} does not exist")]
    ModuleNotFound(String),

    #[error(transparent)]
    Paging(#[from] PageError),

    #[error("academic year {0:?} should look like 2023-2024")]
    InvalidYear(String),

    #[error("catalog response was not a list of modules")]
    MalformedCatalog,

    #[error(transparent)]
    Upstream(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        use CatalogError::*;
        match err {
            ModuleNotFound(_) | Paging(PageError::OutOfRange(_)) => AppError::NotFound(err.to_string()),
            Paging(PageError::InvalidPage) | InvalidYear(_) => AppError::Validation(err.to_string()),
            MalformedCatalog | Upstream(_) | Database(_) => AppError::Internal(err.into()),
        }
    }
}

/// Case-insensitive exact match on the module code.
pub async fn find_module(db_pool: &SqlitePool, code: &str) -> Result<Module, CatalogError> {
    sqlx::query_as::<_, Module>("SELECT module_code,title FROM modules WHERE module_code=?")
        .bind(code.trim())
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| CatalogError::ModuleNotFound(code.trim().to_owned()))
}

pub async fn search_modules(
    db_pool: &SqlitePool,
    q: Option<&str>,
    page: i64,
) -> Result<Page<Module>, CatalogError> {
    let offset = page_offset(page, PAGE_SIZE)?;
    let pattern = format!("%{}%", escape_like(q.unwrap_or("").trim()));

    let (count,): (i64,) = sqlx::query_as(
        r"SELECT COUNT(*) FROM modules WHERE module_code LIKE ? ESCAPE '\' OR title LIKE ? ESCAPE '\'",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(db_pool)
    .await?;

    let results = sqlx::query_as::<_, Module>(
        r"SELECT module_code,title FROM modules
          WHERE module_code LIKE ? ESCAPE '\' OR title LIKE ? ESCAPE '\'
          ORDER BY module_code LIMIT ? OFFSET ?",
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(PAGE_SIZE)
    .bind(offset)
    .fetch_all(db_pool)
    .await?;

    if results.is_empty() && page > 1 {
        return Err(PageError::OutOfRange(page).into());
    }
    Ok(Page::new(count, page, PAGE_SIZE, results))
}

/// Insert-or-update keyed by module code. One statement, so each module is
/// its own atomic unit.
pub async fn upsert_module(db_pool: &SqlitePool, code: &str, title: &str) -> Result<(), CatalogError> {
    sqlx::query(
        "INSERT INTO modules (module_code,title) VALUES (?,?)
         ON CONFLICT(module_code) DO UPDATE SET title=excluded.title",
    )
    .bind(code.trim())
    .bind(title.trim())
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Upserts every well-formed entry of a module list and returns how many
/// were written. Entries without `moduleCode` or `title` are skipped.
pub async fn import_catalog(db_pool: &SqlitePool, entries: &[Value]) -> Result<usize, CatalogError> {
    let mut imported = 0;
    for entry in entries {
        let parsed = entry
            .get_str_field("moduleCode")
            .and_then(|code| Ok((code, entry.get_str_field("title")?)));
        let (code, title) = match parsed {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed catalog entry");
                continue;
            }
        };
        if code.trim().is_empty() {
            continue;
        }
        upsert_module(db_pool, &code, &title).await?;
        imported += 1;
    }
    tracing::info!(imported, skipped = entries.len() - imported, "catalog import finished");
    Ok(imported)
}

/// Fetches the public module list for one academic year.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn list_url(&self, year: &str) -> Result<String, CatalogError> {
        if !is_academic_year(year) {
            return Err(CatalogError::InvalidYear(year.to_owned()));
        }
        Ok(format!("{}/{year}/moduleList.json", self.base_url))
    }

    pub async fn fetch(&self, year: &str) -> Result<Vec<Value>, CatalogError> {
        let url = self.list_url(year)?;
        tracing::info!(%url, "fetching module catalog");
        let body: Value = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        match body {
            Value::Array(entries) => Ok(entries),
            _ => Err(CatalogError::MalformedCatalog),
        }
    }
}

fn is_academic_year(year: &str) -> bool {
    let Some((start, end)) = year.split_once('-') else {
        return false;
    };
    let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) else {
        return false;
    };
    year.len() == 9 && end == start + 1
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
