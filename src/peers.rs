//! Peer listing for a module: who else is enrolled, filtered, paginated and
//! annotated relative to the viewer.

use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;

use crate::{
    catalog::{self, CatalogError},
    connections::{self, ConnectionError},
    enrolment::{decode_status, EnrolmentError},
    identity::User,
    pagination::{paginate, Listing, Page, PageError},
    status::{connection_code, ConnectionFilter, ConnectionStatus, EnrolmentStatus},
    views::{peer_view, relationship, PeerView},
    AppError,
};

pub const PAGE_SIZE: i64 = 10;

/// Query string as received; every value is validated by [`PeerQuery::parse`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPeerQuery {
    pub name: Option<String>,
    pub user_status: Option<String>,
    pub connection_status: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerQuery {
    pub name: Option<String>,
    pub user_status: Option<EnrolmentStatus>,
    pub connection_status: Option<ConnectionFilter>,
    pub page: Option<i64>,
}

impl PeerQuery {
    pub fn parse(raw: RawPeerQuery) -> Result<Self, PeerQueryError> {
        fn int(field: &'static str, value: &str) -> Result<i64, PeerQueryError> {
            value
                .trim()
                .parse()
                .map_err(|_| PeerQueryError::InvalidFilterValue { field, value: value.to_owned() })
        }
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let user_status = present(raw.user_status)
            .map(|value| {
                EnrolmentStatus::from_code(int("user_status", &value)?)
                    .ok_or(PeerQueryError::InvalidFilterValue { field: "user_status", value })
            })
            .transpose()?;
        let connection_status = present(raw.connection_status)
            .map(|value| {
                ConnectionFilter::from_code(int("connection_status", &value)?)
                    .ok_or(PeerQueryError::InvalidFilterValue { field: "connection_status", value })
            })
            .transpose()?;
        let page = present(raw.page).map(|value| int("page", &value)).transpose()?;

        Ok(PeerQuery { name: present(raw.name), user_status, connection_status, page })
    }
}

#[derive(Debug, Error)]
pub enum PeerQueryError {
    #[error("module {0} does not exist")]
    ModuleNotFound(String),

    #[error("{value:?} is not a valid {field}")]
    InvalidFilterValue { field: &'static str, value: String },

    #[error(transparent)]
    Paging(#[from] PageError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Enrolment(#[from] EnrolmentError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CatalogError> for PeerQueryError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ModuleNotFound(code) => Self::ModuleNotFound(code),
            other => Self::Catalog(other),
        }
    }
}

impl From<PeerQueryError> for AppError {
    fn from(err: PeerQueryError) -> Self {
        use PeerQueryError::*;
        match err {
            ModuleNotFound(_) | Paging(PageError::OutOfRange(_)) => AppError::NotFound(err.to_string()),
            InvalidFilterValue { .. } | Paging(PageError::InvalidPage) => AppError::Validation(err.to_string()),
            Connection(inner) => inner.into(),
            Enrolment(inner) => inner.into(),
            Catalog(inner) => inner.into(),
            Database(inner) => AppError::Internal(inner.into()),
        }
    }
}

/// An enrolled user together with their status in the module being listed.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user: User,
    pub status: EnrolmentStatus,
}

#[derive(FromRow)]
struct CandidateRow {
    #[sqlx(flatten)]
    user: User,
    enrolment_status: String,
}

pub fn filter_by_name(candidates: Vec<Candidate>, needle: Option<&str>) -> Vec<Candidate> {
    let Some(needle) = needle.map(|n| n.trim().to_lowercase()).filter(|n| !n.is_empty()) else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|c| {
            [&c.user.name, &c.user.first_name, &c.user.last_name]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn filter_by_user_status(candidates: Vec<Candidate>, status: Option<EnrolmentStatus>) -> Vec<Candidate> {
    match status {
        Some(status) => candidates.into_iter().filter(|c| c.status == status).collect(),
        None => candidates,
    }
}

pub fn filter_by_connection_status(
    candidates: Vec<Candidate>,
    filter: Option<ConnectionFilter>,
    connections: &HashMap<i64, ConnectionStatus>,
) -> Vec<Candidate> {
    match filter {
        Some(filter) => candidates
            .into_iter()
            .filter(|c| filter.matches(connections.get(&c.user.id).copied()))
            .collect(),
        None => candidates,
    }
}

/// Users who said they are not looking are never listed, whatever the
/// explicit filters asked for.
pub fn exclude_not_looking(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.into_iter().filter(|c| c.status != EnrolmentStatus::NotLooking).collect()
}

fn dedupe_by_user(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.user.id);
    candidates.dedup_by_key(|c| c.user.id);
    candidates
}

/// Explicit filters in a fixed order, then the not-looking policy, then
/// dedupe and order by user id.
pub fn select_peers(
    candidates: Vec<Candidate>,
    query: &PeerQuery,
    connections: &HashMap<i64, ConnectionStatus>,
) -> Vec<Candidate> {
    let candidates = filter_by_name(candidates, query.name.as_deref());
    let candidates = filter_by_user_status(candidates, query.user_status);
    let candidates = filter_by_connection_status(candidates, query.connection_status, connections);
    dedupe_by_user(exclude_not_looking(candidates))
}

async fn load_candidates(
    db_pool: &SqlitePool,
    module_code: &str,
    requester_id: i64,
) -> Result<Vec<Candidate>, PeerQueryError> {
    let rows = sqlx::query_as::<_, CandidateRow>(
        "SELECT u.id,u.nus_email,u.password_hash,u.is_verified,u.is_staff,u.name,u.first_name,u.last_name,
                u.year,u.major,u.bio,u.telegram_id,u.phone_number,u.profile_picture,u.created_at,
                e.status AS enrolment_status
         FROM enrolments e JOIN users u ON u.id=e.user_id
         WHERE e.module_code=? AND e.user_id<>?",
    )
    .bind(module_code)
    .bind(requester_id)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|row| Ok(Candidate { status: decode_status(&row.enrolment_status)?, user: row.user }))
        .collect()
}

pub async fn list_module_peers(
    db_pool: &SqlitePool,
    requester_id: i64,
    module_code: &str,
    query: &PeerQuery,
) -> Result<Listing<PeerView>, PeerQueryError> {
    let module = catalog::find_module(db_pool, module_code).await?;
    let candidates = load_candidates(db_pool, &module.module_code, requester_id).await?;
    let in_module = connections::statuses_in_module(db_pool, requester_id, &module.module_code).await?;

    let selected = select_peers(candidates, query, &in_module);
    let accepted = connections::accepted_with(db_pool, requester_id).await?;
    let to_view = |c: Candidate| {
        peer_view(
            &c.user,
            relationship(requester_id, c.user.id, &accepted),
            c.status.code(),
            connection_code(in_module.get(&c.user.id).copied()),
        )
    };

    tracing::debug!(requester_id, module = %module.module_code, matched = selected.len(), "listing peers");
    Ok(match query.page {
        None => Listing::All(selected.into_iter().map(to_view).collect()),
        Some(page) => {
            let page = paginate(selected, page, PAGE_SIZE)?;
            Listing::Paged(Page {
                count: page.count,
                page: page.page,
                next: page.next,
                previous: page.previous,
                results: page.results.into_iter().map(to_view).collect(),
            })
        }
    })
}
