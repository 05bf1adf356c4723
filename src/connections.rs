//! Peer connections. A connection is requested by one user, accepted only by
//! the other, and rejected by deleting it, so the pair may try again later.
//!
//! Connections are scoped to a module: the same two users may hold one live
//! connection per module they share.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    catalog::{self, CatalogError, Module},
    db::{begin_write, is_unique_violation},
    enrolment::{self, EnrolmentError},
    identity::{self, IdentityError, User},
    status::ConnectionStatus,
    AppError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub id: i64,
    pub requester_id: i64,
    pub accepter_id: i64,
    pub module_code: String,
    pub status: ConnectionStatus,
    pub created_at: i64,
}

impl Connection {
    pub fn involves(&self, user_id: i64) -> bool {
        self.requester_id == user_id || self.accepter_id == user_id
    }

    pub fn counterpart_of(&self, user_id: i64) -> i64 {
        if self.requester_id == user_id { self.accepter_id } else { self.requester_id }
    }
}

#[derive(FromRow)]
struct ConnectionRow {
    id: i64,
    requester_id: i64,
    accepter_id: i64,
    module_code: String,
    status: String,
    created_at: i64,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = ConnectionError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        let status = ConnectionStatus::from_stored(&row.status)
            .filter(|s| *s != ConnectionStatus::Rejected)
            .ok_or_else(|| ConnectionError::CorruptStatus(row.status.clone()))?;
        Ok(Connection {
            id: row.id,
            requester_id: row.requester_id,
            accepter_id: row.accepter_id,
            module_code: row.module_code,
            status,
            created_at: row.created_at,
        })
    }
}

const CONNECTION_COLUMNS: &str = "id,requester_id,accepter_id,module_code,status,created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pending requests the user sent.
    Outgoing,
    /// Pending requests waiting on the user.
    Incoming,
    /// Accepted connections on either side.
    Accepted,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionFilters {
    pub role: Option<Role>,
    /// Substring of the module code or title.
    pub module: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone)]
pub struct ConnectionListing {
    pub connection: Connection,
    pub module: Module,
    pub counterpart: User,
    pub direction: Direction,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot connect with yourself")]
    SelfConnection,

    #[error("user {0} does not exist")]
    UserNotFound(i64),

    #[error("module {0} does not exist")]
    ModuleNotFound(String),

    #[error("user {user_id} is not enrolled in {module_code}")]
    TargetNotEnrolled { user_id: i64, module_code: String },

    #[error("a connection with this user already exists in {0}")]
    AlreadyConnected(String),

    #[error("connection {0} does not exist")]
    NotFound(i64),

    #[error("not a participant of connection {0}")]
    NotParticipant(i64),

    #[error("only the receiving user can accept a connection")]
    SelfAccept,

    #[error("cannot move connection from {from} to {to}")]
    InvalidTransition { from: ConnectionStatus, to: ConnectionStatus },

    #[error("stored status {0:?} is not recognised")]
    CorruptStatus(String),

    #[error(transparent)]
    Identity(IdentityError),

    #[error(transparent)]
    Enrolment(EnrolmentError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CatalogError> for ConnectionError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ModuleNotFound(code) => Self::ModuleNotFound(code),
            other => Self::Catalog(other),
        }
    }
}

impl From<IdentityError> for ConnectionError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::UserNotFound(id) => Self::UserNotFound(id),
            other => Self::Identity(other),
        }
    }
}

impl From<EnrolmentError> for ConnectionError {
    fn from(err: EnrolmentError) -> Self {
        Self::Enrolment(err)
    }
}

impl From<ConnectionError> for AppError {
    fn from(err: ConnectionError) -> Self {
        use ConnectionError::*;
        match err {
            SelfConnection => AppError::Forbidden(err.to_string()),
            UserNotFound(_) | ModuleNotFound(_) | NotFound(_) => AppError::NotFound(err.to_string()),
            TargetNotEnrolled { .. } => AppError::Validation(err.to_string()),
            AlreadyConnected(_) | InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            NotParticipant(_) | SelfAccept => AppError::NotPermitted(err.to_string()),
            Identity(inner) => inner.into(),
            Enrolment(inner) => inner.into(),
            Catalog(inner) => inner.into(),
            CorruptStatus(_) | Database(_) => AppError::Internal(err.into()),
        }
    }
}

fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
    if a < b { (a, b) } else { (b, a) }
}

/// Opens a pending connection from `requester_id` to `accepter_id` in a
/// module the accepter is enrolled in.
pub async fn request(
    db_pool: &SqlitePool,
    requester_id: i64,
    accepter_id: i64,
    module_code: &str,
    now: OffsetDateTime,
) -> Result<Connection, ConnectionError> {
    if requester_id == accepter_id {
        return Err(ConnectionError::SelfConnection);
    }
    identity::find_user(db_pool, accepter_id).await?;
    let module = catalog::find_module(db_pool, module_code).await?;
    if !enrolment::is_enrolled(db_pool, accepter_id, &module.module_code).await? {
        return Err(ConnectionError::TargetNotEnrolled { user_id: accepter_id, module_code: module.module_code });
    }

    let (user_low, user_high) = ordered_pair(requester_id, accepter_id);
    let mut tx = begin_write(db_pool).await?;
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM connections WHERE user_low=? AND user_high=? AND module_code=?")
            .bind(user_low)
            .bind(user_high)
            .bind(&module.module_code)
            .fetch_optional(&mut *tx)
            .await?;
    if existing.is_some() {
        return Err(ConnectionError::AlreadyConnected(module.module_code));
    }

    let status = ConnectionStatus::Pending;
    let created_at = now.unix_timestamp();
    let inserted = sqlx::query(
        "INSERT INTO connections (requester_id,accepter_id,module_code,status,created_at,user_low,user_high)
         VALUES (?,?,?,?,?,?,?)",
    )
    .bind(requester_id)
    .bind(accepter_id)
    .bind(&module.module_code)
    .bind(status.stored())
    .bind(created_at)
    .bind(user_low)
    .bind(user_high)
    .execute(&mut *tx)
    .await;
    let id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Err(ConnectionError::AlreadyConnected(module.module_code)),
        Err(err) => return Err(err.into()),
    };
    tx.commit().await?;

    tracing::info!(connection_id = id, requester_id, accepter_id, module = %module.module_code, "connection requested");
    Ok(Connection { id, requester_id, accepter_id, module_code: module.module_code, status, created_at })
}

/// Applies `new_status` on behalf of `actor_id`. Returns the connection as it
/// now stands, or `None` once it has been rejected (deleted).
pub async fn respond(
    db_pool: &SqlitePool,
    connection_id: i64,
    actor_id: i64,
    new_status: ConnectionStatus,
) -> Result<Option<Connection>, ConnectionError> {
    let mut tx = begin_write(db_pool).await?;
    let row = sqlx::query_as::<_, ConnectionRow>(&format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id=?"))
        .bind(connection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ConnectionError::NotFound(connection_id))?;
    let mut connection = Connection::try_from(row)?;

    if !connection.involves(actor_id) {
        return Err(ConnectionError::NotParticipant(connection_id));
    }

    use ConnectionStatus::*;
    match (connection.status, new_status) {
        (_, Rejected) => {
            sqlx::query("DELETE FROM connections WHERE id=?")
                .bind(connection_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            tracing::info!(connection_id, actor_id, "connection rejected");
            return Ok(None);
        }
        (_, Accepted) if actor_id == connection.requester_id => return Err(ConnectionError::SelfAccept),
        (Pending, Accepted) => {
            sqlx::query("UPDATE connections SET status=? WHERE id=?")
                .bind(Accepted.stored())
                .bind(connection_id)
                .execute(&mut *tx)
                .await?;
            connection.status = Accepted;
            tracing::info!(connection_id, actor_id, "connection accepted");
        }
        (Accepted, Pending) => {
            return Err(ConnectionError::InvalidTransition { from: Accepted, to: Pending });
        }
        // re-applying the current status
        (Accepted, Accepted) | (Pending, Pending) => {}
        (Rejected, _) => return Err(ConnectionError::CorruptStatus(Rejected.stored().to_owned())),
    }
    tx.commit().await?;
    Ok(Some(connection))
}

pub async fn find_connection(db_pool: &SqlitePool, connection_id: i64) -> Result<Connection, ConnectionError> {
    sqlx::query_as::<_, ConnectionRow>(&format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id=?"))
        .bind(connection_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(ConnectionError::NotFound(connection_id))?
        .try_into()
}

async fn connections_of(db_pool: &SqlitePool, user_id: i64) -> Result<Vec<Connection>, ConnectionError> {
    sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections
         WHERE requester_id=? OR accepter_id=? ORDER BY created_at,id"
    ))
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db_pool)
    .await?
    .into_iter()
    .map(Connection::try_from)
    .collect()
}

fn role_matches(role: Option<Role>, connection: &Connection, user_id: i64) -> bool {
    match role {
        None => true,
        Some(Role::Outgoing) => connection.status == ConnectionStatus::Pending && connection.requester_id == user_id,
        Some(Role::Incoming) => connection.status == ConnectionStatus::Pending && connection.accepter_id == user_id,
        Some(Role::Accepted) => connection.status == ConnectionStatus::Accepted,
    }
}

fn module_matches(needle: Option<&str>, module: &Module) -> bool {
    let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    module.module_code.to_lowercase().contains(&needle) || module.title.to_lowercase().contains(&needle)
}

/// The user's live connections, oldest first, each paired with the other
/// participant.
pub async fn list_for_user(
    db_pool: &SqlitePool,
    user_id: i64,
    filters: &ConnectionFilters,
) -> Result<Vec<ConnectionListing>, ConnectionError> {
    let mut modules: HashMap<String, Module> = HashMap::new();
    let mut users: HashMap<i64, User> = HashMap::new();
    let mut listings = Vec::new();

    for connection in connections_of(db_pool, user_id).await? {
        if !role_matches(filters.role, &connection, user_id) {
            continue;
        }

        let module = match modules.get(&connection.module_code) {
            Some(module) => module.clone(),
            None => {
                let module = catalog::find_module(db_pool, &connection.module_code).await?;
                modules.insert(connection.module_code.clone(), module.clone());
                module
            }
        };
        if !module_matches(filters.module.as_deref(), &module) {
            continue;
        }

        let counterpart_id = connection.counterpart_of(user_id);
        let counterpart = match users.get(&counterpart_id) {
            Some(user) => user.clone(),
            None => {
                let user = identity::find_user(db_pool, counterpart_id).await?;
                users.insert(counterpart_id, user.clone());
                user
            }
        };

        let direction = if connection.requester_id == user_id { Direction::Outgoing } else { Direction::Incoming };
        listings.push(ConnectionListing { connection, module, counterpart, direction });
    }
    Ok(listings)
}

/// Live connection status between two users within one module.
pub async fn status_between(
    db_pool: &SqlitePool,
    a: i64,
    b: i64,
    module_code: &str,
) -> Result<Option<ConnectionStatus>, ConnectionError> {
    let (user_low, user_high) = ordered_pair(a, b);
    let row: Option<(String,)> =
        sqlx::query_as("SELECT status FROM connections WHERE user_low=? AND user_high=? AND module_code=?")
            .bind(user_low)
            .bind(user_high)
            .bind(module_code)
            .fetch_optional(db_pool)
            .await?;
    row.map(|(stored,)| ConnectionStatus::from_stored(&stored).ok_or(ConnectionError::CorruptStatus(stored)))
        .transpose()
}

/// Counterpart id → status for every live connection of `user_id` in one module.
pub async fn statuses_in_module(
    db_pool: &SqlitePool,
    user_id: i64,
    module_code: &str,
) -> Result<HashMap<i64, ConnectionStatus>, ConnectionError> {
    let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections
         WHERE (requester_id=? OR accepter_id=?) AND module_code=?"
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(module_code)
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let connection = Connection::try_from(row)?;
            Ok((connection.counterpart_of(user_id), connection.status))
        })
        .collect()
}

/// Everyone `user_id` has an accepted connection with, in any module.
pub async fn accepted_with(db_pool: &SqlitePool, user_id: i64) -> Result<HashSet<i64>, ConnectionError> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT requester_id,accepter_id FROM connections
         WHERE (requester_id=? OR accepter_id=?) AND status=?",
    )
    .bind(user_id)
    .bind(user_id)
    .bind(ConnectionStatus::Accepted.stored())
    .fetch_all(db_pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(requester, accepter)| if requester == user_id { accepter } else { requester })
        .collect())
}
