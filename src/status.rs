//! Matching and connection statuses.
//!
//! Both are stored as two-letter codes and exposed to clients as small
//! integers. Decoding happens at the boundary; everything past it carries
//! the enum.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer returned by `get_status` when the user has no enrolment row.
pub const UNENROLLED: i64 = 3;

/// Integer used for "no connection" in peer listings and filters.
pub const NO_CONNECTION: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrolmentStatus {
    #[default]
    Looking,
    Willing,
    NotLooking,
}

impl EnrolmentStatus {
    pub const ALL: [EnrolmentStatus; 3] = [Self::Looking, Self::Willing, Self::NotLooking];

    pub fn code(self) -> i64 {
        use EnrolmentStatus::*;
        match self {
            Looking => 0,
            Willing => 1,
            NotLooking => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn stored(self) -> &'static str {
        use EnrolmentStatus::*;
        match self {
            Looking => "LF",
            Willing => "WH",
            NotLooking => "NL",
        }
    }

    pub fn from_stored(stored: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.stored() == stored)
    }

    pub fn label(self) -> &'static str {
        use EnrolmentStatus::*;
        match self {
            Looking => "Looking for a friend",
            Willing => "Willing to help",
            NotLooking => "Not looking",
        }
    }
}

impl fmt::Display for EnrolmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[serde(alias = "PD")]
    Pending,
    #[serde(alias = "AC")]
    Accepted,
    #[serde(alias = "RJ")]
    Rejected,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 3] = [Self::Pending, Self::Accepted, Self::Rejected];

    pub fn code(self) -> i64 {
        use ConnectionStatus::*;
        match self {
            Pending => 1,
            Accepted => 2,
            Rejected => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn stored(self) -> &'static str {
        use ConnectionStatus::*;
        match self {
            Pending => "PD",
            Accepted => "AC",
            Rejected => "RJ",
        }
    }

    pub fn from_stored(stored: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.stored() == stored)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Connection-status filter as clients send it: 0 none, 1 pending, 2 accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFilter {
    None,
    Pending,
    Accepted,
}

impl ConnectionFilter {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            NO_CONNECTION => Some(Self::None),
            1 => Some(Self::Pending),
            2 => Some(Self::Accepted),
            _ => None,
        }
    }

    pub fn matches(self, status: Option<ConnectionStatus>) -> bool {
        matches!(
            (self, status),
            (Self::None, None)
                | (Self::Pending, Some(ConnectionStatus::Pending))
                | (Self::Accepted, Some(ConnectionStatus::Accepted))
        )
    }
}

/// Integer exposed as `connection_status` for an optional live connection.
pub fn connection_code(status: Option<ConnectionStatus>) -> i64 {
    status.map_or(NO_CONNECTION, ConnectionStatus::code)
}
