use crate::models::AttendeeId;
use thiserror::Error;

/// Failure talking to the meeting backend.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for HTTP 403: the caller should render a "not permitted" state
    /// rather than a generic failure.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// Replaces the message of a 403 with a friendlier one.
    pub fn with_forbidden_message(self, message: &str) -> Self {
        match self {
            ApiError::Status { status: 403, .. } => ApiError::Status {
                status: 403,
                message: message.to_string(),
            },
            other => other,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ApiError::Connection(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Value could not be stored in the cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Rejected locally before any network call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Select an option for every attendee ({} missing)", .0.len())]
    MissingVotes(Vec<AttendeeId>),
    #[error("Voting cannot be opened yet: quorum or registration start not reached")]
    QuorumNotReached,
    #[error("Voting is already open")]
    VotingAlreadyOpen,
    #[error("There is no current ballot")]
    NoCurrentBallot,
    #[error("Option {0} does not belong to the current ballot")]
    UnknownOption(i64),
    #[error("{0} ballot(s) are still open")]
    BallotsPending(usize),
}

#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl DeskError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, DeskError::Api(e) if e.is_forbidden())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
