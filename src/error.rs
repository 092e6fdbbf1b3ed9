//! Error taxonomy shared by every engine operation
use std::fmt;

use crate::auth::Role;
use crate::store::RecordKind;

/// Failures of the backing record store. Always surfaced as
/// [`WorkflowError::Internal`] at the engine boundary.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode {kind} record: {message}")]
    Encode { kind: RecordKind, message: String },
    #[error("failed to decode {kind} record: {source}")]
    Decode {
        kind: RecordKind,
        #[source]
        source: minicbor::decode::Error,
    },
    #[error("gave up writing {kind} '{key}' after repeated concurrent writes")]
    Contention { kind: RecordKind, key: String },
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("forbidden: only the {role} may perform this action")]
    Forbidden { role: Role },
    #[error("conflict: {0}")]
    Conflict(Conflict),
    #[error("internal error: {0}")]
    Internal(#[from] StoreError),
}

/// Why a write was refused against the current stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The request already left `pending`; carries the status it reached.
    AlreadyDecided { status: &'static str },
    DuplicateTransaction { tx_hash: String },
    DuplicatePendingRequest { id: String },
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::AlreadyDecided { status } => write!(f, "already {status}"),
            Conflict::DuplicateTransaction { tx_hash } => {
                write!(f, "transaction {tx_hash} already recorded")
            }
            Conflict::DuplicatePendingRequest { id } => {
                write!(f, "a pending request already exists ({id})")
            }
            Conflict::IllegalTransition { from, to } => {
                write!(f, "cannot move from {from} to {to}")
            }
        }
    }
}

impl WorkflowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        WorkflowError::InvalidArgument(message.into())
    }

    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable code for the boundary layer to map onto status codes.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidArgument(_) => "invalid_argument",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Forbidden { .. } => "forbidden",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Internal(_) => "internal",
        }
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            WorkflowError::Conflict(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_decided_names_the_status() {
        let err = WorkflowError::Conflict(Conflict::AlreadyDecided { status: "rejected" });
        assert_eq!(err.to_string(), "conflict: already rejected");
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn not_found_names_the_record_kind() {
        let err = WorkflowError::not_found(RecordKind::Transaction, "0xdead");
        assert_eq!(err.to_string(), "transaction '0xdead' not found");
    }
}
