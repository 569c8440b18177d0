// ❗ Ledger Errors - Domain error taxonomy
// Every variant is caller input that cannot be retried; the ledger is left unchanged.

use thiserror::Error;

/// Result type used by the ledger and the settlement engine.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount was non-positive, non-finite, unparsable or out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("an expense needs at least one participant")]
    EmptyParticipantSet,

    /// Participant removal blocked by expenses that still reference them.
    #[error("cannot remove {participant}: they are involved in {expense_count} expense(s)")]
    ReferentialIntegrity {
        participant: String,
        expense_count: usize,
    },

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// Persisted state that does not satisfy the ledger invariants.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl LedgerError {
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn unknown_participant(name: impl Into<String>) -> Self {
        Self::UnknownParticipant(name.into())
    }

    pub fn invalid_snapshot(msg: impl Into<String>) -> Self {
        Self::InvalidSnapshot(msg.into())
    }

    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Errors the caller should show to the user and re-prompt for.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, LedgerError::InvalidSnapshot(_))
    }
}
