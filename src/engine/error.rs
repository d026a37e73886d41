use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Unknown property or reservation id.
    NotFound(Ulid),
    /// An existing pending/active reservation overlaps the requested stay.
    /// Carries the conflicting reservation's id.
    Conflict(Ulid),
    /// The actor lacks the rights for this operation. Never collapsed with
    /// validation failures.
    Unauthorized(Ulid),
    AlreadyEvaluated(Ulid),
    /// A lifecycle transition the table does not allow and that is not an
    /// idempotent re-application.
    InvalidTransition {
        from: ReservationStatus,
        action: &'static str,
    },
    /// A property cannot be delisted while reservations still hold dates.
    HasActiveReservations(Ulid),
    Validation(&'static str),
    LimitExceeded(&'static str),
    /// The WAL could not durably record the event. Nothing was applied;
    /// the whole operation may be retried.
    Wal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "dates conflict with reservation: {id}")
            }
            EngineError::Unauthorized(actor) => {
                write!(f, "user {actor} is not allowed to perform this operation")
            }
            EngineError::AlreadyEvaluated(id) => {
                write!(f, "reservation {id} was already evaluated")
            }
            EngineError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} a {} reservation", from.label())
            }
            EngineError::HasActiveReservations(id) => {
                write!(f, "cannot delist property {id}: reservations still hold dates")
            }
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
