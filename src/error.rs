use diesel::result::DatabaseErrorKind;
use thiserror::Error;

/// State transitions that would violate a domain invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("prize already taken, no more spins available")]
    AlreadyTaken,
    #[error("already claimed")]
    AlreadyClaimed,
    #[error("maximum spins reached")]
    MaxSpinsReached,
    #[error("all spins must be completed before taking the prize")]
    IncompleteSpins,
    #[error("not completed yet")]
    NotReady,
    #[error("preauth token expired")]
    ExpiredToken,
    #[error("preauth token already used")]
    UsedToken,
    #[error("no prize values configured for event")]
    NoPrizes,
    #[error("a linked user is required to take the prize")]
    UnauthenticatedPrize,
    #[error("preauth token already linked to another user")]
    AlreadyLinked,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        CoreError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        CoreError::Unavailable(msg.into())
    }

    /// Whether retrying the operation can succeed without any state change.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => CoreError::NotFound("record not found".into()),
            diesel::result::Error::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
                CoreError::Unavailable(format!("serialization failure: {}", info.message()))
            }
            other => CoreError::Unavailable(format!("database error: {other}")),
        }
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for CoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        CoreError::Unavailable(format!("connection pool error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_not_transient() {
        assert!(!CoreError::from(Conflict::AlreadyTaken).is_transient());
        assert!(!CoreError::bad_request("nope").is_transient());
        assert!(CoreError::unavailable("db down").is_transient());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = CoreError::from(diesel::result::Error::NotFound);
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
