use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::model::common::{CandidateId, Polarity};
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the reconciliation and tally logic.
///
/// The detailed variants are kept for logging; callers outside the crate
/// should only act on [`Error::public_kind`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Access denied: {0}")]
    AccessDenied(String),
    #[error(transparent)]
    Store(StoreError),
    #[error("Partial aggregation: {0}")]
    PartialAggregation(TallyErrors),
    #[error("Internal failure: {0}")]
    Internal(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            err => Self::Store(err),
        }
    }
}

impl Error {
    /// The coarse error kind exposed to external callers. All storage and
    /// internal failures collapse into [`PublicError::Internal`].
    pub fn public_kind(&self) -> PublicError {
        match self {
            Self::Validation(_) => PublicError::BadRequest,
            Self::NotFound(_) => PublicError::NotFound,
            Self::AccessDenied(_) => PublicError::AccessDenied,
            Self::Store(_) | Self::PartialAggregation(_) | Self::Internal(_) | Self::Cancelled => {
                PublicError::Internal
            }
        }
    }
}

/// Error kinds visible outside the logic layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PublicError {
    BadRequest,
    NotFound,
    AccessDenied,
    Internal,
}

impl PublicError {
    /// A stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "invalid_id",
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Internal => "internal_server_error",
        }
    }
}

impl Display for PublicError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures of individual counting tasks during a best-effort tally,
/// keyed by polarity and candidate.
#[derive(Debug, Default)]
pub struct TallyErrors(BTreeMap<(Polarity, CandidateId), Error>);

impl TallyErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A second failure for the same key replaces the first.
    pub fn insert(&mut self, polarity: Polarity, candidate_id: CandidateId, error: Error) {
        self.0.insert((polarity, candidate_id), error);
    }

    pub fn get(&self, polarity: Polarity, candidate_id: CandidateId) -> Option<&Error> {
        self.0.get(&(polarity, candidate_id))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Polarity, CandidateId), &Error)> {
        self.0.iter()
    }
}

impl Display for TallyErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} counting task(s) failed", self.0.len())?;
        for ((polarity, candidate_id), err) in self.0.iter() {
            write!(f, "; {polarity} votes of {candidate_id}: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::mongodb::Id;

    #[test]
    fn store_errors_keep_not_found_distinct() {
        let not_found: Error = StoreError::NotFound("election x".to_string()).into();
        assert!(matches!(not_found, Error::NotFound(_)));
        assert_eq!(not_found.public_kind(), PublicError::NotFound);

        let transient: Error = StoreError::transient("connection reset").into();
        assert!(matches!(transient, Error::Store(_)));
        assert_eq!(transient.public_kind(), PublicError::Internal);
    }

    #[test]
    fn tally_errors_display() {
        let candidate = Id::new();
        let mut errors = TallyErrors::new();
        errors.insert(
            Polarity::Negative,
            candidate,
            StoreError::transient("timeout").into(),
        );
        assert_eq!(errors.len(), 1);
        assert!(errors.get(Polarity::Negative, candidate).is_some());
        assert!(errors.get(Polarity::Positive, candidate).is_none());
        let shown = errors.to_string();
        assert!(shown.starts_with("1 counting task(s) failed"));
        assert!(shown.contains(&format!("negative votes of {candidate}")));
    }
}
