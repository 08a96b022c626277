//! Common error types for livelink

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for livelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the reconciliation engine and its collaborators
///
/// `Connectivity`, `Validation` and `Ledger` are fatal: they stop the run.
/// `MatchAmbiguity` and `LinkConflict` describe a single pair and are recorded
/// without aborting the batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Asset store or remote API unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Missing or invalid credentials, malformed configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// More than one equally good photo for a video
    #[error("Ambiguous match: {0}")]
    MatchAmbiguity(String),

    /// Target asset changed since identification
    #[error("Link conflict: {0}")]
    LinkConflict(String),

    /// Audit ledger could not be written or read
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Asset store query error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Whether this error must stop the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MatchAmbiguity(_) | Error::LinkConflict(_))
    }
}

/// Audit ledger errors
///
/// Malformed and truncated files are distinct kinds so that a damaged ledger
/// is never silently treated as a shorter one.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying file operation failed
    #[error("Ledger I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A complete line could not be decoded
    #[error("Malformed ledger entry at {}:{line}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The file ends in a partial line
    #[error("Truncated ledger {}: line {line} is incomplete", .path.display())]
    Truncated { path: PathBuf, line: usize },

    /// Entry could not be encoded
    #[error("Ledger encode error: {0}")]
    Encode(String),
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_pair_kinds_are_not_fatal() {
        assert!(!Error::MatchAmbiguity("IMG_1".into()).is_fatal());
        assert!(!Error::LinkConflict("changed".into()).is_fatal());
        assert!(Error::Connectivity("down".into()).is_fatal());
        assert!(Error::Validation("no key".into()).is_fatal());
    }

    #[test]
    fn test_ledger_error_messages_name_the_file() {
        let err = LedgerError::Truncated {
            path: PathBuf::from("output/link_ledger.jsonl"),
            line: 4,
        };
        assert_eq!(
            err.to_string(),
            "Truncated ledger output/link_ledger.jsonl: line 4 is incomplete"
        );

        let fatal: Error = err.into();
        assert!(fatal.is_fatal());
    }
}
