//! Error types for the formsync engine.

use crate::{DestinationId, FormId};
use thiserror::Error;

/// All possible errors from the formsync engine.
///
/// Column resolution never fails: a column with no matching submitted value
/// resolves to an empty cell instead of an error. Partially failed bulk
/// imports are reported through [`crate::ImportReport`], not through this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Credential errors
    #[error("no usable credential for the tabular store: {0}")]
    Authentication(String),

    // Destination errors
    #[error("destination could not be created: {0}")]
    DestinationCreate(String),

    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("destination no longer exists: {0}")]
    DestinationMissing(DestinationId),

    // Mapping errors
    #[error("form is not mapped to a destination: {0}")]
    NotMapped(FormId),

    #[error("form not found: {0}")]
    FormNotFound(FormId),

    // Collaborator errors
    #[error("schema provider error: {0}")]
    Schema(String),

    #[error("submission source error: {0}")]
    Source(String),

    #[error("mapping store error: {0}")]
    Mapping(String),
}

impl Error {
    /// Whether this error means the destination is gone and the mapping
    /// pointing at it should be discarded.
    pub fn is_destination_missing(&self) -> bool {
        matches!(self, Error::DestinationMissing(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::NotMapped("contact".into());
        assert_eq!(err.to_string(), "form is not mapped to a destination: contact");

        let err = Error::DestinationMissing("sheet-1".into());
        assert_eq!(err.to_string(), "destination no longer exists: sheet-1");

        let err = Error::Authentication("token expired".into());
        assert_eq!(
            err.to_string(),
            "no usable credential for the tabular store: token expired"
        );
    }

    #[test]
    fn only_missing_destination_discards_mapping() {
        assert!(Error::DestinationMissing("s".into()).is_destination_missing());
        assert!(!Error::DestinationUnavailable("timeout".into()).is_destination_missing());
        assert!(!Error::DestinationCreate("quota".into()).is_destination_missing());
    }
}
