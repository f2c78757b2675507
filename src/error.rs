//! Error taxonomy for the resolution pipeline.
//!
//! Only caller input errors ([`ResolveError::InvalidIdentifier`] and
//! [`ResolveError::UnknownMediaKind`]) ever leave [`crate::Resolver::resolve`].
//! The remaining variants are produced by individual fetches and parses and
//! are absorbed at the point where a single source degrades to "no result".

use thiserror::Error;

/// Resolution pipeline errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid identifier {id:?}: {reason}")]
    InvalidIdentifier { id: String, reason: &'static str },

    #[error("unknown media kind: {0} (expected \"movie\" or \"series\")")]
    UnknownMediaKind(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("invalid header value: {0}")]
    Header(String),
}

impl ResolveError {
    /// Returns `true` for errors caused by the caller rather than upstream.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. } | Self::UnknownMediaKind(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_distinct() {
        let err = ResolveError::InvalidIdentifier {
            id: "500:2".to_string(),
            reason: "missing episode",
        };
        assert!(err.is_input_error());
        assert!(ResolveError::UnknownMediaKind("anime".into()).is_input_error());
        assert!(!ResolveError::Manifest("bad".into()).is_input_error());
    }

    #[test]
    fn display_names_identifier() {
        let err = ResolveError::InvalidIdentifier {
            id: "500:2".to_string(),
            reason: "missing episode",
        };
        assert_eq!(err.to_string(), "invalid identifier \"500:2\": missing episode");
    }
}
