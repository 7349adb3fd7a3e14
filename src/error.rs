use thiserror::Error;

/// Errors surfaced while applying an LDIF file.
///
/// Validation errors abort the whole file before any further mutation;
/// persistence errors propagate from the storage layer and the caller is
/// expected to discard the in-flight transaction. Missing rows are never an
/// error: update/delete/move/attach/detach against a row that does not
/// exist are silent no-ops.
#[derive(Debug, Error)]
pub enum Error {
    /// The DN does not begin with a recognized naming attribute.
    #[error("invalid distinguished name: {dn}")]
    InvalidDistinguishedName { dn: String },

    /// A malformed attribute value (password, newsuperior, newrdn,
    /// memberUid, or a non-decodable raw value).
    #[error("invalid value for attribute `{attribute}` in entry `{dn}`: {reason}")]
    InvalidAttributeValue {
        dn: String,
        attribute: String,
        reason: String,
    },

    /// Any underlying storage failure, propagated unmodified.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn invalid_value(dn: &str, attribute: &str, reason: impl Into<String>) -> Self {
        Error::InvalidAttributeValue {
            dn: dn.to_string(),
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
