//! Descriptor parsing errors.
//!
//! Every variant carries the location of the offending field inside the
//! document, written as a dotted path (`links.sensors.links.temp.type`,
//! `requests[2].link`).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("descriptor is not valid JSON: {0}")]
    Syntax(String),

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("field `{field}` must be {expected}, found {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("field `{field}` has invalid value {value:?}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: &'static str,
    },

    #[error("link key at `{field}` has an empty path component")]
    EmptyLinkKey { field: String },

    #[error("link key {key:?} at `{field}` is not below the accumulated path {path:?}")]
    PrefixMismatch {
        field: String,
        key: String,
        path: String,
    },

    #[error("link path {path:?} at `{field}` is declared more than once")]
    DuplicatePath { field: String, path: String },

    #[error("request link {link:?} at `{field}` is declared more than once")]
    DuplicateRequest { field: String, link: String },

    #[error("request {link:?} at `{field}` targets this endpoint but names no declared link")]
    UnknownRequestLink { field: String, link: String },
}

impl DescriptorError {
    /// Location of the offending field, if the error has one.
    pub fn field(&self) -> Option<&str> {
        match self {
            DescriptorError::Syntax(_) => None,
            DescriptorError::MissingField { field }
            | DescriptorError::WrongType { field, .. }
            | DescriptorError::InvalidValue { field, .. }
            | DescriptorError::EmptyLinkKey { field }
            | DescriptorError::PrefixMismatch { field, .. }
            | DescriptorError::DuplicatePath { field, .. }
            | DescriptorError::DuplicateRequest { field, .. }
            | DescriptorError::UnknownRequestLink { field, .. } => Some(field),
        }
    }
}

impl From<serde_json::Error> for DescriptorError {
    fn from(err: serde_json::Error) -> Self {
        DescriptorError::Syntax(err.to_string())
    }
}
