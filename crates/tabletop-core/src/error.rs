//! Error types for the Tabletop workspace

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TabletopError>;

#[derive(Error, Debug)]
pub enum TabletopError {
    #[error("Unknown entity type: {entity}")]
    UnknownEntity { entity: String },

    #[error("Unknown field: {entity}.{path}")]
    UnknownField { entity: String, path: String },

    #[error("Malformed JSON in field \"{field}\" (raw value {raw:?}): {source}")]
    MalformedJson {
        field: String,
        raw: String,
        source: serde_json::Error,
    },

    #[error("Ambiguous reference in field \"{field}\": natural key must be specified as a bracketed sequence, got {raw:?}")]
    AmbiguousReference { field: String, raw: String },

    #[error("Reference not found: {entity} matching {key} does not exist")]
    ReferenceNotFound { entity: String, key: String },

    #[error("Uniquely identifying rows by {key} is not enough; rows {first} and {second} collide. Specify fields whose combination is guaranteed to be unique.")]
    NonUniqueIdentifier {
        key: String,
        first: String,
        second: String,
    },

    #[error("Table mismatch:{detail}")]
    TableMismatch { detail: String },

    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("Invalid step table: {reason}")]
    InvalidTable { reason: String },

    #[error("Store operation failed: {reason}")]
    Store { reason: String },
}
