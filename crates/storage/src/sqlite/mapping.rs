use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn unavailable(e: sqlx::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

/// Maps a unique-constraint violation to `Conflict`, anything else to
/// `Unavailable`.
pub(crate) fn insert_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => unavailable(e),
    }
}

pub(crate) fn encode_body<R: Serialize>(record: &R) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(ser)
}

pub(crate) fn decode_body<R: DeserializeOwned>(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<R, StorageError> {
    let body: String = row.try_get("body").map_err(ser)?;
    serde_json::from_str(&body).map_err(ser)
}
