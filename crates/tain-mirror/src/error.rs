//! Error type for `tain-mirror`.
//!
//! Nothing here is recovered internally: a failure during ingestion aborts
//! (and rolls back) the enclosing transaction, and a failure during
//! extraction leaves the store untouched. The one designed "silent null" is
//! blacklisted-id dereferencing, which is not an error at all.

use thiserror::Error;

use crate::engine::ObjectId;
use tain_schema::{Fieldname, Typename};

#[derive(Debug, Error)]
pub enum Error {
  #[error("schema error: {0}")]
  Schema(#[from] tain_schema::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("transport error: {0}")]
  Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The on-disk `meta.config` fingerprint does not match this mirror's
  /// version, schema, and options.
  #[error("incompatible schema, options, or version")]
  IncompatibleConfig,

  #[error("unsafe SQL identifier: {0:?}")]
  UnsafeIdentifier(String),

  #[error("already in a transaction")]
  AlreadyInTransaction,

  #[error("unknown type: {0:?}")]
  UnknownTypename(Typename),

  #[error("cannot register object {id:?} of non-object type {typename:?}")]
  NonObjectTypename { typename: Typename, id: ObjectId },

  #[error(
    "object {id:?} is already registered with typename {existing:?}, \
     which conflicts with {requested:?}"
  )]
  InconsistentTypename {
    id:        ObjectId,
    existing:  Typename,
    requested: Typename,
  },

  #[error("object {0:?} has not been registered")]
  UnregisteredObject(ObjectId),

  #[error("no such connection: object {object_id:?} field {fieldname:?}")]
  NoSuchConnection {
    object_id: ObjectId,
    fieldname: Fieldname,
  },

  #[error(
    "own-data batch has inconsistent typenames: {first:?} vs {second:?}"
  )]
  InconsistentBatch { first: Typename, second: Typename },

  #[error("response for {typename:?} object {id:?} is missing field {fieldname:?}")]
  MissingField {
    typename:  Typename,
    id:        ObjectId,
    fieldname: Fieldname,
  },

  #[error("malformed response: {0}")]
  MalformedResponse(String),

  #[error("typename queries are not supported")]
  TypenamesNotSupported,

  #[error("cannot build a shallow selection for non-composite type {0:?}")]
  NonCompositeType(Typename),

  #[error("field {typename:?}.{fieldname:?} is not a connection")]
  NotAConnectionField {
    typename:  Typename,
    fieldname: Fieldname,
  },

  /// An `UPDATE` that must change exactly one row changed some other
  /// number. This indicates registrar/state drift and aborts the
  /// transaction immediately.
  #[error(
    "expected exactly one changed row for {sql:?} with args {{{args}}}, \
     but {changed} changed"
  )]
  SingleRowViolation {
    sql:     String,
    args:    String,
    changed: usize,
  },

  #[error("corrupt database: {0}")]
  Corrupt(String),

  #[error("cannot extract {0:?}: own data has never been fetched")]
  OwnDataNotFetched(ObjectId),

  #[error(
    "cannot extract {id:?}: {fieldname:?} connection has never been fetched"
  )]
  ConnectionNotFetched {
    id:        ObjectId,
    fieldname: Fieldname,
  },

  #[error("no such object: {0:?}")]
  NoSuchObject(ObjectId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
