//! [`Mirror`] — the public façade over a SQLite-backed mirror store.

use std::{collections::BTreeSet, path::Path, sync::Arc};

use tain_schema::Schema;

use crate::{
  engine::{Engine, ObjectId},
  error::Result,
  extract::ExtractedGraph,
  sql::with_transaction,
};

/// Construction options.
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
  /// Ids silently coerced to null wherever they appear as a reference
  /// target. A workaround for remote objects that are known to be broken.
  pub blacklisted_ids: BTreeSet<ObjectId>,
}

/// A mirror of a remote GraphQL object graph, persisted in a single SQLite
/// database that this instance owns exclusively.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone, Debug)]
pub struct Mirror {
  pub(crate) conn:   tokio_rusqlite::Connection,
  pub(crate) engine: Arc<Engine>,
}

impl Mirror {
  /// Open (or create) a mirror at `path` for `schema`.
  ///
  /// Fails with [`crate::Error::IncompatibleConfig`] if the database was
  /// created with a different schema, options, or mirror version; an
  /// incompatible store is never migrated in place.
  pub async fn open(
    path: impl AsRef<Path>,
    schema: Schema,
    options: MirrorOptions,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::initialize(conn, schema, options).await
  }

  /// Open an in-memory mirror — useful for testing.
  pub async fn open_in_memory(
    schema: Schema,
    options: MirrorOptions,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::initialize(conn, schema, options).await
  }

  async fn initialize(
    conn: tokio_rusqlite::Connection,
    schema: Schema,
    options: MirrorOptions,
  ) -> Result<Self> {
    let engine = Arc::new(Engine::new(schema, options)?);
    let init = Arc::clone(&engine);
    conn
      .call(move |conn| {
        // journal_mode returns a row; run it through query_row.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(with_transaction(conn, |tx| init.initialize(tx)))
      })
      .await??;
    Ok(Self { conn, engine })
  }

  /// Declare a root: record that `(typename, id)` exists remotely, creating
  /// its empty row skeleton. Idempotent for a matching typename; a
  /// different typename for a known id is a hard error.
  pub async fn register_object(
    &self,
    typename: impl Into<String>,
    id: impl Into<String>,
  ) -> Result<()> {
    let engine = Arc::clone(&self.engine);
    let typename = typename.into();
    let id = id.into();
    self
      .conn
      .call(move |conn| Ok(engine.register_object(conn, &typename, &id)))
      .await??;
    Ok(())
  }

  /// Materialize `root_id` and its transitive dependencies.
  ///
  /// Fails if any reachable object lacks own data or any reachable
  /// connection has never been fetched — run [`Mirror::update`] first.
  pub async fn extract(
    &self,
    root_id: impl Into<String>,
  ) -> Result<ExtractedGraph> {
    let engine = Arc::clone(&self.engine);
    let root_id = root_id.into();
    self
      .conn
      .call(move |conn| {
        Ok(with_transaction(conn, |tx| engine.extract(tx, &root_id)))
      })
      .await?
  }
}
