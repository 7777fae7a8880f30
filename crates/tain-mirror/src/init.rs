//! Store initialization: structural DDL, per-type primitive tables, and the
//! on-disk compatibility gate.
//!
//! The `meta` table holds a single row whose `config` column is the
//! canonical JSON encoding of `{version, schema, options}`. Any change to
//! the mapping rules or column encodings must bump [`VERSION`]; an old
//! database then refuses to open rather than being migrated.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension as _};
use serde::Serialize;
use tain_schema::{ObjectInfo, Schema};

use crate::{
  engine::{nested_column, primitives_table, Engine, ObjectId},
  error::{Error, Result},
  sql::check_sql_safe,
};

pub(crate) const VERSION: &str = "MIRROR_v3";

// ─── Config fingerprint ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct ConfigBlob<'a> {
  version: &'a str,
  schema:  &'a Schema,
  options: ConfigOptions<'a>,
}

#[derive(Serialize)]
struct ConfigOptions<'a> {
  blacklisted_ids: &'a BTreeSet<ObjectId>,
}

/// Canonical textual encoding of the mirror's compatibility key. The schema
/// serializes over ordered maps, so equal inputs always yield equal blobs.
pub(crate) fn config_blob(
  schema: &Schema,
  blacklisted_ids: &BTreeSet<ObjectId>,
) -> Result<String> {
  Ok(serde_json::to_string(&ConfigBlob {
    version: VERSION,
    schema,
    options: ConfigOptions { blacklisted_ids },
  })?)
}

// ─── Structural tables ───────────────────────────────────────────────────────

// `updates` timestamps every committed ingest step. `objects.last_update`
// and `connections.last_update` point at the step that last wrote them; NULL
// means never fetched. The `connections` CHECK ties the three page fields
// together: they are all NULL or all set, and an end cursor requires a
// fetch (the converse is allowed — an empty connection has a known-null
// cursor).
const STRUCTURAL_SCHEMA: &str = "
CREATE TABLE updates (
    rowid INTEGER PRIMARY KEY,
    time_epoch_millis INTEGER NOT NULL
);
CREATE TABLE objects (
    id TEXT NOT NULL PRIMARY KEY,
    typename TEXT NOT NULL,
    last_update INTEGER,
    FOREIGN KEY(last_update) REFERENCES updates(rowid)
);
CREATE TABLE links (
    rowid INTEGER PRIMARY KEY,
    parent_id TEXT NOT NULL,
    fieldname TEXT NOT NULL,
    child_id TEXT,
    UNIQUE(parent_id, fieldname),
    FOREIGN KEY(parent_id) REFERENCES objects(id),
    FOREIGN KEY(child_id) REFERENCES objects(id)
);
CREATE INDEX idx_links__parent_id__fieldname ON links (parent_id, fieldname);
CREATE TABLE connections (
    rowid INTEGER PRIMARY KEY,
    object_id TEXT NOT NULL,
    fieldname TEXT NOT NULL,
    last_update INTEGER,
    total_count INTEGER,
    has_next_page BOOLEAN,
    end_cursor TEXT,
    CONSTRAINT page_fields_all_or_none CHECK (
        (last_update IS NULL) = (total_count IS NULL)
        AND (last_update IS NULL) = (has_next_page IS NULL)
        AND ((last_update IS NULL) <= (end_cursor IS NULL))
    ),
    UNIQUE(object_id, fieldname),
    FOREIGN KEY(object_id) REFERENCES objects(id),
    FOREIGN KEY(last_update) REFERENCES updates(rowid)
);
CREATE INDEX idx_connections__object_id__fieldname
    ON connections (object_id, fieldname);
CREATE TABLE connection_entries (
    rowid INTEGER PRIMARY KEY,
    connection_id INTEGER NOT NULL,
    idx INTEGER NOT NULL,
    child_id TEXT,
    UNIQUE(connection_id, idx),
    FOREIGN KEY(connection_id) REFERENCES connections(rowid),
    FOREIGN KEY(child_id) REFERENCES objects(id)
);
CREATE INDEX idx_connection_entries__connection_id
    ON connection_entries (connection_id);
";

impl Engine {
  /// Create or verify the store. Must run inside a transaction.
  ///
  /// Cases: no `meta` row yet — record our fingerprint and create every
  /// table; an equal row — the store is already initialized, nothing to do;
  /// a differing row — refuse to touch the database.
  pub(crate) fn initialize(&self, conn: &Connection) -> Result<()> {
    conn.execute(
      "CREATE TABLE IF NOT EXISTS meta (
          zero INTEGER PRIMARY KEY CHECK (zero = 0),
          config TEXT NOT NULL
      )",
      [],
    )?;

    let existing: Option<String> = conn
      .query_row("SELECT config FROM meta WHERE zero = 0", [], |row| {
        row.get(0)
      })
      .optional()?;
    match existing {
      Some(config) if config == self.config => return Ok(()),
      Some(_) => return Err(Error::IncompatibleConfig),
      None => {}
    }

    conn.execute(
      "INSERT INTO meta (zero, config) VALUES (0, ?1)",
      [&self.config],
    )?;
    conn.execute_batch(STRUCTURAL_SCHEMA)?;

    for object in self.info.objects() {
      create_primitives_table(conn, object)?;
    }
    Ok(())
  }
}

/// Create `primitives_T` for one object type. Every identifier that lands in
/// the DDL — the typename, each primitive and nested field name, each egg
/// name — is vetted first.
fn create_primitives_table(
  conn: &Connection,
  object: &ObjectInfo,
) -> Result<()> {
  check_sql_safe(&object.typename)?;
  check_sql_safe(&object.id_field)?;
  for fieldname in &object.primitives {
    check_sql_safe(fieldname)?;
  }
  for link in &object.links {
    check_sql_safe(&link.name)?;
  }
  for connection in &object.connections {
    check_sql_safe(&connection.name)?;
  }

  let mut columns = vec!["id TEXT NOT NULL PRIMARY KEY".to_string()];
  for fieldname in &object.primitives {
    columns.push(format!("\"{fieldname}\" TEXT"));
  }
  for nested in &object.nested {
    check_sql_safe(&nested.name)?;
    // Presence marker: SQL NULL = unknown, 0 = absent, 1 = present.
    columns.push(format!("\"{}\" INTEGER", nested.name));
    for egg in &nested.primitives {
      check_sql_safe(egg)?;
      columns.push(format!("\"{}\" TEXT", nested_column(&nested.name, egg)));
    }
    for egg in &nested.nodes {
      check_sql_safe(&egg.name)?;
    }
  }
  columns.push("FOREIGN KEY(id) REFERENCES objects(id)".to_string());

  let table = primitives_table(&object.typename);
  conn.execute(
    &format!("CREATE TABLE \"{}\" ({})", table, columns.join(", ")),
    [],
  )?;
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
