//! Extraction: materialize an object and its transitive dependencies as a
//! plain structured value.
//!
//! The dependency closure is computed in SQL (a recursive CTE over `links`
//! and `connection_entries` into a scratch temp table), checked for
//! freshness, and then materialized in three passes: primitives, links,
//! connections. References are object ids resolved through the returned
//! graph's map, so cyclic structures are representable; every call returns a
//! disjoint value the caller may mutate freely.

use std::collections::BTreeMap;

use rusqlite::{
  named_params, types::Value as SqlValue, Connection,
  OptionalExtension as _,
};

use crate::{
  engine::{nested_column, primitives_table, Engine, ObjectId},
  error::{Error, Result},
};
use tain_schema::{Fieldname, ObjectInfo, Typename};

// ─── Extracted values ────────────────────────────────────────────────────────

/// The result of [`crate::Mirror::extract`]: an arena of objects keyed by
/// id, plus the root's id.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedGraph {
  root:    ObjectId,
  objects: BTreeMap<ObjectId, ExtractedObject>,
}

/// One materialized object.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedObject {
  pub typename: Typename,
  pub id:       ObjectId,
  pub fields:   BTreeMap<Fieldname, ExtractedValue>,
}

/// One materialized field value. References carry ids; resolve them through
/// [`ExtractedGraph::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
  /// A primitive, decoded from its stored JSON text.
  Primitive(serde_json::Value),
  /// A node reference (`None` when the stored link is null).
  Reference(Option<ObjectId>),
  /// A nested group: `None` when the group was absent, otherwise its eggs.
  Nested(Option<BTreeMap<Fieldname, ExtractedValue>>),
  /// A connection's entries, in page-fetch order.
  Connection(Vec<Option<ObjectId>>),
}

impl ExtractedGraph {
  pub fn root_id(&self) -> &ObjectId {
    &self.root
  }

  /// The root object. The constructor guarantees the root is present.
  pub fn root(&self) -> &ExtractedObject {
    &self.objects[&self.root]
  }

  pub fn get(&self, id: &str) -> Option<&ExtractedObject> {
    self.objects.get(id)
  }

  pub fn objects(&self) -> &BTreeMap<ObjectId, ExtractedObject> {
    &self.objects
  }
}

impl ExtractedObject {
  pub fn field(&self, name: &str) -> Option<&ExtractedValue> {
    self.fields.get(name)
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

const TEMP_TABLE_PREFIX: &str = "tmp_transitive_dependencies_";

impl Engine {
  /// Materialize `root_id` and everything reachable from it. Runs inside
  /// the caller's transaction; the only write is a scratch temp table,
  /// which is dropped on every path out.
  pub(crate) fn extract(
    &self,
    conn: &Connection,
    root_id: &str,
  ) -> Result<ExtractedGraph> {
    let table = free_temp_table_name(conn)?;
    conn.execute(
      &format!(
        "CREATE TEMPORARY TABLE {table} (
            id TEXT NOT NULL PRIMARY KEY,
            typename TEXT NOT NULL
        )"
      ),
      [],
    )?;
    let result = self.extract_with_table(conn, &table, root_id);
    let dropped = conn.execute(&format!("DROP TABLE {table}"), []);
    let graph = result?;
    dropped?;
    Ok(graph)
  }

  fn extract_with_table(
    &self,
    conn: &Connection,
    table: &str,
    root_id: &str,
  ) -> Result<ExtractedGraph> {
    // Transitive closure: the direct-dependency relation is the union of
    // non-null links and non-null connection entries.
    conn.execute(
      &format!(
        "INSERT INTO {table} (id, typename)
         WITH RECURSIVE transitive_dependencies (id) AS (
             VALUES (:root_id)
             UNION
             SELECT links.child_id
             FROM transitive_dependencies
             JOIN links ON links.parent_id = transitive_dependencies.id
             WHERE links.child_id IS NOT NULL
             UNION
             SELECT connection_entries.child_id
             FROM transitive_dependencies
             JOIN connections
                 ON connections.object_id = transitive_dependencies.id
             JOIN connection_entries
                 ON connection_entries.connection_id = connections.rowid
             WHERE connection_entries.child_id IS NOT NULL
         )
         SELECT objects.id, objects.typename
         FROM transitive_dependencies
         JOIN objects USING (id)"
      ),
      named_params! {":root_id": root_id},
    )?;

    self.check_freshness(conn, table)?;

    let mut objects = self.materialize_primitives(conn, table)?;
    self.resolve_links(conn, table, &mut objects)?;
    self.resolve_connections(conn, table, &mut objects)?;

    if !objects.contains_key(root_id) {
      return Err(Error::NoSuchObject(root_id.to_string()));
    }
    Ok(ExtractedGraph { root: root_id.to_string(), objects })
  }

  /// Every object in the closure must have own data, and every connection
  /// attached to one of them must have been fetched at least once.
  fn check_freshness(&self, conn: &Connection, table: &str) -> Result<()> {
    let stale_object: Option<String> = conn
      .query_row(
        &format!(
          "SELECT objects.id
           FROM {table}
           JOIN objects USING (id)
           WHERE objects.last_update IS NULL
           ORDER BY objects.id
           LIMIT 1"
        ),
        [],
        |row| row.get(0),
      )
      .optional()?;
    if let Some(id) = stale_object {
      return Err(Error::OwnDataNotFetched(id));
    }

    let stale_connection: Option<(String, String)> = conn
      .query_row(
        &format!(
          "SELECT connections.object_id, connections.fieldname
           FROM {table}
           JOIN connections ON connections.object_id = {table}.id
           WHERE connections.last_update IS NULL
           ORDER BY connections.object_id, connections.fieldname
           LIMIT 1"
        ),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;
    if let Some((id, fieldname)) = stale_connection {
      return Err(Error::ConnectionNotFetched { id, fieldname });
    }
    Ok(())
  }

  /// Pass one: for each distinct typename in the closure, pull the
  /// `primitives_T` rows and decode primitive and nested columns.
  fn materialize_primitives(
    &self,
    conn: &Connection,
    table: &str,
  ) -> Result<BTreeMap<ObjectId, ExtractedObject>> {
    let mut stmt =
      conn.prepare(&format!("SELECT DISTINCT typename FROM {table}"))?;
    let typenames = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut objects = BTreeMap::new();
    for typename in typenames {
      let object = self.info.object(&typename).ok_or_else(|| {
        Error::Corrupt(format!(
          "stored object has typename {typename:?}, which the schema does \
           not declare as an object type"
        ))
      })?;

      let (select_columns, kinds) = primitive_columns(object);
      let sql = format!(
        "SELECT {} FROM \"{}\" JOIN {table} USING (id)",
        select_columns.join(", "),
        primitives_table(&typename),
      );
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt
        .query_map([], |row| {
          let id: String = row.get(0)?;
          let mut values = Vec::with_capacity(kinds.len());
          for i in 0..kinds.len() {
            values.push(row.get::<_, SqlValue>(i + 1)?);
          }
          Ok((id, values))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

      for (id, values) in rows {
        let fields = decode_row(&typename, &id, &kinds, values)?;
        objects.insert(
          id.clone(),
          ExtractedObject { typename: typename.clone(), id, fields },
        );
      }
    }
    Ok(objects)
  }

  /// Pass two: place every link (top-level or nested egg) into its parent.
  fn resolve_links(
    &self,
    conn: &Connection,
    table: &str,
    objects: &mut BTreeMap<ObjectId, ExtractedObject>,
  ) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
      "SELECT links.parent_id, links.fieldname, links.child_id
       FROM links
       JOIN {table} ON links.parent_id = {table}.id"
    ))?;
    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Option<String>>(2)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    for (parent_id, fieldname, child) in rows {
      let parent = objects.get_mut(&parent_id).ok_or_else(|| {
        Error::Corrupt(format!(
          "links row references unmaterialized parent {parent_id:?}"
        ))
      })?;
      let parts: Vec<&str> = fieldname.split('.').collect();
      match parts.as_slice() {
        [field] => {
          parent
            .fields
            .insert((*field).to_string(), ExtractedValue::Reference(child));
        }
        [field, egg] => match parent.fields.get_mut(*field) {
          Some(ExtractedValue::Nested(Some(eggs))) => {
            eggs.insert((*egg).to_string(), ExtractedValue::Reference(child));
          }
          // The whole group is absent; its egg links are meaningless.
          Some(ExtractedValue::Nested(None)) => {}
          _ => {
            return Err(Error::Corrupt(format!(
              "link {fieldname:?} of {parent_id:?} does not target a \
               nested field"
            )));
          }
        },
        _ => {
          return Err(Error::Corrupt(format!(
            "malformed link fieldname {fieldname:?}"
          )));
        }
      }
    }
    Ok(())
  }

  /// Pass three: stream connection entries in `(object, field, idx)` order
  /// and rebuild each connection as an ordered list.
  fn resolve_connections(
    &self,
    conn: &Connection,
    table: &str,
    objects: &mut BTreeMap<ObjectId, ExtractedObject>,
  ) -> Result<()> {
    let mut stmt = conn.prepare(&format!(
      "SELECT
          {table}.id,
          connections.fieldname,
          connection_entries.idx,
          connection_entries.child_id
       FROM {table}
       JOIN connections ON connections.object_id = {table}.id
       LEFT OUTER JOIN connection_entries
           ON connection_entries.connection_id = connections.rowid
       ORDER BY {table}.id, connections.fieldname, connection_entries.idx ASC"
    ))?;
    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Option<i64>>(2)?,
          row.get::<_, Option<String>>(3)?,
        ))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    for (parent_id, fieldname, idx, child) in rows {
      let parent = objects.get_mut(&parent_id).ok_or_else(|| {
        Error::Corrupt(format!(
          "connections row references unmaterialized object {parent_id:?}"
        ))
      })?;
      let slot = parent
        .fields
        .entry(fieldname)
        .or_insert_with(|| ExtractedValue::Connection(Vec::new()));
      // A row with NULL idx is the LEFT JOIN's witness of an empty
      // connection; it contributes no entry.
      if idx.is_some() {
        if let ExtractedValue::Connection(entries) = slot {
          entries.push(child);
        }
      }
    }
    Ok(())
  }
}

// ─── Row decoding ────────────────────────────────────────────────────────────

enum ColumnKind<'a> {
  Primitive(&'a Fieldname),
  Presence(&'a Fieldname),
  Egg(&'a Fieldname, &'a Fieldname),
}

/// The SELECT column list for one object type (id first), plus what each
/// non-id column means.
fn primitive_columns(object: &ObjectInfo) -> (Vec<String>, Vec<ColumnKind<'_>>) {
  let mut columns = vec!["id".to_string()];
  let mut kinds = Vec::new();
  for fieldname in &object.primitives {
    columns.push(format!("\"{fieldname}\""));
    kinds.push(ColumnKind::Primitive(fieldname));
  }
  for nested in &object.nested {
    columns.push(format!("\"{}\"", nested.name));
    kinds.push(ColumnKind::Presence(&nested.name));
    for egg in &nested.primitives {
      columns.push(format!("\"{}\"", nested_column(&nested.name, egg)));
      kinds.push(ColumnKind::Egg(&nested.name, egg));
    }
  }
  (columns, kinds)
}

fn decode_row(
  typename: &str,
  id: &str,
  kinds: &[ColumnKind<'_>],
  values: Vec<SqlValue>,
) -> Result<BTreeMap<Fieldname, ExtractedValue>> {
  debug_assert_eq!(kinds.len(), values.len());

  let mut fields = BTreeMap::new();
  for (kind, value) in kinds.iter().zip(values) {
    match kind {
      ColumnKind::Primitive(fieldname) => {
        fields.insert(
          (*fieldname).clone(),
          ExtractedValue::Primitive(decode_json(typename, id, fieldname, value)?),
        );
      }
      ColumnKind::Presence(fieldname) => {
        let group = match value {
          SqlValue::Integer(0) => ExtractedValue::Nested(None),
          SqlValue::Integer(1) => ExtractedValue::Nested(Some(BTreeMap::new())),
          other => {
            return Err(Error::Corrupt(format!(
              "nested-presence column {fieldname:?} of {typename:?} {id:?} \
               holds {other:?}, expected 0 or 1"
            )));
          }
        };
        fields.insert((*fieldname).clone(), group);
      }
      ColumnKind::Egg(fieldname, egg) => {
        match fields.get_mut(*fieldname) {
          Some(ExtractedValue::Nested(Some(eggs))) => {
            eggs.insert(
              (*egg).clone(),
              ExtractedValue::Primitive(decode_json(
                typename,
                id,
                &nested_column(fieldname, egg),
                value,
              )?),
            );
          }
          // Absent group: its egg columns are NULL and meaningless.
          Some(ExtractedValue::Nested(None)) => {}
          _ => {
            return Err(Error::Corrupt(format!(
              "egg column for {fieldname:?} of {typename:?} {id:?} has no \
               presence column"
            )));
          }
        }
      }
    }
  }
  Ok(fields)
}

fn decode_json(
  typename: &str,
  id: &str,
  fieldname: &str,
  value: SqlValue,
) -> Result<serde_json::Value> {
  match value {
    SqlValue::Text(text) => Ok(serde_json::from_str(&text)?),
    other => Err(Error::Corrupt(format!(
      "primitive column {fieldname:?} of {typename:?} {id:?} holds \
       {other:?}, expected JSON text"
    ))),
  }
}

// ─── Temp-table naming ───────────────────────────────────────────────────────

/// Find an unused `tmp_transitive_dependencies_<n>` name by scanning the
/// catalogs for the maximum existing suffix. A single writer makes a
/// genuine race impossible, but a previous attempt may have aborted before
/// its drop.
fn free_temp_table_name(conn: &Connection) -> Result<String> {
  let mut stmt = conn.prepare(
    "SELECT name FROM sqlite_temp_master WHERE name LIKE :pattern
     UNION
     SELECT name FROM sqlite_master WHERE name LIKE :pattern",
  )?;
  let names = stmt
    .query_map(
      named_params! {":pattern": format!("{TEMP_TABLE_PREFIX}%")},
      |row| row.get::<_, String>(0),
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let next = names
    .iter()
    .filter_map(|name| name[TEMP_TABLE_PREFIX.len()..].parse::<u64>().ok())
    .max()
    .map_or(0, |max| max + 1);
  Ok(format!("{TEMP_TABLE_PREFIX}{next}"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn temp_table_names_skip_leftovers() {
    let conn = Connection::open_in_memory().unwrap();
    assert_eq!(
      free_temp_table_name(&conn).unwrap(),
      "tmp_transitive_dependencies_0"
    );
    conn
      .execute_batch(
        "CREATE TEMPORARY TABLE tmp_transitive_dependencies_4 (id TEXT);",
      )
      .unwrap();
    assert_eq!(
      free_temp_table_name(&conn).unwrap(),
      "tmp_transitive_dependencies_5"
    );
  }

  #[test]
  fn non_numeric_suffixes_are_ignored() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch(
        "CREATE TEMPORARY TABLE tmp_transitive_dependencies_junk (id TEXT);",
      )
      .unwrap();
    assert_eq!(
      free_temp_table_name(&conn).unwrap(),
      "tmp_transitive_dependencies_0"
    );
  }
}
