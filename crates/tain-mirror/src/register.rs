//! Object registration.
//!
//! Registering `(typename, id)` creates the object's full row skeleton: one
//! `objects` row, one empty `primitives_T` row, one `links` row per
//! link-shaped field (top-level node fields and nested node eggs), and one
//! `connections` row per connection field — all with NULL payloads. Ingest
//! later fills these rows in place; it never creates them.

use rusqlite::{params, Connection, OptionalExtension as _};

use crate::{
  engine::{primitives_table, Engine, ObjectId},
  error::{Error, Result},
  sql::with_transaction,
};

impl Engine {
  /// Transactional [`Engine::register_object_nontx`].
  pub(crate) fn register_object(
    &self,
    conn: &mut Connection,
    typename: &str,
    id: &str,
  ) -> Result<()> {
    with_transaction(conn, |tx| self.register_object_nontx(tx, typename, id))
  }

  /// Register `(typename, id)`, or no-op if it is already registered with
  /// the same typename. Re-registration under a different typename is a
  /// hard error; typenames are immutable once recorded.
  pub(crate) fn register_object_nontx(
    &self,
    conn: &Connection,
    typename: &str,
    id: &str,
  ) -> Result<()> {
    let existing: Option<String> = conn
      .query_row(
        "SELECT typename FROM objects WHERE id = ?1",
        params![id],
        |row| row.get(0),
      )
      .optional()?;
    if let Some(existing) = existing {
      if existing == typename {
        return Ok(());
      }
      return Err(Error::InconsistentTypename {
        id:        id.to_string(),
        existing,
        requested: typename.to_string(),
      });
    }

    let object = self.info.object(typename).ok_or_else(|| {
      match self.info.schema().get(typename) {
        None => Error::UnknownTypename(typename.to_string()),
        Some(_) => Error::NonObjectTypename {
          typename: typename.to_string(),
          id:       id.to_string(),
        },
      }
    })?;

    conn.execute(
      "INSERT INTO objects (id, typename, last_update) VALUES (?1, ?2, NULL)",
      params![id, typename],
    )?;
    conn.execute(
      &format!(
        "INSERT INTO \"{}\" (id) VALUES (?1)",
        primitives_table(&object.typename)
      ),
      params![id],
    )?;

    let mut insert_link = conn.prepare(
      "INSERT INTO links (parent_id, fieldname, child_id) VALUES (?1, ?2, NULL)",
    )?;
    for fieldname in object.link_row_fieldnames() {
      insert_link.execute(params![id, fieldname])?;
    }

    let mut insert_connection = conn.prepare(
      "INSERT INTO connections
          (object_id, fieldname, last_update, total_count, has_next_page, end_cursor)
       VALUES (?1, ?2, NULL, NULL, NULL, NULL)",
    )?;
    for connection in &object.connections {
      insert_connection.execute(params![id, connection.name])?;
    }

    Ok(())
  }

  /// Resolve one node reference from a query response into a child id,
  /// registering the child as a side effect.
  ///
  /// `null` resolves to `None`. A blacklisted id also resolves to `None` —
  /// the reference is silently severed; this is the mirror's one designed
  /// silent-null behavior.
  pub(crate) fn register_node_field_result(
    &self,
    conn: &Connection,
    value: &serde_json::Value,
  ) -> Result<Option<ObjectId>> {
    if value.is_null() {
      return Ok(None);
    }
    let object = value.as_object().ok_or_else(|| {
      Error::MalformedResponse(format!(
        "node reference is neither null nor an object: {value}"
      ))
    })?;
    let typename = object
      .get("__typename")
      .and_then(|v| v.as_str())
      .ok_or_else(|| {
        Error::MalformedResponse(format!(
          "node reference lacks a string __typename: {value}"
        ))
      })?;
    // The shallow query selects the type's declared id field, so read the
    // reference's id under that name.
    let id_field = self
      .info
      .object(typename)
      .map(|o| o.id_field.as_str())
      .unwrap_or("id");
    let id =
      object.get(id_field).and_then(|v| v.as_str()).ok_or_else(|| {
        Error::MalformedResponse(format!(
          "node reference lacks a string {id_field:?}: {value}"
        ))
      })?;

    if self.blacklist.contains(id) {
      return Ok(None);
    }
    self.register_object_nontx(conn, typename, id)?;
    Ok(Some(id.to_string()))
  }
}
