//! Transactional ingestion of one update step's query response.
//!
//! The response's top-level keys are routed by alias prefix: `owndata_*`
//! sections carry batches of own data, `node_*` sections carry connection
//! pages. Everything runs inside the caller's transaction; the first
//! inconsistency aborts it and rolls the whole step back.
//!
//! Connection ingestion is append-only. Entries before the `after` cursor
//! are stable under the GraphQL connection contract, so previously fetched
//! pages are never rewritten; the local view of a connection is always the
//! concatenation of its pages in fetch order.

use rusqlite::{
  named_params, types::Value as SqlValue, Connection,
  OptionalExtension as _, ToSql,
};
use serde_json::Value as Json;
use tracing::trace;

use crate::{
  engine::{egg_param, nested_column, presence_param, primitives_table, top_param, Engine},
  error::{Error, Result},
  planner::{NODE_ALIAS_PREFIX, OWN_DATA_ALIAS_PREFIX},
  sql::SingleRowUpdate,
};
use tain_schema::ObjectInfo;

impl Engine {
  /// Apply a full query response under `update_id`.
  pub(crate) fn update_data(
    &self,
    conn: &Connection,
    update_id: i64,
    data: &Json,
  ) -> Result<()> {
    let sections = data.as_object().ok_or_else(|| {
      Error::MalformedResponse(format!("response data is not an object: {data}"))
    })?;

    for (alias, section) in sections {
      if alias.starts_with(OWN_DATA_ALIAS_PREFIX) {
        self.update_own_data(conn, update_id, section)?;
      } else if alias.starts_with(NODE_ALIAS_PREFIX) {
        let node = section.as_object().ok_or_else(|| {
          Error::MalformedResponse(format!(
            "connection section {alias:?} is not an object: {section}"
          ))
        })?;
        let object_id =
          node.get("id").and_then(|v| v.as_str()).ok_or_else(|| {
            Error::MalformedResponse(format!(
              "connection section {alias:?} lacks a string id"
            ))
          })?;
        for (fieldname, page) in node {
          if fieldname != "id" {
            self.update_connection(conn, update_id, object_id, fieldname, page)?;
          }
        }
      } else {
        return Err(Error::MalformedResponse(format!(
          "unrecognized top-level alias: {alias:?}"
        )));
      }
    }
    Ok(())
  }

  // ── Own data ──────────────────────────────────────────────────────────────

  /// Ingest one `owndata_*` batch: a sequence of records sharing a
  /// typename. Writes primitives, nested groups, and links, and stamps
  /// `objects.last_update`.
  fn update_own_data(
    &self,
    conn: &Connection,
    update_id: i64,
    section: &Json,
  ) -> Result<()> {
    let records = section.as_array().ok_or_else(|| {
      Error::MalformedResponse(format!(
        "own-data section is not an array: {section}"
      ))
    })?;
    let Some(first) = records.first() else {
      return Ok(());
    };

    let typename = first
      .as_object()
      .and_then(|r| r.get("__typename"))
      .and_then(|v| v.as_str())
      .ok_or_else(|| {
        Error::MalformedResponse(format!(
          "own-data record lacks a string __typename: {first}"
        ))
      })?;
    let object = match self.info.object(typename) {
      Some(object) => object,
      None => match self.info.schema().get(typename) {
        None => return Err(Error::UnknownTypename(typename.to_string())),
        Some(_) => {
          return Err(Error::MalformedResponse(format!(
            "own-data typename {typename:?} is not an object type"
          )));
        }
      },
    };
    trace!(typename, records = records.len(), "ingesting own data");

    let mut touch = SingleRowUpdate::prepare(
      conn,
      "UPDATE objects SET last_update = :update_id WHERE id = :id",
    )?;
    let mut write_link = SingleRowUpdate::prepare(
      conn,
      "UPDATE links SET child_id = :child_id
       WHERE parent_id = :parent_id AND fieldname = :fieldname",
    )?;
    let mut write_primitives = self.prepare_own_data_update(conn, object)?;

    for record in records {
      let fields = record.as_object().ok_or_else(|| {
        Error::MalformedResponse(format!(
          "own-data record is null or not an object: {record}"
        ))
      })?;

      let record_typename = fields
        .get("__typename")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
          Error::MalformedResponse(format!(
            "own-data record lacks a string __typename: {record}"
          ))
        })?;
      if record_typename != typename {
        return Err(Error::InconsistentBatch {
          first:  typename.to_string(),
          second: record_typename.to_string(),
        });
      }

      let id = fields
        .get(&object.id_field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
          Error::MalformedResponse(format!(
            "own-data record for {typename:?} lacks id field {:?}",
            object.id_field
          ))
        })?;

      // The record must already be registered; ingest never creates the
      // subject of an own-data update.
      let known: Option<String> = conn
        .query_row(
          "SELECT typename FROM objects WHERE id = ?1",
          [id],
          |row| row.get(0),
        )
        .optional()?;
      match known {
        None => return Err(Error::UnregisteredObject(id.to_string())),
        Some(existing) if existing != typename => {
          return Err(Error::InconsistentTypename {
            id:        id.to_string(),
            existing,
            requested: typename.to_string(),
          });
        }
        Some(_) => {}
      }

      touch.execute(named_params! {
        ":update_id": update_id,
        ":id": id,
      })?;

      if let Some((statement, param_names)) = write_primitives.as_mut() {
        let values = primitive_param_values(object, typename, id, fields)?;
        debug_assert_eq!(param_names.len(), values.len() - 1);
        let params: Vec<(&str, &dyn ToSql)> = values
          .iter()
          .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
          .collect();
        statement.execute(&params)?;
      }

      self.write_links(conn, &mut write_link, object, typename, id, fields)?;
    }
    Ok(())
  }

  /// Prepare the per-record primitives `UPDATE`, or `None` when the type
  /// has no primitive, nested-presence, or egg columns at all.
  fn prepare_own_data_update<'conn>(
    &self,
    conn: &'conn Connection,
    object: &ObjectInfo,
  ) -> Result<Option<(SingleRowUpdate<'conn>, Vec<String>)>> {
    let mut assignments = Vec::new();
    let mut param_names = Vec::new();

    for fieldname in &object.primitives {
      let param = top_param(fieldname);
      assignments.push(format!("\"{fieldname}\" = {param}"));
      param_names.push(param);
    }
    for nested in &object.nested {
      let param = presence_param(&nested.name);
      assignments.push(format!("\"{}\" = {param}", nested.name));
      param_names.push(param);
      for egg in &nested.primitives {
        let param = egg_param(&nested.name, egg);
        assignments.push(format!(
          "\"{}\" = {param}",
          nested_column(&nested.name, egg)
        ));
        param_names.push(param);
      }
    }

    if assignments.is_empty() {
      return Ok(None);
    }
    let sql = format!(
      "UPDATE \"{}\" SET {} WHERE id = :id",
      primitives_table(&object.typename),
      assignments.join(", "),
    );
    Ok(Some((SingleRowUpdate::prepare(conn, &sql)?, param_names)))
  }

  /// Write every link-shaped field of one record: top-level node fields and
  /// nested node eggs. Each write must change exactly one `links` row.
  fn write_links(
    &self,
    conn: &Connection,
    write_link: &mut SingleRowUpdate<'_>,
    object: &ObjectInfo,
    typename: &str,
    id: &str,
    fields: &serde_json::Map<String, Json>,
  ) -> Result<()> {
    let missing = |fieldname: &str| Error::MissingField {
      typename:  typename.to_string(),
      id:        id.to_string(),
      fieldname: fieldname.to_string(),
    };

    for link in &object.links {
      let value = fields.get(&link.name).ok_or_else(|| missing(&link.name))?;
      let child = self.register_node_field_result(conn, value)?;
      write_link.execute(named_params! {
        ":child_id": child,
        ":parent_id": id,
        ":fieldname": link.name,
      })?;
    }

    for nested in &object.nested {
      let group =
        fields.get(&nested.name).ok_or_else(|| missing(&nested.name))?;
      let group = match group {
        Json::Null => None,
        Json::Object(map) => Some(map),
        other => {
          return Err(Error::MalformedResponse(format!(
            "nested field {:?} of {typename:?} {id:?} is neither null nor \
             an object: {other}",
            nested.name
          )));
        }
      };
      for egg in &nested.nodes {
        let composite = nested_column(&nested.name, &egg.name);
        let child = match group {
          None => None,
          Some(map) => {
            let value =
              map.get(&egg.name).ok_or_else(|| missing(&composite))?;
            self.register_node_field_result(conn, value)?
          }
        };
        write_link.execute(named_params! {
          ":child_id": child,
          ":parent_id": id,
          ":fieldname": composite,
        })?;
      }
    }
    Ok(())
  }

  // ── Connections ───────────────────────────────────────────────────────────

  /// Ingest one page of one connection: rewrite the `connections` row and
  /// append the page's entries.
  fn update_connection(
    &self,
    conn: &Connection,
    update_id: i64,
    object_id: &str,
    fieldname: &str,
    page: &Json,
  ) -> Result<()> {
    let connection_id: i64 = conn
      .query_row(
        "SELECT rowid FROM connections
         WHERE object_id = ?1 AND fieldname = ?2",
        [object_id, fieldname],
        |row| row.get(0),
      )
      .optional()?
      .ok_or_else(|| Error::NoSuchConnection {
        object_id: object_id.to_string(),
        fieldname: fieldname.to_string(),
      })?;

    let malformed = |what: &str| {
      Error::MalformedResponse(format!(
        "connection page for {object_id:?}.{fieldname:?}: {what}"
      ))
    };
    let map =
      page.as_object().ok_or_else(|| malformed("page is not an object"))?;
    let total_count = map
      .get("totalCount")
      .and_then(|v| v.as_i64())
      .ok_or_else(|| malformed("totalCount is missing or not an integer"))?;
    let page_info = map
      .get("pageInfo")
      .and_then(|v| v.as_object())
      .ok_or_else(|| malformed("pageInfo is missing or not an object"))?;
    let has_next_page = page_info
      .get("hasNextPage")
      .and_then(|v| v.as_bool())
      .ok_or_else(|| malformed("hasNextPage is missing or not a boolean"))?;
    let end_cursor = match page_info.get("endCursor") {
      Some(Json::Null) => None,
      Some(Json::String(s)) => Some(s.clone()),
      _ => return Err(malformed("endCursor is missing or not a string/null")),
    };
    let nodes = map
      .get("nodes")
      .and_then(|v| v.as_array())
      .ok_or_else(|| malformed("nodes is missing or not an array"))?;
    trace!(
      object_id,
      fieldname,
      entries = nodes.len(),
      has_next_page,
      "ingesting connection page"
    );

    let mut rewrite = SingleRowUpdate::prepare(
      conn,
      "UPDATE connections SET
          last_update = :update_id,
          total_count = :total_count,
          has_next_page = :has_next_page,
          end_cursor = :end_cursor
       WHERE rowid = :connection_id",
    )?;
    rewrite.execute(named_params! {
      ":update_id": update_id,
      ":total_count": total_count,
      ":has_next_page": has_next_page,
      ":end_cursor": end_cursor,
      ":connection_id": connection_id,
    })?;

    let mut next_idx: i64 = conn.query_row(
      "SELECT COALESCE(MAX(idx), 0) + 1 FROM connection_entries
       WHERE connection_id = ?1",
      [connection_id],
      |row| row.get(0),
    )?;
    let mut insert_entry = conn.prepare(
      "INSERT INTO connection_entries (connection_id, idx, child_id)
       VALUES (?1, ?2, ?3)",
    )?;
    for node in nodes {
      let child = self.register_node_field_result(conn, node)?;
      insert_entry.execute(rusqlite::params![connection_id, next_idx, child])?;
      next_idx += 1;
    }
    Ok(())
  }
}

/// Collect the parameter values for one record's primitives `UPDATE`, in
/// the same order the statement's SET clause was generated. Values are
/// stored as JSON text, so SQL `NULL` ("never fetched") stays distinct from
/// the JSON null `"null"` ("fetched, and null").
fn primitive_param_values(
  object: &ObjectInfo,
  typename: &str,
  id: &str,
  fields: &serde_json::Map<String, Json>,
) -> Result<Vec<(String, SqlValue)>> {
  let missing = |fieldname: &str| Error::MissingField {
    typename:  typename.to_string(),
    id:        id.to_string(),
    fieldname: fieldname.to_string(),
  };

  let mut values: Vec<(String, SqlValue)> =
    vec![(":id".to_string(), SqlValue::Text(id.to_string()))];

  for fieldname in &object.primitives {
    let value = fields.get(fieldname).ok_or_else(|| missing(fieldname))?;
    values.push((
      top_param(fieldname),
      SqlValue::Text(serde_json::to_string(value)?),
    ));
  }

  for nested in &object.nested {
    let group = fields.get(&nested.name).ok_or_else(|| missing(&nested.name))?;
    match group {
      Json::Null => {
        values.push((presence_param(&nested.name), SqlValue::Integer(0)));
        for egg in &nested.primitives {
          values.push((egg_param(&nested.name, egg), SqlValue::Null));
        }
      }
      Json::Object(map) => {
        values.push((presence_param(&nested.name), SqlValue::Integer(1)));
        for egg in &nested.primitives {
          let value = map.get(egg).ok_or_else(|| {
            missing(&nested_column(&nested.name, egg))
          })?;
          values.push((
            egg_param(&nested.name, egg),
            SqlValue::Text(serde_json::to_string(value)?),
          ));
        }
      }
      other => {
        return Err(Error::MalformedResponse(format!(
          "nested field {:?} of {typename:?} {id:?} is neither null nor an \
           object: {other}",
          nested.name
        )));
      }
    }
  }

  Ok(values)
}
