//! The outdated finder: which objects and connections need fetching?

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection};

use crate::{
  engine::{Engine, ObjectId},
  error::Result,
};
use tain_schema::{Fieldname, Typename};

// ─── Plan types ──────────────────────────────────────────────────────────────

/// An end cursor as known to the store, three-valued:
///
/// - `None` — the connection has never been fetched; the cursor is unknown.
/// - `Some(None)` — fetched, and the cursor is known to be null (an empty
///   connection, or the very start).
/// - `Some(Some(c))` — fetched, resume after `c`.
pub(crate) type EndCursor = Option<Option<String>>;

#[derive(Debug, Clone)]
pub(crate) struct OutdatedObject {
  pub typename: Typename,
  pub id:       ObjectId,
}

#[derive(Debug, Clone)]
pub(crate) struct OutdatedConnection {
  pub object_typename: Typename,
  pub object_id:       ObjectId,
  pub fieldname:       Fieldname,
  pub end_cursor:      EndCursor,
}

/// Everything the store considers out of date relative to a threshold.
#[derive(Debug, Clone)]
pub(crate) struct QueryPlan {
  pub objects:     Vec<OutdatedObject>,
  pub connections: Vec<OutdatedConnection>,
  /// Reserved; always empty in this engine. The planner rejects a plan in
  /// which it is populated.
  pub typenames:   Vec<Typename>,
}

impl QueryPlan {
  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
      && self.connections.is_empty()
      && self.typenames.is_empty()
  }
}

// ─── Finder ──────────────────────────────────────────────────────────────────

impl Engine {
  /// Find objects whose own data, and connections whose pages, predate
  /// `since` (or have never been fetched, or have a known further page).
  pub(crate) fn find_outdated(
    &self,
    conn: &Connection,
    since: DateTime<Utc>,
  ) -> Result<QueryPlan> {
    let threshold = since.timestamp_millis();

    let mut stmt = conn.prepare(
      "SELECT objects.typename, objects.id
       FROM objects
       LEFT OUTER JOIN updates ON objects.last_update = updates.rowid
       WHERE objects.last_update IS NULL
          OR updates.time_epoch_millis < :threshold",
    )?;
    let objects = stmt
      .query_map(named_params! {":threshold": threshold}, |row| {
        Ok(OutdatedObject { typename: row.get(0)?, id: row.get(1)? })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
      "SELECT
          objects.typename,
          connections.object_id,
          connections.fieldname,
          connections.last_update IS NOT NULL,
          connections.end_cursor
       FROM connections
       JOIN objects ON connections.object_id = objects.id
       LEFT OUTER JOIN updates ON connections.last_update = updates.rowid
       WHERE connections.has_next_page
          OR connections.last_update IS NULL
          OR updates.time_epoch_millis < :threshold",
    )?;
    let connections = stmt
      .query_map(named_params! {":threshold": threshold}, |row| {
        let ever_fetched: bool = row.get(3)?;
        let cursor: Option<String> = row.get(4)?;
        Ok(OutdatedConnection {
          object_typename: row.get(0)?,
          object_id:       row.get(1)?,
          fieldname:       row.get(2)?,
          // A never-fetched connection's SQL NULL cursor means "unknown",
          // not "known to be at the start"; keep the two distinguishable.
          end_cursor:      if ever_fetched { Some(cursor) } else { None },
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(QueryPlan { objects, connections, typenames: Vec::new() })
  }
}
