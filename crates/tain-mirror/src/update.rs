//! The update loop: plan, post, ingest, repeat until convergence.
//!
//! Each step bounds its work by the limits in [`UpdateOptions`], so a
//! pathologically stale store converges in `O(outdated / limit)` steps, each
//! committed independently. The transport call is the loop's only suspension
//! point; the planning transaction closes before it and the ingestion
//! transaction opens after it, so no transaction ever spans an await.

use std::{collections::BTreeMap, future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use tain_queries::Operation;
use tracing::debug;

use crate::{
  error::{Error, Result},
  sql::with_transaction,
  store::Mirror,
};

// ─── Transport ───────────────────────────────────────────────────────────────

/// A query to post: a built operation plus a variables mapping (always
/// empty in this engine — every argument is inlined as a literal).
#[derive(Debug, Clone)]
pub struct QueryPayload {
  pub body:      Operation,
  pub variables: BTreeMap<String, serde_json::Value>,
}

/// The network seam. Implementations post `payload` to the remote GraphQL
/// endpoint and return the response's `data` payload.
///
/// The engine assumes nothing else: retries, rate limiting, and credentials
/// all live behind this trait. A failure is surfaced verbatim from
/// [`Mirror::update`], wrapped as [`Error::Transport`].
pub trait Transport: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn post_query(
    &self,
    payload: QueryPayload,
  ) -> impl Future<Output = Result<serde_json::Value, Self::Error>> + Send;
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// Tuning for one [`Mirror::update`] run.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
  /// Entities last updated strictly before this instant are outdated;
  /// never-updated entities always are.
  pub since: DateTime<Utc>,
  /// Supplies the timestamp recorded for each step's `updates` row.
  pub now: fn() -> DateTime<Utc>,
  /// Cap on objects scheduled per step.
  pub nodes_limit: usize,
  /// Cap on objects per `nodes(ids: …)` selection.
  pub nodes_of_type_limit: usize,
  /// Cap on connections scheduled per step.
  pub connection_limit: usize,
  /// The `first:` argument used for each connection page.
  pub connection_page_size: u32,
}

impl UpdateOptions {
  pub fn new(since: DateTime<Utc>) -> Self {
    Self {
      since,
      now: Utc::now,
      nodes_limit: 100,
      nodes_of_type_limit: 100,
      connection_limit: 100,
      connection_page_size: 50,
    }
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

impl Mirror {
  /// Bring the store up to date with respect to `options.since`.
  ///
  /// Loops plan → post → ingest until nothing is outdated. Each iteration
  /// ingests under a fresh `updates` row inside its own transaction, so a
  /// failure (transport or ingest) loses at most the current step.
  pub async fn update<T: Transport>(
    &self,
    transport: &T,
    options: UpdateOptions,
  ) -> Result<()> {
    let mut steps = 0usize;
    loop {
      let engine = Arc::clone(&self.engine);
      let since = options.since;
      let plan = self
        .conn
        .call(move |conn| {
          Ok(with_transaction(conn, |tx| engine.find_outdated(tx, since)))
        })
        .await??;
      if plan.is_empty() {
        debug!(steps, "mirror is up to date");
        return Ok(());
      }
      debug!(
        step = steps,
        objects = plan.objects.len(),
        connections = plan.connections.len(),
        "posting update query"
      );

      let selections = self.engine.query_from_plan(&plan, &options)?;
      let body = Operation::query("MirrorUpdate", selections);
      let data = transport
        .post_query(QueryPayload { body, variables: BTreeMap::new() })
        .await
        .map_err(|e| Error::Transport(Box::new(e)))?;

      let engine = Arc::clone(&self.engine);
      let timestamp = (options.now)().timestamp_millis();
      self
        .conn
        .call(move |conn| {
          Ok(with_transaction(conn, |tx| {
            tx.execute(
              "INSERT INTO updates (time_epoch_millis) VALUES (?1)",
              rusqlite::params![timestamp],
            )?;
            let update_id = tx.last_insert_rowid();
            engine.update_data(tx, update_id, &data)
          }))
        })
        .await??;
      steps += 1;
    }
  }
}
