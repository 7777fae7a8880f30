//! SQL safety helpers: identifier vetting, scoped transactions, and the
//! exactly-one-row update wrapper.
//!
//! Table and column names in this crate are derived from schema identifiers,
//! so anything spliced into an identifier position must first pass
//! [`check_sql_safe`]. Values are always bound as parameters.

use rusqlite::{types::ToSqlOutput, Connection, ToSql};

use crate::error::{Error, Result};

// ─── Identifier vetting ──────────────────────────────────────────────────────

/// True when `s` matches `^[A-Za-z0-9_]+$`.
pub(crate) fn is_sql_safe(s: &str) -> bool {
  !s.is_empty()
    && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Pass `s` through, or fail if it may not be spliced into SQL.
pub(crate) fn check_sql_safe(s: &str) -> Result<&str> {
  if is_sql_safe(s) {
    Ok(s)
  } else {
    Err(Error::UnsafeIdentifier(s.to_string()))
  }
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// Fails up front if the connection is already inside a transaction. The
/// transaction handle is owned by this helper, so `f` cannot end the
/// transaction and start another; that surprising capability of some
/// embeddings is deliberately unrepresentable here.
pub(crate) fn with_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
) -> Result<T> {
  if !conn.is_autocommit() {
    return Err(Error::AlreadyInTransaction);
  }
  let tx = conn.transaction()?;
  let value = f(&tx)?;
  tx.commit()?;
  Ok(value)
}

// ─── Single-row updates ──────────────────────────────────────────────────────

/// A prepared write statement that must return no rows and change exactly
/// one row per execution. Any other change count aborts with the source SQL,
/// the bound arguments, and the actual count, which surfaces registrar or
/// state drift at the statement that first observes it.
pub(crate) struct SingleRowUpdate<'conn> {
  stmt: rusqlite::Statement<'conn>,
  sql:  String,
}

impl<'conn> SingleRowUpdate<'conn> {
  pub fn prepare(conn: &'conn Connection, sql: &str) -> Result<Self> {
    Ok(Self { stmt: conn.prepare(sql)?, sql: sql.to_string() })
  }

  pub fn execute(&mut self, params: &[(&str, &dyn ToSql)]) -> Result<()> {
    let changed = self.stmt.execute(params)?;
    if changed != 1 {
      return Err(Error::SingleRowViolation {
        sql:  self.sql.clone(),
        args: render_params(params),
        changed,
      });
    }
    Ok(())
  }
}

fn render_params(params: &[(&str, &dyn ToSql)]) -> String {
  let rendered: Vec<String> = params
    .iter()
    .map(|(name, value)| format!("{name}={}", render_value(*value)))
    .collect();
  rendered.join(", ")
}

fn render_value(value: &dyn ToSql) -> String {
  use rusqlite::types::ValueRef;

  let output = match value.to_sql() {
    Ok(output) => output,
    Err(e) => return format!("<unrenderable: {e}>"),
  };
  let value_ref = match &output {
    ToSqlOutput::Borrowed(v) => *v,
    ToSqlOutput::Owned(v) => v.into(),
    _ => return "<unrenderable>".to_string(),
  };
  match value_ref {
    ValueRef::Null => "NULL".to_string(),
    ValueRef::Integer(n) => n.to_string(),
    ValueRef::Real(x) => x.to_string(),
    ValueRef::Text(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
    ValueRef::Blob(bytes) => format!("<blob of {} bytes>", bytes.len()),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
      .unwrap();
    conn
  }

  #[test]
  fn sql_safety() {
    assert!(is_sql_safe("Issue"));
    assert!(is_sql_safe("snake_case_2"));
    assert!(!is_sql_safe(""));
    assert!(!is_sql_safe("has space"));
    assert!(!is_sql_safe("semi;colon"));
    assert!(!is_sql_safe("quo\"te"));
    assert!(!is_sql_safe("uni\u{00e9}"));
  }

  #[test]
  fn transaction_commits_on_ok() {
    let mut conn = scratch_conn();
    with_transaction(&mut conn, |tx| {
      tx.execute("INSERT INTO t (v) VALUES ('x')", [])?;
      Ok(())
    })
    .unwrap();
    let n: i64 =
      conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
    assert_eq!(n, 1);
  }

  #[test]
  fn transaction_rolls_back_on_err() {
    let mut conn = scratch_conn();
    let result: Result<()> = with_transaction(&mut conn, |tx| {
      tx.execute("INSERT INTO t (v) VALUES ('x')", [])?;
      Err(Error::AlreadyInTransaction)
    });
    assert!(result.is_err());
    let n: i64 =
      conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
    assert_eq!(n, 0);
  }

  #[test]
  fn single_row_update_accepts_one_change() {
    let conn = scratch_conn();
    conn.execute("INSERT INTO t (id, v) VALUES (1, 'a')", []).unwrap();
    let mut update =
      SingleRowUpdate::prepare(&conn, "UPDATE t SET v = :v WHERE id = :id")
        .unwrap();
    update
      .execute(&[(":v", &"b" as &dyn ToSql), (":id", &1i64 as &dyn ToSql)])
      .unwrap();
  }

  #[test]
  fn single_row_update_rejects_zero_changes() {
    let conn = scratch_conn();
    let mut update =
      SingleRowUpdate::prepare(&conn, "UPDATE t SET v = :v WHERE id = :id")
        .unwrap();
    let err = update
      .execute(&[(":v", &"b" as &dyn ToSql), (":id", &7i64 as &dyn ToSql)])
      .unwrap_err();
    match err {
      Error::SingleRowViolation { changed, args, .. } => {
        assert_eq!(changed, 0);
        assert!(args.contains(":id=7"), "diagnostic args were {args:?}");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn single_row_update_rejects_multiple_changes() {
    let conn = scratch_conn();
    conn
      .execute_batch(
        "INSERT INTO t (id, v) VALUES (1, 'a'); \
         INSERT INTO t (id, v) VALUES (2, 'a');",
      )
      .unwrap();
    let mut update =
      SingleRowUpdate::prepare(&conn, "UPDATE t SET v = :v WHERE v = 'a'")
        .unwrap();
    let err = update.execute(&[(":v", &"b" as &dyn ToSql)]).unwrap_err();
    assert!(matches!(err, Error::SingleRowViolation { changed: 2, .. }));
  }
}
