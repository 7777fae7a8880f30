//! Shared synchronous engine state.
//!
//! [`Engine`] bundles everything the database-side phases need: the compiled
//! schema, the blacklist, and the canonical config fingerprint. The public
//! [`crate::Mirror`] holds it behind an `Arc` and clones it into each
//! `tokio_rusqlite` closure; every method here takes a plain
//! `rusqlite::Connection` and runs synchronously on the database thread.

use std::collections::BTreeSet;

use tain_schema::{Fieldname, Schema, SchemaInfo, Typename};

use crate::{error::Result, init, store::MirrorOptions};

/// A remote object identifier, exactly as the server renders it.
pub type ObjectId = String;

#[derive(Debug)]
pub(crate) struct Engine {
  pub(crate) info:      SchemaInfo,
  pub(crate) blacklist: BTreeSet<ObjectId>,
  /// Canonical `{version, schema, options}` fingerprint (see [`init`]).
  pub(crate) config:    String,
}

impl Engine {
  pub(crate) fn new(schema: Schema, options: MirrorOptions) -> Result<Self> {
    let config = init::config_blob(&schema, &options.blacklisted_ids)?;
    let info = SchemaInfo::new(schema)?;
    Ok(Self { info, blacklist: options.blacklisted_ids, config })
  }
}

// ─── Name encodings ──────────────────────────────────────────────────────────
//
// Primitive data for object type `T` lives in table `primitives_T`. Top-level
// primitive fields map to columns named after the field; a nested field `F`
// gets one presence column `"F"` and one column `"F.E"` per primitive egg
// `E`. Parameter names use disjoint prefixes, with a length prefix on the
// nested encoding so that underscores inside `F` cannot make two distinct
// `(F, E)` pairs collide.

pub(crate) fn primitives_table(typename: &Typename) -> String {
  format!("primitives_{typename}")
}

pub(crate) fn nested_column(field: &Fieldname, egg: &Fieldname) -> String {
  format!("{field}.{egg}")
}

pub(crate) fn top_param(field: &Fieldname) -> String {
  format!(":t_{field}")
}

pub(crate) fn presence_param(field: &Fieldname) -> String {
  format!(":np_{field}")
}

pub(crate) fn egg_param(field: &Fieldname, egg: &Fieldname) -> String {
  format!(":n_{}_{}_{}", field.len(), field, egg)
}
