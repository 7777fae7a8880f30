//! The query planner: turn a [`QueryPlan`] into one batched GraphQL
//! selection list.
//!
//! Own-data batches are aliased `owndata_<i>` and connection batches
//! `node_<i>`. Neither prefix is a prefix of the other; the ingester relies
//! on that to route each top-level response section. A user field that
//! happens to collide with one of these aliases is a schema-design problem
//! outside this engine's scope.

use tain_queries::{field, inline_fragment, Selection, Value};

use std::collections::BTreeMap;

use crate::{
  engine::{Engine, ObjectId},
  error::{Error, Result},
  outdated::{EndCursor, OutdatedConnection, QueryPlan},
  update::UpdateOptions,
};
use tain_schema::{Type, Typename};

pub(crate) const OWN_DATA_ALIAS_PREFIX: &str = "owndata_";
pub(crate) const NODE_ALIAS_PREFIX: &str = "node_";

impl Engine {
  /// The minimal selection that identifies a reference to `typename`:
  /// `__typename` plus the id — through one inline fragment per clause when
  /// `typename` is a union.
  pub(crate) fn query_shallow(
    &self,
    typename: &str,
  ) -> Result<Vec<Selection>> {
    if let Some(object) = self.info.object(typename) {
      return Ok(vec![
        field("__typename").into(),
        field(&object.id_field).into(),
      ]);
    }
    if let Some(union_info) = self.info.union(typename) {
      let mut selections: Vec<Selection> = vec![field("__typename").into()];
      for clause in &union_info.clauses {
        let object = self
          .info
          .object(clause)
          .ok_or_else(|| Error::NonCompositeType(clause.clone()))?;
        selections.push(inline_fragment(
          clause,
          [field(&object.id_field).into()],
        ));
      }
      return Ok(selections);
    }
    Err(match self.info.schema().get(typename) {
      Some(Type::Scalar) | Some(Type::Enum) => {
        Error::NonCompositeType(typename.to_string())
      }
      _ => Error::UnknownTypename(typename.to_string()),
    })
  }

  /// The selection that fetches one object's own data: id, `__typename`,
  /// every primitive, a shallow reference per node field, and every nested
  /// group's eggs. Connections are fetched separately and omitted here.
  pub(crate) fn query_own_data(
    &self,
    typename: &str,
  ) -> Result<Vec<Selection>> {
    let object = self
      .info
      .object(typename)
      .ok_or_else(|| Error::UnknownTypename(typename.to_string()))?;

    let mut selections: Vec<Selection> = vec![
      field("__typename").into(),
      field(&object.id_field).into(),
    ];
    for fieldname in &object.primitives {
      selections.push(field(fieldname).into());
    }
    for link in &object.links {
      selections.push(
        field(&link.name)
          .select(self.query_shallow(&link.element_type)?)
          .into(),
      );
    }
    for nested in &object.nested {
      let mut eggs: Vec<Selection> = Vec::new();
      for egg in &nested.primitives {
        eggs.push(field(egg).into());
      }
      for egg in &nested.nodes {
        eggs.push(
          field(&egg.name)
            .select(self.query_shallow(&egg.element_type)?)
            .into(),
        );
      }
      selections.push(field(&nested.name).select(eggs).into());
    }
    Ok(selections)
  }

  /// One page of one connection. `after` is omitted entirely when the
  /// cursor is unknown (never fetched) and passed as an explicit `null`
  /// when it is known to be null; the two mean different things to the
  /// remote server.
  pub(crate) fn query_connection(
    &self,
    typename: &str,
    fieldname: &str,
    end_cursor: &EndCursor,
    page_size: u32,
  ) -> Result<Selection> {
    let object = self
      .info
      .object(typename)
      .ok_or_else(|| Error::UnknownTypename(typename.to_string()))?;
    let connection = object
      .connections
      .iter()
      .find(|c| c.name == fieldname)
      .ok_or_else(|| Error::NotAConnectionField {
        typename:  typename.to_string(),
        fieldname: fieldname.to_string(),
      })?;

    let mut page = field(fieldname).arg("first", Value::Int(page_size.into()));
    if let Some(cursor) = end_cursor {
      let after = match cursor {
        Some(c) => Value::String(c.clone()),
        None => Value::Null,
      };
      page = page.arg("after", after);
    }
    Ok(
      page
        .select([
          field("totalCount").into(),
          field("pageInfo")
            .select([
              field("endCursor").into(),
              field("hasNextPage").into(),
            ])
            .into(),
          field("nodes")
            .select(self.query_shallow(&connection.element_type)?)
            .into(),
        ])
        .into(),
    )
  }

  /// Build the top-level selections for one update step, honoring the
  /// step's limits.
  pub(crate) fn query_from_plan(
    &self,
    plan: &QueryPlan,
    options: &UpdateOptions,
  ) -> Result<Vec<Selection>> {
    if !plan.typenames.is_empty() {
      return Err(Error::TypenamesNotSupported);
    }

    let mut selections = Vec::new();

    // Own data: bucket the scheduled objects by typename, then emit one
    // `nodes(ids: […])` selection per chunk.
    let mut by_typename: BTreeMap<&Typename, Vec<&ObjectId>> = BTreeMap::new();
    for object in plan.objects.iter().take(options.nodes_limit) {
      by_typename.entry(&object.typename).or_default().push(&object.id);
    }
    let mut batch = 0usize;
    for (typename, ids) in by_typename {
      let own_data = self.query_own_data(typename)?;
      // A chunk size of zero would make no progress; clamp it.
      for chunk in ids.chunks(options.nodes_of_type_limit.max(1)) {
        let id_values = chunk
          .iter()
          .map(|id| Value::String((*id).clone()))
          .collect::<Vec<_>>();
        selections.push(
          field("nodes")
            .aliased(format!("{OWN_DATA_ALIAS_PREFIX}{batch}"))
            .arg("ids", Value::List(id_values))
            .select([inline_fragment(typename, own_data.clone())])
            .into(),
        );
        batch += 1;
      }
    }

    // Connections: bucket the scheduled connections by owning object and
    // emit one `node(id: …)` selection per object.
    let mut by_object: BTreeMap<
      &ObjectId,
      (&Typename, Vec<&OutdatedConnection>),
    > = BTreeMap::new();
    for connection in plan.connections.iter().take(options.connection_limit) {
      let (typename, entries) = by_object
        .entry(&connection.object_id)
        .or_insert((&connection.object_typename, Vec::new()));
      if *typename != &connection.object_typename {
        return Err(Error::Corrupt(format!(
          "object {:?} scheduled under two typenames: {:?} and {:?}",
          connection.object_id, typename, connection.object_typename
        )));
      }
      entries.push(connection);
    }
    for (batch, (object_id, (typename, entries))) in
      by_object.into_iter().enumerate()
    {
      let mut pages = Vec::with_capacity(entries.len());
      for entry in entries {
        pages.push(self.query_connection(
          typename,
          &entry.fieldname,
          &entry.end_cursor,
          options.connection_page_size,
        )?);
      }
      selections.push(
        field("node")
          .aliased(format!("{NODE_ALIAS_PREFIX}{batch}"))
          .arg("id", Value::String(object_id.clone()))
          .select([field("id").into(), inline_fragment(typename, pages)])
          .into(),
      );
    }

    Ok(selections)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
