//! Compiled schema — [`SchemaInfo`].
//!
//! The mirror engine never walks the raw [`Schema`] at runtime. Construction
//! walks each declared type exactly once, validates it, and partitions every
//! object type's fields into the four disjoint storage shapes (primitive,
//! link, connection, nested). Everything downstream — table layout, query
//! planning, ingestion, extraction — is driven by this structure.

use std::collections::BTreeMap;

use crate::{
  error::{Error, Result},
  types::{EggType, FieldType, Fidelity, Fieldname, Schema, Type, Typename},
};

// ─── Compiled records ────────────────────────────────────────────────────────

/// One object type's fields, partitioned by storage shape. The partition
/// orders follow the schema's field order and are stable across runs.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
  pub typename:    Typename,
  /// The name of the type's identity field.
  pub id_field:    Fieldname,
  pub primitives:  Vec<Fieldname>,
  pub links:       Vec<LinkField>,
  pub connections: Vec<ConnectionField>,
  pub nested:      Vec<NestedField>,
}

#[derive(Debug, Clone)]
pub struct LinkField {
  pub name:         Fieldname,
  pub element_type: Typename,
}

#[derive(Debug, Clone)]
pub struct ConnectionField {
  pub name:         Fieldname,
  pub element_type: Typename,
}

/// A nested field with its eggs partitioned into primitives and nodes.
#[derive(Debug, Clone)]
pub struct NestedField {
  pub name:       Fieldname,
  pub primitives: Vec<Fieldname>,
  pub nodes:      Vec<LinkField>,
}

#[derive(Debug, Clone)]
pub struct UnionInfo {
  /// Clause typenames in a fixed (sorted) order.
  pub clauses: Vec<Typename>,
}

impl ObjectInfo {
  /// Every fieldname that owns a `links`-table row: top-level node fields
  /// plus one `"parent.egg"` composite per nested node egg.
  pub fn link_row_fieldnames(&self) -> Vec<Fieldname> {
    let mut names: Vec<Fieldname> =
      self.links.iter().map(|l| l.name.clone()).collect();
    for nested in &self.nested {
      for egg in &nested.nodes {
        names.push(format!("{}.{}", nested.name, egg.name));
      }
    }
    names
  }
}

// ─── SchemaInfo ──────────────────────────────────────────────────────────────

/// A validated schema plus its per-type compiled records.
#[derive(Debug, Clone)]
pub struct SchemaInfo {
  schema:  Schema,
  objects: BTreeMap<Typename, ObjectInfo>,
  unions:  BTreeMap<Typename, UnionInfo>,
}

impl SchemaInfo {
  /// Compile `schema`, failing on structural problems: a missing or
  /// duplicated id field, a reference to an undeclared or non-composite
  /// type, a non-object union clause, or any unfaithful node field.
  pub fn new(schema: Schema) -> Result<Self> {
    let mut objects = BTreeMap::new();
    let mut unions = BTreeMap::new();

    for (typename, ty) in schema.types() {
      match ty {
        Type::Scalar | Type::Enum => {}
        Type::Object { fields } => {
          objects.insert(
            typename.clone(),
            compile_object(&schema, typename, fields)?,
          );
        }
        Type::Union { clauses } => {
          for clause in clauses {
            match schema.get(clause) {
              Some(Type::Object { .. }) => {}
              Some(_) => {
                return Err(Error::BadUnionClause {
                  union:  typename.clone(),
                  clause: clause.clone(),
                });
              }
              None => return Err(Error::UnknownType(clause.clone())),
            }
          }
          unions.insert(
            typename.clone(),
            UnionInfo { clauses: clauses.iter().cloned().collect() },
          );
        }
      }
    }

    Ok(Self { schema, objects, unions })
  }

  pub fn schema(&self) -> &Schema {
    &self.schema
  }

  pub fn object(&self, typename: &str) -> Option<&ObjectInfo> {
    self.objects.get(typename)
  }

  pub fn union(&self, typename: &str) -> Option<&UnionInfo> {
    self.unions.get(typename)
  }

  /// All compiled object types, in typename order.
  pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
    self.objects.values()
  }
}

// ─── Compilation ─────────────────────────────────────────────────────────────

fn compile_object(
  schema: &Schema,
  typename: &Typename,
  fields: &BTreeMap<Fieldname, FieldType>,
) -> Result<ObjectInfo> {
  let mut id_field: Option<Fieldname> = None;
  let mut primitives = Vec::new();
  let mut links = Vec::new();
  let mut connections = Vec::new();
  let mut nested = Vec::new();

  for (fieldname, field) in fields {
    match field {
      FieldType::Id => match &id_field {
        None => id_field = Some(fieldname.clone()),
        Some(first) => {
          return Err(Error::MultipleIdFields {
            typename: typename.clone(),
            first:    first.clone(),
            second:   fieldname.clone(),
          });
        }
      },
      FieldType::Primitive => primitives.push(fieldname.clone()),
      FieldType::Node { element_type, fidelity } => {
        check_faithful(typename, fieldname, *fidelity)?;
        check_composite(schema, typename, fieldname, element_type)?;
        links.push(LinkField {
          name:         fieldname.clone(),
          element_type: element_type.clone(),
        });
      }
      FieldType::Connection { element_type } => {
        check_composite(schema, typename, fieldname, element_type)?;
        connections.push(ConnectionField {
          name:         fieldname.clone(),
          element_type: element_type.clone(),
        });
      }
      FieldType::Nested { eggs } => {
        let mut egg_primitives = Vec::new();
        let mut egg_nodes = Vec::new();
        for (egg_name, egg) in eggs {
          match egg {
            EggType::Primitive => egg_primitives.push(egg_name.clone()),
            EggType::Node { element_type, fidelity } => {
              check_faithful(typename, egg_name, *fidelity)?;
              check_composite(schema, typename, egg_name, element_type)?;
              egg_nodes.push(LinkField {
                name:         egg_name.clone(),
                element_type: element_type.clone(),
              });
            }
          }
        }
        nested.push(NestedField {
          name:       fieldname.clone(),
          primitives: egg_primitives,
          nodes:      egg_nodes,
        });
      }
    }
  }

  let id_field =
    id_field.ok_or_else(|| Error::NoIdField(typename.clone()))?;

  Ok(ObjectInfo {
    typename: typename.clone(),
    id_field,
    primitives,
    links,
    connections,
    nested,
  })
}

fn check_faithful(
  typename: &Typename,
  fieldname: &Fieldname,
  fidelity: Fidelity,
) -> Result<()> {
  match fidelity {
    Fidelity::Faithful => Ok(()),
    Fidelity::Unfaithful => Err(Error::Unfaithful {
      typename:  typename.clone(),
      fieldname: fieldname.clone(),
    }),
  }
}

fn check_composite(
  schema: &Schema,
  typename: &Typename,
  fieldname: &Fieldname,
  element_type: &Typename,
) -> Result<()> {
  match schema.get(element_type) {
    Some(Type::Object { .. }) | Some(Type::Union { .. }) => Ok(()),
    Some(_) => Err(Error::BadElementType {
      typename:     typename.clone(),
      fieldname:    fieldname.clone(),
      element_type: element_type.clone(),
    }),
    None => Err(Error::UnknownType(element_type.clone())),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{
    connection, egg_node, egg_primitive, id, nested, node, object, primitive,
    scalar, unfaithful_egg_node, unfaithful_node, union, Schema,
  };

  fn issue_schema() -> Schema {
    Schema::from_iter([
      (
        "Issue".to_string(),
        object([
          ("id".to_string(), id()),
          ("title".to_string(), primitive()),
          ("url".to_string(), primitive()),
          ("author".to_string(), node("Actor")),
          ("comments".to_string(), connection("Comment")),
          (
            "editedBy".to_string(),
            nested([
              ("date".to_string(), egg_primitive()),
              ("user".to_string(), egg_node("User")),
            ]),
          ),
        ]),
      ),
      (
        "Comment".to_string(),
        object([("id".to_string(), id()), ("body".to_string(), primitive())]),
      ),
      (
        "User".to_string(),
        object([("id".to_string(), id()), ("login".to_string(), primitive())]),
      ),
      ("Actor".to_string(), union(["User"])),
    ])
  }

  #[test]
  fn partitions_fields_by_shape() {
    let info = SchemaInfo::new(issue_schema()).unwrap();
    let issue = info.object("Issue").unwrap();

    assert_eq!(issue.id_field, "id");
    assert_eq!(issue.primitives, vec!["title", "url"]);
    assert_eq!(issue.links.len(), 1);
    assert_eq!(issue.links[0].name, "author");
    assert_eq!(issue.links[0].element_type, "Actor");
    assert_eq!(issue.connections.len(), 1);
    assert_eq!(issue.connections[0].name, "comments");

    assert_eq!(issue.nested.len(), 1);
    let edited = &issue.nested[0];
    assert_eq!(edited.name, "editedBy");
    assert_eq!(edited.primitives, vec!["date"]);
    assert_eq!(edited.nodes.len(), 1);
    assert_eq!(edited.nodes[0].name, "user");
  }

  #[test]
  fn link_row_fieldnames_include_nested_eggs() {
    let info = SchemaInfo::new(issue_schema()).unwrap();
    let issue = info.object("Issue").unwrap();
    assert_eq!(issue.link_row_fieldnames(), vec!["author", "editedBy.user"]);
  }

  #[test]
  fn union_clauses_are_collected() {
    let info = SchemaInfo::new(issue_schema()).unwrap();
    let actor = info.union("Actor").unwrap();
    assert_eq!(actor.clauses, vec!["User"]);
    assert!(info.object("Actor").is_none());
  }

  #[test]
  fn rejects_object_without_id() {
    let schema = Schema::from_iter([(
      "Bare".to_string(),
      object([("title".to_string(), primitive())]),
    )]);
    assert!(matches!(
      SchemaInfo::new(schema),
      Err(Error::NoIdField(t)) if t == "Bare"
    ));
  }

  #[test]
  fn rejects_multiple_id_fields() {
    let schema = Schema::from_iter([(
      "Twice".to_string(),
      object([("id".to_string(), id()), ("uuid".to_string(), id())]),
    )]);
    assert!(matches!(
      SchemaInfo::new(schema),
      Err(Error::MultipleIdFields { .. })
    ));
  }

  #[test]
  fn rejects_unfaithful_node() {
    let schema = Schema::from_iter([
      (
        "Issue".to_string(),
        object([
          ("id".to_string(), id()),
          ("author".to_string(), unfaithful_node("User")),
        ]),
      ),
      (
        "User".to_string(),
        object([("id".to_string(), id())]),
      ),
    ]);
    assert!(matches!(SchemaInfo::new(schema), Err(Error::Unfaithful { .. })));
  }

  #[test]
  fn rejects_unfaithful_egg_node() {
    let schema = Schema::from_iter([
      (
        "Issue".to_string(),
        object([
          ("id".to_string(), id()),
          (
            "editedBy".to_string(),
            nested([("user".to_string(), unfaithful_egg_node("User"))]),
          ),
        ]),
      ),
      (
        "User".to_string(),
        object([("id".to_string(), id())]),
      ),
    ]);
    assert!(matches!(SchemaInfo::new(schema), Err(Error::Unfaithful { .. })));
  }

  #[test]
  fn rejects_reference_to_undeclared_type() {
    let schema = Schema::from_iter([(
      "Issue".to_string(),
      object([
        ("id".to_string(), id()),
        ("author".to_string(), node("Ghost")),
      ]),
    )]);
    assert!(matches!(
      SchemaInfo::new(schema),
      Err(Error::UnknownType(t)) if t == "Ghost"
    ));
  }

  #[test]
  fn rejects_scalar_element_type() {
    let schema = Schema::from_iter([
      (
        "Issue".to_string(),
        object([
          ("id".to_string(), id()),
          ("when".to_string(), connection("DateTime")),
        ]),
      ),
      ("DateTime".to_string(), scalar()),
    ]);
    assert!(matches!(
      SchemaInfo::new(schema),
      Err(Error::BadElementType { .. })
    ));
  }

  #[test]
  fn rejects_union_of_unions() {
    let schema = Schema::from_iter([
      (
        "User".to_string(),
        object([("id".to_string(), id())]),
      ),
      ("Actor".to_string(), union(["User"])),
      ("Anyone".to_string(), union(["Actor"])),
    ]);
    assert!(matches!(
      SchemaInfo::new(schema),
      Err(Error::BadUnionClause { .. })
    ));
  }
}
