//! Schema descriptor types — the declarative picture of a remote GraphQL
//! schema.
//!
//! All maps are `BTreeMap`s so that serializing a schema always produces the
//! same JSON text for the same schema. The mirror embeds that text in its
//! on-disk compatibility fingerprint; a nondeterministic encoding would make
//! every reopen look like a schema change.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub type Typename = String;
pub type Fieldname = String;

// ─── Schema ──────────────────────────────────────────────────────────────────

/// A mapping from typename to type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
  types: BTreeMap<Typename, Type>,
}

impl Schema {
  pub fn new(types: BTreeMap<Typename, Type>) -> Self {
    Self { types }
  }

  pub fn get(&self, typename: &str) -> Option<&Type> {
    self.types.get(typename)
  }

  pub fn types(&self) -> &BTreeMap<Typename, Type> {
    &self.types
  }
}

impl FromIterator<(Typename, Type)> for Schema {
  fn from_iter<I: IntoIterator<Item = (Typename, Type)>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

// ─── Type ────────────────────────────────────────────────────────────────────

/// A declared type. Scalars and enums carry no storage; objects carry
/// fields; unions carry object clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Type {
  Scalar,
  Enum,
  Object { fields: BTreeMap<Fieldname, FieldType> },
  Union { clauses: BTreeSet<Typename> },
}

/// The shape of one field on an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
  /// The identity field. Exactly one per object type.
  Id,
  /// A scalar or enum value.
  Primitive,
  /// A nullable reference to another object.
  Node {
    element_type: Typename,
    fidelity:     Fidelity,
  },
  /// An ordered, paginated list of nullable node references.
  Connection { element_type: Typename },
  /// A nullable object-shaped group whose children ("eggs") are primitive
  /// or node shaped. The group as a whole is three-valued: unknown, absent,
  /// or present.
  Nested { eggs: BTreeMap<Fieldname, EggType> },
}

/// The shape of one egg inside a nested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EggType {
  Primitive,
  Node {
    element_type: Typename,
    fidelity:     Fidelity,
  },
}

/// Whether a node reference can be resolved by its declared element type
/// alone. Only [`Fidelity::Faithful`] fields are supported; the mirror
/// rejects a schema containing unfaithful fields at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fidelity {
  Faithful,
  Unfaithful,
}

// ─── Constructors ────────────────────────────────────────────────────────────

pub fn scalar() -> Type {
  Type::Scalar
}

pub fn enumeration() -> Type {
  Type::Enum
}

pub fn object<I>(fields: I) -> Type
where
  I: IntoIterator<Item = (Fieldname, FieldType)>,
{
  Type::Object { fields: fields.into_iter().collect() }
}

pub fn union<I, S>(clauses: I) -> Type
where
  I: IntoIterator<Item = S>,
  S: Into<Typename>,
{
  Type::Union {
    clauses: clauses.into_iter().map(Into::into).collect(),
  }
}

pub fn id() -> FieldType {
  FieldType::Id
}

pub fn primitive() -> FieldType {
  FieldType::Primitive
}

pub fn node(element_type: impl Into<Typename>) -> FieldType {
  FieldType::Node {
    element_type: element_type.into(),
    fidelity:     Fidelity::Faithful,
  }
}

pub fn unfaithful_node(element_type: impl Into<Typename>) -> FieldType {
  FieldType::Node {
    element_type: element_type.into(),
    fidelity:     Fidelity::Unfaithful,
  }
}

pub fn connection(element_type: impl Into<Typename>) -> FieldType {
  FieldType::Connection { element_type: element_type.into() }
}

pub fn nested<I>(eggs: I) -> FieldType
where
  I: IntoIterator<Item = (Fieldname, EggType)>,
{
  FieldType::Nested { eggs: eggs.into_iter().collect() }
}

pub fn egg_primitive() -> EggType {
  EggType::Primitive
}

pub fn egg_node(element_type: impl Into<Typename>) -> EggType {
  EggType::Node {
    element_type: element_type.into(),
    fidelity:     Fidelity::Faithful,
  }
}

pub fn unfaithful_egg_node(element_type: impl Into<Typename>) -> EggType {
  EggType::Node {
    element_type: element_type.into(),
    fidelity:     Fidelity::Unfaithful,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_schema() -> Schema {
    Schema::from_iter([
      (
        "Issue".to_string(),
        object([
          ("id".to_string(), id()),
          ("title".to_string(), primitive()),
          ("author".to_string(), node("Actor")),
          ("comments".to_string(), connection("Comment")),
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
      ("DateTime".to_string(), scalar()),
    ])
  }

  #[test]
  fn serialization_is_deterministic() {
    let a = serde_json::to_string(&sample_schema()).unwrap();
    let b = serde_json::to_string(&sample_schema()).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn insertion_order_does_not_affect_encoding() {
    let forward = sample_schema();
    let mut entries: Vec<_> =
      forward.types().clone().into_iter().collect();
    entries.reverse();
    let backward = Schema::from_iter(entries);
    assert_eq!(
      serde_json::to_string(&forward).unwrap(),
      serde_json::to_string(&backward).unwrap(),
    );
  }

  #[test]
  fn round_trips_through_json() {
    let schema = sample_schema();
    let text = serde_json::to_string(&schema).unwrap();
    let back: Schema = serde_json::from_str(&text).unwrap();
    assert_eq!(schema, back);
  }

  #[test]
  fn distinct_schemas_encode_differently() {
    let a = sample_schema();
    let mut types = a.types().clone();
    types.insert("Extra".to_string(), scalar());
    let b = Schema::new(types);
    assert_ne!(
      serde_json::to_string(&a).unwrap(),
      serde_json::to_string(&b).unwrap(),
    );
  }
}
