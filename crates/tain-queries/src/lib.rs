//! GraphQL selection-set builder and printer for tain.
//!
//! Pure synchronous; no HTTP or database dependencies. Callers construct a
//! tree of [`Selection`]s with the helpers here and serialize it to GraphQL
//! wire text via `Display` (see [`print`]).
//!
//! # Quick start
//!
//! ```
//! use tain_queries::{field, inline_fragment, Operation, Value};
//!
//! let op = Operation::query(
//!   "MirrorUpdate",
//!   [field("node")
//!     .arg("id", Value::String("i1".into()))
//!     .select([
//!       field("id").into(),
//!       inline_fragment("Issue", [field("title").into()]),
//!     ])
//!     .into()],
//! );
//! assert!(op.to_string().starts_with("query MirrorUpdate {"));
//! ```

mod print;

// ─── Values ──────────────────────────────────────────────────────────────────

/// A GraphQL argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Int(i64),
  Boolean(bool),
  String(String),
  /// A bare enum literal, printed without quotes.
  Enum(String),
  List(Vec<Value>),
  /// A `$name` variable reference.
  Variable(String),
}

// ─── Selections ──────────────────────────────────────────────────────────────

/// One entry in a selection set.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
  Field(Field),
  InlineFragment(InlineFragment),
}

/// A (possibly aliased) field with arguments and a nested selection set.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub alias:      Option<String>,
  pub name:       String,
  pub arguments:  Vec<(String, Value)>,
  pub selections: Vec<Selection>,
}

/// A `... on TypeCondition { … }` fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
  pub type_condition: String,
  pub selections:     Vec<Selection>,
}

/// A named `query` operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
  pub name:       String,
  pub selections: Vec<Selection>,
}

// ─── Constructors ────────────────────────────────────────────────────────────

/// Start building a field selection.
pub fn field(name: impl Into<String>) -> Field {
  Field {
    alias:      None,
    name:       name.into(),
    arguments:  Vec::new(),
    selections: Vec::new(),
  }
}

/// Build an inline fragment on `type_condition`.
pub fn inline_fragment(
  type_condition: impl Into<String>,
  selections: impl IntoIterator<Item = Selection>,
) -> Selection {
  Selection::InlineFragment(InlineFragment {
    type_condition: type_condition.into(),
    selections:     selections.into_iter().collect(),
  })
}

impl Field {
  /// Attach a response alias.
  pub fn aliased(mut self, alias: impl Into<String>) -> Self {
    self.alias = Some(alias.into());
    self
  }

  /// Append one argument.
  pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
    self.arguments.push((name.into(), value));
    self
  }

  /// Append selections to the field's selection set.
  pub fn select(
    mut self,
    selections: impl IntoIterator<Item = Selection>,
  ) -> Self {
    self.selections.extend(selections);
    self
  }
}

impl From<Field> for Selection {
  fn from(field: Field) -> Self {
    Selection::Field(field)
  }
}

impl From<InlineFragment> for Selection {
  fn from(fragment: InlineFragment) -> Self {
    Selection::InlineFragment(fragment)
  }
}

impl Operation {
  pub fn query(
    name: impl Into<String>,
    selections: impl IntoIterator<Item = Selection>,
  ) -> Self {
    Self {
      name:       name.into(),
      selections: selections.into_iter().collect(),
    }
  }
}
