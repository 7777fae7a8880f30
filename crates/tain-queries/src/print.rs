//! GraphQL wire-text printing.
//!
//! Output is deterministic: two-space indentation, one selection per line,
//! arguments inline. Strings are escaped per the GraphQL spec (backslash,
//! quote, and control characters).

use std::fmt::{self, Display, Write as _};

use crate::{Field, InlineFragment, Operation, Selection, Value};

impl Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "query {} {{", self.name)?;
    for selection in &self.selections {
      selection.fmt_indented(f, 1)?;
    }
    write!(f, "}}")
  }
}

impl Display for Selection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.fmt_indented(f, 0)
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Int(n) => write!(f, "{n}"),
      Value::Boolean(b) => write!(f, "{b}"),
      Value::String(s) => write_string_literal(f, s),
      Value::Enum(e) => write!(f, "{e}"),
      Value::List(values) => {
        write!(f, "[")?;
        for (i, v) in values.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          v.fmt(f)?;
        }
        write!(f, "]")
      }
      Value::Variable(name) => write!(f, "${name}"),
    }
  }
}

impl Selection {
  fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    match self {
      Selection::Field(field) => field.fmt_indented(f, depth),
      Selection::InlineFragment(fragment) => fragment.fmt_indented(f, depth),
    }
  }
}

impl Field {
  fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    indent(f, depth)?;
    if let Some(alias) = &self.alias {
      write!(f, "{alias}: ")?;
    }
    write!(f, "{}", self.name)?;
    if !self.arguments.is_empty() {
      write!(f, "(")?;
      for (i, (name, value)) in self.arguments.iter().enumerate() {
        if i > 0 {
          write!(f, ", ")?;
        }
        write!(f, "{name}: {value}")?;
      }
      write!(f, ")")?;
    }
    finish_selection_set(f, depth, &self.selections)
  }
}

impl InlineFragment {
  fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    indent(f, depth)?;
    write!(f, "... on {}", self.type_condition)?;
    finish_selection_set(f, depth, &self.selections)
  }
}

fn finish_selection_set(
  f: &mut fmt::Formatter<'_>,
  depth: usize,
  selections: &[Selection],
) -> fmt::Result {
  if selections.is_empty() {
    return writeln!(f);
  }
  writeln!(f, " {{")?;
  for selection in selections {
    selection.fmt_indented(f, depth + 1)?;
  }
  indent(f, depth)?;
  writeln!(f, "}}")
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
  for _ in 0..depth {
    f.write_str("  ")?;
  }
  Ok(())
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
  f.write_char('"')?;
  for c in s.chars() {
    match c {
      '"' => f.write_str("\\\"")?,
      '\\' => f.write_str("\\\\")?,
      '\n' => f.write_str("\\n")?,
      '\r' => f.write_str("\\r")?,
      '\t' => f.write_str("\\t")?,
      c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
      c => f.write_char(c)?,
    }
  }
  f.write_char('"')
}

// ─── Tests ───────────────────────────────────────────────────────────────────
