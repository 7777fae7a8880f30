//! Error type for `tain-schema`.

use thiserror::Error;

use crate::types::{Fieldname, Typename};

#[derive(Debug, Error)]
pub enum Error {
  #[error("type {0:?} is not declared in the schema")]
  UnknownType(Typename),

  #[error("object type {0:?} has no id field")]
  NoIdField(Typename),

  #[error("object type {typename:?} has multiple id fields: {first:?} and {second:?}")]
  MultipleIdFields {
    typename: Typename,
    first:    Fieldname,
    second:   Fieldname,
  },

  #[error(
    "field {typename:?}.{fieldname:?} references {element_type:?}, \
     which is not an object or union type"
  )]
  BadElementType {
    typename:     Typename,
    fieldname:    Fieldname,
    element_type: Typename,
  },

  #[error("union {union:?} has non-object clause {clause:?}")]
  BadUnionClause { union: Typename, clause: Typename },

  #[error("unfaithful fields are not yet implemented: {typename:?}.{fieldname:?}")]
  Unfaithful {
    typename:  Typename,
    fieldname: Fieldname,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
