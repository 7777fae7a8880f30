//! Schema descriptor for the tain GraphQL mirror.
//!
//! This crate is deliberately free of database and network dependencies.
//! It defines the closed sum types that describe a remote GraphQL schema
//! ([`Type`], [`FieldType`]) and the compiled form the mirror engine
//! consumes ([`SchemaInfo`]), in which every object type's fields have been
//! partitioned by storage shape.
//!
//! A schema serializes canonically (all maps are ordered), so its JSON
//! encoding can participate in an on-disk compatibility fingerprint.

pub mod error;
pub mod info;
pub mod types;

pub use error::{Error, Result};
pub use info::{
  ConnectionField, LinkField, NestedField, ObjectInfo, SchemaInfo, UnionInfo,
};
pub use types::{
  connection, egg_node, egg_primitive, enumeration, id, nested, node, object,
  primitive, scalar, unfaithful_egg_node, unfaithful_node, union, EggType,
  FieldType, Fidelity, Fieldname, Schema, Type, Typename,
};
