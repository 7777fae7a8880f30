//! A durable, incremental, locally persisted mirror of a subset of a remote
//! GraphQL object graph.
//!
//! Given a [`tain_schema::Schema`] and one or more registered root objects,
//! [`Mirror::update`] repeatedly plans one batched GraphQL query for
//! everything that is out of date, posts it through a caller-supplied
//! [`Transport`], and ingests the response transactionally. [`Mirror::extract`]
//! then materializes any object and its transitive dependencies as a plain
//! structured value (possibly cyclic).
//!
//! All database access runs on `tokio_rusqlite`'s dedicated thread, so the
//! async runtime is never blocked; no database transaction ever spans the
//! transport await.

mod engine;
mod extract;
mod init;
mod ingest;
mod outdated;
mod planner;
mod register;
mod sql;
mod store;
mod update;

pub mod error;

pub use engine::ObjectId;
pub use error::{Error, Result};
pub use extract::{ExtractedGraph, ExtractedObject, ExtractedValue};
pub use store::{Mirror, MirrorOptions};
pub use update::{QueryPayload, Transport, UpdateOptions};
