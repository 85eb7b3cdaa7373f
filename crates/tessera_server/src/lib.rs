//! Boundary collaborators for the tessera engine.
//!
//! A single server process hosts:
//! - the REST surface for single-row ingest, batch ingest, and querying,
//! - the ingest bus consumer with ack-on-success semantics,
//! - tenant and schema bootstrap for standalone operation.
//!
//! The engine does the actual work; everything here is a thin adapter that
//! translates transport concerns (status codes, acknowledgements, startup
//! configuration) onto engine calls.

pub mod bootstrap;
pub mod consumer;
pub mod http;
