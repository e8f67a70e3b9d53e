//! Object-graph serialization over runtime type descriptors.
//!
//! Graphs of [`Value`](value::Value)s, with shared nodes and cycles, are
//! written to a compact binary or a readable text stream and rebuilt with
//! their identity structure intact.
//!
//! ## Menu
//!
//! - [`registry`]: type descriptors, handlers, factories and hooks.
//! - [`value`]: the runtime values the engine walks.
//! - [`Serializer`]: serialize, deserialize, checksum and deep clone.
//! - [`storage`]: the binary and text codecs.
//! - [`Settings`]: codec choice, verbosity and prewarmed tables.
//!
//! ## Streams
//!
//! A stream starts with a header carrying the format version, flags, and
//! the type and name tables referenced by the payload. Every object is
//! written once per stream; later encounters are back-references by id.
//! Values the reader cannot produce on the spot, typically objects built
//! by a custom handler from a payload that refers forward, are linked in
//! a deferred fixup phase.
//!
//! Handlers may ask for an isolated payload. It is written as a nested
//! stream with its own tables and ids, so it can be read on its own.

// -----------------------------------------------------------------------------
// Extern crates

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod construct;
mod de;
mod engine;
mod error;
mod scope;
mod ser;
mod settings;
mod statics;
mod tables;

pub mod access;
pub mod info;
pub mod registry;
pub mod storage;
pub mod value;

#[cfg(test)]
mod tests;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use de::DrainReport;
pub use engine::{Checksum, Serializer, Staged};
pub use error::{FieldAssignmentError, GraphError, HandlerError};
pub use settings::{Codec, Prewarm, Settings};
pub use statics::Statics;

#[cfg(feature = "auto_register")]
pub use inventory;
