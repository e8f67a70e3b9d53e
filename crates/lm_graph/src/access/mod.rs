//! Member accessors and their per-type cache.
//!
//! An [`Accessor`] is a pre-resolved handle to one serializable member: its
//! layout index, declared type, write priority and optional specialist.
//! The list of accessors for a type depends on the member kind, on whether
//! a checksum is being computed, and on whether the type was already seen
//! in the current stream; each combination is built once and shared.

// -----------------------------------------------------------------------------
// Modules

mod accessor;
mod cache;

// -----------------------------------------------------------------------------
// Exports

pub use accessor::{AccessMode, Accessor};

pub(crate) use cache::{AccessKey, AccessorCache};
