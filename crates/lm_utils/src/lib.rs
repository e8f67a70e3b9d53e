//! Shared containers for the `lm` workspace.
//!
//! - [`hash`]: hash containers with a fixed seed, so iteration and hash
//!   results only depend on the input.
//! - [`TypeIdMap`]: a map keyed by [`TypeId`](core::any::TypeId).
//! - [`PtrMap`]: an identity map keyed by allocation address.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

// -----------------------------------------------------------------------------
// No STD Support

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod ptr_map;
mod typeid_map;

pub mod hash;

// -----------------------------------------------------------------------------
// Top-level exports

pub use ptr_map::PtrMap;
pub use typeid_map::TypeIdMap;
