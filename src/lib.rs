//! Object-graph persistence for dynamically described types.
//!
//! This is a thin facade over the workspace crates:
//!
//! - [`utils`]: hash containers and identity maps.
//! - [`graph`]: the type registry, graph walker, rehydrator and storage codecs.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use lm_graph as graph;
pub use lm_utils as utils;
