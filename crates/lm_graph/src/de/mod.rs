//! The read path.

mod coerce;
pub(crate) mod fixup;
mod reader;

pub use fixup::DrainReport;
pub(crate) use fixup::Slot;
pub(crate) use reader::Rehydrator;
