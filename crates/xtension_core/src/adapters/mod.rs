//! Typed wrappers over the host functions.
//!
//! Every adapter is a method on [`Host`](crate::Host). Adapters validate
//! their arguments, check handle state, acquire scoped buffers, call the
//! host through a fault guard, decode the output and apply the one
//! success/failure convention of the function they wrap. Each adapter's
//! documentation names that convention.

mod case;
mod container;
mod item;
mod output;
mod search;
mod volume;

pub use case::{CaseProperties, EvidenceProperties, HashValue, ReportTable};
pub use container::CopyRange;
pub use item::{Association, HashSlot, ItemOffsets, ItemType, RasterImage};
pub use output::Progress;
pub use search::{Event, SearchRequest};
pub use volume::{Block, SectorContents, VolumeInformation};

use crate::abi::{Bool, FALSE};

/// Win32 `BOOL` to `bool`.
pub(crate) fn truthy(value: Bool) -> bool {
    value != FALSE
}

/// Splits a host list delimited by ", ".
///
/// Entries are kept exactly as listed, surrounding whitespace included. An
/// empty listing has no entries.
pub(crate) fn split_list(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(", ").map(str::to_string).collect()
}
