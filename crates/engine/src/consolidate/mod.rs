//! Merging heterogeneous provider payloads into canonical sections.

mod consolidator;

pub use consolidator::{relative_spread, Consolidated, ConsolidationPolicy, ResponseConsolidator};
