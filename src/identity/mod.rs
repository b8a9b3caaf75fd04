//! Identity maps and cross-source deduplication

mod dedup;
mod map;

pub use dedup::split_common;
pub use map::IdentityMap;
