//! # Result Caching
//!
//! In-memory, tag-invalidated store for computed reports.

pub mod result_cache;
pub mod stats;

pub use result_cache::{CacheEntry, ResultCache};
pub use stats::CacheStats;
