//! Inkleaf cache library
//!
//! Windowed page bitmap cache with an optional memory budget.

pub mod config;
pub mod page_cache;

pub use config::CacheConfig;
pub use page_cache::{CacheStats, CachedPage, PageCache};
