//! Bounded company cache

mod key;
mod store;

pub use key::{CacheKey, CacheKeyMode};
pub use store::{CacheStats, CompanyCache};
