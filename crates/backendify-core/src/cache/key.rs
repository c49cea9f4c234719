//! Cache key construction

use serde::{Deserialize, Serialize};
use std::fmt;

/// How cache entries are keyed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKeyMode {
    /// Company id only. Two backends reusing an id share one entry.
    #[default]
    Id,
    /// Backend origin plus company id
    OriginAndId,
}

impl CacheKeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKeyMode::Id => "id",
            CacheKeyMode::OriginAndId => "origin_and_id",
        }
    }

    /// Build the key for a lookup of `id` against `origin`
    pub fn key(&self, origin: &str, id: &str) -> CacheKey {
        match self {
            CacheKeyMode::Id => CacheKey::id(id),
            CacheKeyMode::OriginAndId => CacheKey {
                origin: Some(origin.to_string()),
                id: id.to_string(),
            },
        }
    }
}

/// Key of a cached company
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    origin: Option<String>,
    id: String,
}

impl CacheKey {
    /// Key by company id alone
    pub fn id(id: &str) -> Self {
        Self {
            origin: None,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{}@{}", self.id, origin),
            None => f.write_str(&self.id),
        }
    }
}
