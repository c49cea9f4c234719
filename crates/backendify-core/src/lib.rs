//! Backendify Core
//!
//! This crate provides the fetch subsystem of the gateway: the backend
//! registry, the dialect normalizer, the bounded company cache, the worker
//! pool behind [`FetchEngine`] and the [`AdmissionGate`] in front of it.

pub mod cache;
pub mod engine;
pub mod error;
pub mod gate;
pub mod model;
pub mod protocol;
pub mod registry;

pub use cache::{CacheKey, CacheKeyMode, CacheStats, CompanyCache};
pub use engine::{EngineConfig, FetchEngine};
pub use error::{FetchError, NormalizeError, RegistryError};
pub use gate::{AdmissionGate, AdmissionToken};
pub use model::Company;
pub use protocol::{Dialect, normalize, normalize_now};
pub use registry::{BackendRegistry, parse_backend_arg};
