//! Backendify Upstream Proxy
//!
//! This crate provides the transport used to reach per-country company
//! registry backends: the [`CompanySource`] seam, the reqwest-backed
//! [`BackendClient`] and an in-process [`MockBackend`].

pub mod client;
pub mod error;
pub mod mock;

pub use client::{BackendClient, BackendClientConfig, BackendResponse, CompanySource};
pub use error::ProxyError;
pub use mock::MockBackend;
