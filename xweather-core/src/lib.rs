//! Client library for the Xweather lightning endpoints.
//!
//! This crate defines:
//! - Configuration (explicit values, plus an optional process-wide singleton)
//! - A request dispatcher that injects credentials and serves repeated requests
//!   from a read-through cache
//! - Typed queries for `lightning/` and `lightning/flash/`
//!
//! It is used by `xweather-cli`, but can also be embedded in other binaries or services.

pub mod cache;
pub mod cache_key;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod resource;
pub mod transport;

pub use cache::{CacheError, CacheStore, MemoryStore};
pub use client::{Client, ClientBuilder, install_cache_store};
pub use config::{Adapter, Configuration, configuration, configure};
pub use error::{Error, Result};
pub use model::{Credentials, ParamValue, QueryParams, RawResponse, Record, params};
pub use resource::{Lightning, LightningFlash, Resource, ResourceQuery};
pub use transport::{ReqwestTransport, Transport};
