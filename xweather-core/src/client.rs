//! Request dispatch with an optional read-through cache.
//!
//! Every request goes through [`Client::get`]:
//! 1. the transport is built once, lazily, from the endpoint and adapter the client was
//!    created with;
//! 2. the configured credentials are merged into the query;
//! 3. with caching active (config flag on and a [`CacheStore`] present) the request's
//!    cache key is looked up, and misses are fetched and stored through
//!    [`CacheStore::fetch_or_compute`];
//! 4. otherwise the request goes straight to the network.
//!
//! Cache store failures never fail a request: a failed read counts as a miss and a
//! failed `fetch_or_compute` falls back to a direct fetch.

use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheStore, ComputeFuture},
    cache_key::cache_key,
    config::{Configuration, configuration},
    error::{Error, Result},
    model::{Credentials, QueryParams, RawResponse, redacted},
    transport::{ReqwestTransport, Transport},
};

#[derive(Debug)]
pub struct Client {
    config: Configuration,
    credentials: Credentials,
    cache: Option<Arc<dyn CacheStore>>,
    transport: OnceCell<Arc<dyn Transport>>,
}

#[derive(Debug)]
pub struct ClientBuilder {
    config: Configuration,
    cache: Option<Arc<dyn CacheStore>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Store consulted when `cache` is enabled in the configuration.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Use this transport instead of building one from the endpoint and adapter.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Client {
        Client {
            credentials: self.config.credentials(),
            config: self.config,
            cache: self.cache,
            transport: OnceCell::new_with(self.transport),
        }
    }
}

impl Client {
    pub fn new(config: Configuration) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Configuration) -> ClientBuilder {
        ClientBuilder { config, cache: None, transport: None }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// The store in use, if caching is both enabled and possible.
    fn active_cache(&self) -> Option<&Arc<dyn CacheStore>> {
        if self.config.cache { self.cache.as_ref() } else { None }
    }

    pub fn cache_active(&self) -> bool {
        self.active_cache().is_some()
    }

    /// The shared connection, built on first use and reused afterwards.
    pub async fn connection(&self) -> Result<&Arc<dyn Transport>> {
        self.transport
            .get_or_try_init(|| async {
                debug!(
                    endpoint = %self.config.endpoint,
                    adapter = %self.config.adapter,
                    "opening Xweather connection"
                );
                let transport = ReqwestTransport::new(&self.config.endpoint, self.config.adapter)?;
                Ok::<_, Error>(Arc::new(transport) as Arc<dyn Transport>)
            })
            .await
    }

    /// GET `path` with the configured credentials, served from cache when possible.
    pub async fn get(&self, path: &str, params: &QueryParams) -> Result<RawResponse> {
        let transport = self.connection().await?;
        let merged = self.credentials.merge_into(params);

        let Some(store) = self.active_cache() else {
            return transport.get(path, &merged).await;
        };

        let key = cache_key(path, &merged);

        match store.read(&key).await {
            Ok(Some(hit)) => {
                info!("[Xweather] Cache HIT path {path}, params: {:?}", redacted(&merged));
                return Ok(hit);
            }
            Ok(None) => debug!(path, %key, "cache miss"),
            Err(e) => warn!("Cache read failed for path {path}, treating as a miss: {e}"),
        }

        let compute: ComputeFuture<'_> = transport.get(path, &merged);
        match store.fetch_or_compute(&key, self.config.cache_ttl(), compute).await {
            Err(e) if e.is_cache() => {
                warn!("Cache store failed for path {path}, fetching without cache: {e}");
                transport.get(path, &merged).await
            }
            other => other,
        }
    }

    /// Process-wide client built from [`configuration()`] on first call, together with
    /// the store registered through [`install_cache_store`] before that call.
    pub fn global() -> &'static Client {
        GLOBAL_CLIENT.get_or_init(|| with_store_slot(configuration(), &GLOBAL_STORE))
    }
}

type StoreSlot = OnceLock<Option<Arc<dyn CacheStore>>>;

static GLOBAL_CLIENT: OnceLock<Client> = OnceLock::new();
static GLOBAL_STORE: StoreSlot = OnceLock::new();

/// Builds a client with whatever store the slot holds, sealing the slot so later
/// installs are refused.
fn with_store_slot(config: Configuration, slot: &StoreSlot) -> Client {
    let builder = Client::builder(config);
    match slot.get_or_init(|| None) {
        Some(store) => builder.cache_store(store.clone()).build(),
        None => builder.build(),
    }
}

fn install_into(slot: &StoreSlot, store: Arc<dyn CacheStore>) -> bool {
    slot.set(Some(store)).is_ok()
}

/// Register the cache store for [`Client::global`].
///
/// Returns `false`, leaving the store unused, if a store was already installed or the
/// global client has already been built.
pub fn install_cache_store(store: Arc<dyn CacheStore>) -> bool {
    install_into(&GLOBAL_STORE, store)
}
