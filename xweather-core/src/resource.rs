//! Lightning endpoints.
//!
//! ```no_run
//! # async fn run() -> xweather_core::Result<()> {
//! use xweather_core::{Client, Configuration, QueryParams};
//!
//! let client = Client::new(Configuration {
//!     client_id: Some("id".into()),
//!     client_secret: Some("secret".into()),
//!     ..Configuration::default()
//! });
//!
//! let strikes = client.lightning().by_coords(37.7749, -122.4194, &QueryParams::new()).await?;
//! let flashes = client.lightning_flash().by_id("san francisco,ca", &QueryParams::new()).await?;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::fmt::Display;

use crate::{
    client::Client,
    error::{Error, Result},
    model::{QueryParams, Record},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Lightning,
    LightningFlash,
}

impl Resource {
    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Lightning => "lightning/",
            Resource::LightningFlash => "lightning/flash/",
        }
    }

    pub fn path_for(&self, id: &str) -> String {
        format!("{}{id}", self.segment())
    }
}

/// Queries against one lightning resource through a borrowed [`Client`].
#[derive(Debug, Clone, Copy)]
pub struct ResourceQuery<'a> {
    client: &'a Client,
    resource: Resource,
}

impl<'a> ResourceQuery<'a> {
    pub fn new(client: &'a Client, resource: Resource) -> Self {
        Self { client, resource }
    }

    /// `id` is anything the service accepts: "lat,lon", a place name, a postal code.
    /// It is sent unvalidated.
    pub async fn by_id(&self, id: &str, options: &QueryParams) -> Result<Vec<Record>> {
        let response = self.client.get(&self.resource.path_for(id), options).await?;
        decode_records(&response.body)
    }

    pub async fn by_coords(
        &self,
        lat: impl Display,
        lon: impl Display,
        options: &QueryParams,
    ) -> Result<Vec<Record>> {
        self.by_id(&coords_id(lat, lon), options).await
    }
}

impl Client {
    pub fn lightning(&self) -> ResourceQuery<'_> {
        ResourceQuery::new(self, Resource::Lightning)
    }

    pub fn lightning_flash(&self) -> ResourceQuery<'_> {
        ResourceQuery::new(self, Resource::LightningFlash)
    }
}

/// Lightning strikes through [`Client::global`].
#[derive(Debug, Clone, Copy)]
pub struct Lightning;

impl Lightning {
    pub async fn by_id(id: &str, options: &QueryParams) -> Result<Vec<Record>> {
        Client::global().lightning().by_id(id, options).await
    }

    pub async fn by_coords(
        lat: impl Display,
        lon: impl Display,
        options: &QueryParams,
    ) -> Result<Vec<Record>> {
        Client::global().lightning().by_coords(lat, lon, options).await
    }
}

/// Lightning flashes through [`Client::global`].
#[derive(Debug, Clone, Copy)]
pub struct LightningFlash;

impl LightningFlash {
    pub async fn by_id(id: &str, options: &QueryParams) -> Result<Vec<Record>> {
        Client::global().lightning_flash().by_id(id, options).await
    }

    pub async fn by_coords(
        lat: impl Display,
        lon: impl Display,
        options: &QueryParams,
    ) -> Result<Vec<Record>> {
        Client::global().lightning_flash().by_coords(lat, lon, options).await
    }
}

pub(crate) fn coords_id(lat: impl Display, lon: impl Display) -> String {
    format!("{lat},{lon}")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Records(Vec<Record>),
    Envelope(Envelope),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    response: Option<EnvelopeResponse>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvelopeResponse {
    Many(Vec<Record>),
    One(Record),
}

/// Accepts a bare array of objects or the `{success, error, response}` envelope.
pub(crate) fn decode_records(body: &str) -> Result<Vec<Record>> {
    match serde_json::from_str::<Payload>(body)? {
        Payload::Records(records) => Ok(records),
        Payload::Envelope(Envelope { success: false, error: Some(error), .. }) => {
            Err(Error::Api { code: error.code, description: error.description })
        }
        Payload::Envelope(envelope) => Ok(match envelope.response {
            Some(EnvelopeResponse::Many(records)) => records,
            Some(EnvelopeResponse::One(record)) => vec![record],
            None => Vec::new(),
        }),
    }
}
