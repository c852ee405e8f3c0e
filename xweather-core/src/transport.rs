use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use std::fmt::Debug;
use tracing::debug;

use crate::{
    config::Adapter,
    error::{Error, Result, truncate_body},
    model::{QueryParams, RawResponse},
};

/// The network half of the client: one GET against the configured endpoint.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn get(&self, path: &str, params: &QueryParams) -> Result<RawResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base: Url,
    http: HttpClient,
}

impl ReqwestTransport {
    pub fn new(endpoint: &str, adapter: Adapter) -> Result<Self> {
        let base = parse_endpoint(endpoint)?;

        let builder = HttpClient::builder().user_agent(concat!(
            "xweather-rs/",
            env!("CARGO_PKG_VERSION")
        ));
        let builder = match adapter {
            Adapter::Default => builder,
            Adapter::Http1 => builder.http1_only(),
        };

        Ok(Self { base, http: builder.build()? })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base.join(path.trim_start_matches('/')).map_err(|e| Error::InvalidEndpoint {
            endpoint: format!("{}{}", self.base, path),
            reason: e.to_string(),
        })
    }
}

/// Relative paths must append to the endpoint, so it always ends with `/`.
fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let normalized =
        if endpoint.ends_with('/') { endpoint.to_string() } else { format!("{endpoint}/") };

    let url = Url::parse(&normalized).map_err(|e| Error::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(Error::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "endpoint cannot be used as a base URL".to_string(),
        });
    }

    Ok(url)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, path: &str, params: &QueryParams) -> Result<RawResponse> {
        let url = self.url_for(path)?;
        let query: Vec<(&str, String)> =
            params.iter().map(|(k, v)| (k.as_str(), v.to_string())).collect();

        debug!(%url, "sending Xweather request");

        let res = self.http.get(url).query(&query).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(Error::Status { status: status.as_u16(), body: truncate_body(&body) });
        }

        Ok(RawResponse { status: status.as_u16(), body })
    }
}
