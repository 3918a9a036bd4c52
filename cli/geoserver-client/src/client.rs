//! Authenticated REST client for the GeoServer REST API.

use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{self, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{GeoserverClientConfig, normalize_rest_url};
use crate::error::{GeoserverClientError, MapResponseErrorExt};

pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// Body of a REST request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Bytes {
        data: Vec<u8>,
        content_type: &'static str,
    },
    /// A single file sent as `multipart/form-data`, as expected by
    /// upload endpoints such as the Importer task resource.
    File { file_name: String, data: Vec<u8> },
}

impl RequestBody {
    pub fn json(value: &(impl Serialize + ?Sized)) -> Result<Self, GeoserverClientError> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(GeoserverClientError::Encode)
    }
}

/// A successful REST response with its body fully read.
#[derive(Debug, Clone)]
pub struct RestResponse {
    url: String,
    status: StatusCode,
    body: Vec<u8>,
}

impl RestResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GeoserverClientError> {
        serde_json::from_slice(&self.body).map_err(|source| GeoserverClientError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}

/// A client for the GeoServer REST API.
///
/// Every request is authenticated with HTTP basic auth (if credentials are
/// configured) and asks for JSON responses. Non-success statuses are mapped
/// to [GeoserverClientError::Status] uniformly, so callers can decide
/// per operation whether e.g. a `404` is acceptable.
#[derive(Clone)]
pub struct GeoserverClient {
    http: reqwest::Client,
    config: GeoserverClientConfig,
    rest_url: String,
}

impl Debug for GeoserverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoserverClient")
            .field("rest_url", &self.rest_url)
            .field("username", &self.config.username)
            .finish_non_exhaustive()
    }
}

impl GeoserverClient {
    /// Create a new client from configuration.
    pub fn new(config: GeoserverClientConfig) -> Result<Self, GeoserverClientError> {
        let rest_url = normalize_rest_url(&config.url);
        url::Url::parse(&rest_url).map_err(|source| GeoserverClientError::InvalidUrl {
            url: config.url.clone(),
            source,
        })?;

        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            config,
            rest_url,
        })
    }

    /// The REST root, e.g. `https://host/geoserver/rest`.
    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    /// The web application root, e.g. `https://host/geoserver`.
    pub fn base_url(&self) -> &str {
        self.rest_url
            .strip_suffix("/rest")
            .unwrap_or(&self.rest_url)
    }

    /// Build an absolute URL for a path below the REST root.
    pub fn endpoint(&self, path: impl Display) -> String {
        let path = path.to_string();
        format!("{}/{}", self.rest_url, path.trim_start_matches('/'))
    }

    /// Send a request and read the full response.
    ///
    /// `url` is absolute, so `href`s returned by GeoServer can be followed as is.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<RestResponse, GeoserverClientError> {
        debug!(%method, %url, "sending GeoServer request");

        let mut builder = self.http.request(method.clone(), url);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes { data, content_type } => builder
                .header(header::CONTENT_TYPE, content_type)
                .body(data),
            RequestBody::File { file_name, data } => {
                let part = Part::bytes(data)
                    .file_name(file_name.clone())
                    .mime_str(CONTENT_TYPE_OCTET_STREAM)
                    .map_err(|source| GeoserverClientError::Transport {
                        method: method.clone(),
                        url: url.to_string(),
                        source,
                    })?;
                builder.multipart(Form::new().part(file_name, part))
            },
        };

        let response = builder
            .send()
            .await
            .map_response_error(&method, url)
            .await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| GeoserverClientError::Transport {
                method: method.clone(),
                url: url.to_string(),
                source,
            })?
            .to_vec();

        debug!(%method, %url, %status, "received GeoServer response");

        Ok(RestResponse {
            url: url.to_string(),
            status,
            body,
        })
    }

    pub async fn get(&self, url: &str) -> Result<RestResponse, GeoserverClientError> {
        self.request(Method::GET, url, RequestBody::Empty).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GeoserverClientError> {
        self.get(url).await?.json()
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<RestResponse, GeoserverClientError> {
        self.request(Method::POST, url, RequestBody::json(body)?)
            .await
    }

    pub async fn put_json(
        &self,
        url: &str,
        body: &(impl Serialize + ?Sized),
    ) -> Result<RestResponse, GeoserverClientError> {
        self.request(Method::PUT, url, RequestBody::json(body)?)
            .await
    }

    pub async fn post_empty(&self, url: &str) -> Result<RestResponse, GeoserverClientError> {
        self.request(Method::POST, url, RequestBody::Empty).await
    }

    pub async fn delete(&self, url: &str) -> Result<RestResponse, GeoserverClientError> {
        self.request(Method::DELETE, url, RequestBody::Empty).await
    }
}

/// Build HTTP client with JSON defaults and any configured extra headers.
fn build_http_client(
    config: &GeoserverClientConfig,
) -> Result<reqwest::Client, GeoserverClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    for (key, value) in &config.extra_headers {
        headers.insert(
            header::HeaderName::from_str(key)
                .map_err(|_| GeoserverClientError::InvalidHeader(key.clone()))?,
            header::HeaderValue::from_str(value)
                .map_err(|_| GeoserverClientError::InvalidHeader(key.clone()))?,
        );
    }

    debug!(
        url = %config.url,
        has_credentials = config.username.is_some(),
        extra_headers = config.extra_headers.len(),
        "building GeoServer HTTP client"
    );

    let client_builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(300));

    let client_builder = if let Some(ref user_agent) = config.user_agent {
        client_builder.user_agent(user_agent)
    } else {
        client_builder
    };

    client_builder.build().map_err(GeoserverClientError::Client)
}
