//! Shared HTTP client infrastructure for the GeoServer REST API.
//!
//! This crate provides:
//! - HTTP client construction with basic authentication
//! - Uniform mapping of transport errors and non-success statuses
//! - Serde types for the REST resources exchanged while publishing
//!
//! ## Usage
//!
//! ```ignore
//! use geoserver_client::{GeoserverClient, GeoserverClientConfig};
//!
//! let config = GeoserverClientConfig::new("http://localhost:8080/geoserver")
//!     .with_credentials("admin", "geoserver");
//! let client = GeoserverClient::new(config)?;
//! let about: serde_json::Value = client.get_json(&client.endpoint("about/version.json")).await?;
//! ```

mod client;
mod config;
mod error;
pub mod types;

pub use client::{
    CONTENT_TYPE_OCTET_STREAM,
    CONTENT_TYPE_ZIP,
    GeoserverClient,
    RequestBody,
    RestResponse,
};
pub use config::{GeoserverClientConfig, normalize_rest_url};
pub use error::{GeoserverClientError, MapResponseErrorExt};
pub use reqwest::{Method, StatusCode};
