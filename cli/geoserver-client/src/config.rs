//! Configuration types for GeoServer client construction.

use std::collections::BTreeMap;

/// Configuration for [crate::GeoserverClient] construction.
#[derive(Debug, Clone, Default)]
pub struct GeoserverClientConfig {
    /// URL of the GeoServer instance.
    ///
    /// Either the web application root (`https://host/geoserver`)
    /// or the REST root (`https://host/geoserver/rest`).
    pub url: String,
    /// Username for HTTP basic authentication.
    pub username: Option<String>,
    /// Password for HTTP basic authentication.
    pub password: Option<String>,
    /// Additional headers to include in requests.
    pub extra_headers: BTreeMap<String, String>,
    /// Custom user agent, defaults to reqwest's.
    pub user_agent: Option<String>,
}

impl GeoserverClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// Strip trailing slashes and make sure the URL points at the REST root.
pub fn normalize_rest_url(url: &str) -> String {
    let mut url = url.trim().trim_end_matches('/').to_string();
    if !url.ends_with("/rest") {
        url.push_str("/rest");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_rest_suffix() {
        assert_eq!(
            normalize_rest_url("http://localhost:8080/geoserver"),
            "http://localhost:8080/geoserver/rest"
        );
        assert_eq!(
            normalize_rest_url("http://localhost:8080/geoserver/"),
            "http://localhost:8080/geoserver/rest"
        );
    }

    #[test]
    fn keeps_existing_rest_suffix() {
        assert_eq!(
            normalize_rest_url("http://localhost:8080/geoserver/rest//"),
            "http://localhost:8080/geoserver/rest"
        );
    }
}
