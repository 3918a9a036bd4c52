use std::collections::BTreeMap;

use anyhow::{Result, bail};
use bpaf::Bpaf;
use bridge_rust_sdk::models::validation::ValidationErrors;
use bridge_rust_sdk::models::workspace::WorkspaceName;
use tracing::instrument;

use super::open_server;
use crate::config::Config;
use crate::utils::message;

// Check that a GeoServer is reachable
#[derive(Bpaf, Clone)]
pub struct TestConnection {
    /// GeoServer to connect to, as named in the configuration
    #[bpaf(long, short, argument("NAME"))]
    server: Option<String>,
}

impl TestConnection {
    #[instrument(name = "test-connection", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let server = open_server(
            &config,
            self.server.as_deref(),
            WorkspaceName::default(),
            BTreeMap::new(),
        )?;

        if !server.test_connection().await {
            bail!(
                "Could not connect to GeoServer '{}' at {}",
                server.name(),
                server.client().rest_url()
            );
        }

        let mut errors = ValidationErrors::default();
        server.check_min_geoserver_version(&mut errors).await;
        for error in errors.iter() {
            message::warning(error);
        }

        message::updated(format!(
            "Connected to GeoServer '{}' at {}",
            server.name(),
            server.client().rest_url()
        ));
        Ok(())
    }
}
