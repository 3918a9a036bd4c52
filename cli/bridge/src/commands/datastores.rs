use std::collections::BTreeMap;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use bridge_rust_sdk::models::workspace::WorkspaceName;
use tracing::instrument;

use super::open_server;
use crate::config::Config;
use crate::utils::message;

// List the PostGIS datastores of a GeoServer
#[derive(Bpaf, Clone)]
pub struct Datastores {
    /// GeoServer to query, as named in the configuration
    #[bpaf(long, short, argument("NAME"))]
    server: Option<String>,

    /// Print the datastores as a JSON array
    #[bpaf(long)]
    json: bool,
}

impl Datastores {
    #[instrument(name = "datastores", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let server = open_server(
            &config,
            self.server.as_deref(),
            WorkspaceName::default(),
            BTreeMap::new(),
        )?;

        let datastores = server
            .postgis_datastores()
            .await
            .with_context(|| format!("Could not list the datastores of '{}'", server.name()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&datastores)?);
            return Ok(());
        }

        if datastores.is_empty() {
            message::plain(format!("GeoServer '{}' has no PostGIS datastores", server.name()));
            return Ok(());
        }
        for datastore in datastores {
            println!("{datastore}");
        }
        Ok(())
    }
}
