use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Result, bail};
use bpaf::Bpaf;
use bridge_rust_sdk::providers::geoserver::Existence;
use bridge_rust_sdk::providers::session::LayerCache;
use tracing::instrument;

use super::{SHELL_COMPLETION_FILE, load_project, open_server};
use crate::config::Config;
use crate::utils::{display_chain, message};

// Remove published layers and their styles
#[derive(Bpaf, Clone)]
pub struct Unpublish {
    /// GeoServer to remove layers from, as named in the configuration
    #[bpaf(long, short, argument("NAME"))]
    server: Option<String>,

    /// Remove only the layer with this name, may be repeated
    #[bpaf(long("layer"), short('l'), argument("NAME"), many)]
    layers: Vec<String>,

    /// Project file whose layers are removed
    #[bpaf(positional("PROJECT"), complete_shell(SHELL_COMPLETION_FILE))]
    project: PathBuf,
}

impl Unpublish {
    #[instrument(name = "unpublish", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let project = load_project(&config, &self.project)?;
        let server = open_server(
            &config,
            self.server.as_deref(),
            project.workspace.clone(),
            BTreeMap::new(),
        )?;

        let selected = project.select_layers(&self.layers);
        if selected.is_empty() {
            bail!("No layers to unpublish in '{}'", self.project.display());
        }

        let mut layers = LayerCache::default();
        let mut failed = 0;
        for layer in selected {
            let name = layer.layer.name();
            // an unreachable listing still attempts the delete
            if server.layer_existence(&mut layers, &name).await == Existence::NotFound {
                message::plain(format!(
                    "Layer '{}' is not published",
                    server.full_layer_name(&name)
                ));
                continue;
            }
            match server.unpublish_data(&mut layers, &name).await {
                Ok(()) => message::deleted(format!(
                    "Removed layer '{}'",
                    server.full_layer_name(&name)
                )),
                Err(err) => {
                    message::error(format!(
                        "Could not remove layer '{}': {}",
                        server.full_layer_name(&name),
                        display_chain(&err)
                    ));
                    failed += 1;
                },
            }
        }

        if failed > 0 {
            bail!("{failed} layer(s) could not be removed from '{}'", server.name());
        }
        Ok(())
    }
}
