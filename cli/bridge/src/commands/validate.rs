use std::path::PathBuf;

use anyhow::{Result, bail};
use bpaf::Bpaf;
use bridge_rust_sdk::models::validation::ValidationErrors;
use tracing::instrument;

use super::{SHELL_COMPLETION_FILE, load_project, open_server};
use crate::config::Config;
use crate::utils::message;

// Check whether a project can be published
#[derive(Bpaf, Clone)]
pub struct Validate {
    /// GeoServer to check against, as named in the configuration
    #[bpaf(long, short, argument("NAME"))]
    server: Option<String>,

    /// Check for publishing styles only
    #[bpaf(long)]
    only_symbology: bool,

    /// Project file describing the layers to publish
    #[bpaf(positional("PROJECT"), complete_shell(SHELL_COMPLETION_FILE))]
    project: PathBuf,
}

impl Validate {
    #[instrument(name = "validate", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let project = load_project(&config, &self.project)?;
        let server = open_server(
            &config,
            self.server.as_deref(),
            project.workspace.clone(),
            project.styles(),
        )?;

        let names = project
            .layers
            .iter()
            .map(|layer| layer.layer.name())
            .collect::<Vec<_>>();
        let mut errors = ValidationErrors::default();
        server
            .validate_geodata_before_publication(
                &mut errors,
                &names,
                self.only_symbology,
                |workspace| {
                    message::warning(format!(
                        "Publishing deletes the existing layers of workspace '{workspace}'"
                    ));
                    true
                },
            )
            .await;

        for layer in project.layers.iter().filter(|layer| layer.style.is_none()) {
            errors.add(format!("Layer '{}' has no style", layer.layer.title));
        }

        if !errors.is_empty() {
            for error in errors.iter() {
                message::error(error);
            }
            bail!(
                "Found {} problem(s) publishing '{}' to '{}'",
                errors.len(),
                self.project.display(),
                server.name()
            );
        }

        message::updated(format!(
            "Project '{}' can be published to '{}' as workspace '{}'",
            self.project.display(),
            server.name(),
            server.workspace()
        ));
        Ok(())
    }
}
