use std::path::PathBuf;

use anyhow::{Result, bail};
use bpaf::Bpaf;
use bridge_rust_sdk::models::layer::{EXTENT_DECIMALS, Extent};
use bridge_rust_sdk::models::validation::ValidationErrors;
use bridge_rust_sdk::models::workspace::WorkspaceName;
use bridge_rust_sdk::providers::geoserver::GeoserverServer;
use bridge_rust_sdk::providers::publish::{PublishError, PublishOutcome};
use bridge_rust_sdk::providers::session::PublishSession;
use indexmap::IndexMap;
use tracing::instrument;

use super::{SHELL_COMPLETION_FILE, load_project, open_server};
use crate::config::Config;
use crate::project::ProjectLayer;
use crate::utils::{display_chain, message};

// Publish the layers of a project
#[derive(Bpaf, Clone)]
pub struct Publish {
    /// GeoServer to publish to, as named in the configuration
    #[bpaf(long, short, argument("NAME"))]
    pub(crate) server: Option<String>,

    /// Publish only the layer with this name, may be repeated
    #[bpaf(long("layer"), short('l'), argument("NAME"), many)]
    pub(crate) layers: Vec<String>,

    /// Only publish styles, layer data on the server is kept
    #[bpaf(long)]
    pub(crate) only_symbology: bool,

    /// Publish layers read from PostGIS tables from their original database
    #[bpaf(long)]
    pub(crate) use_original_data_source: bool,

    /// Overwrite existing layers of the workspace without asking
    #[bpaf(long, short)]
    pub(crate) yes: bool,

    /// Project file describing the layers to publish
    #[bpaf(positional("PROJECT"), complete_shell(SHELL_COMPLETION_FILE))]
    pub(crate) project: PathBuf,
}

/// How publishing a single layer ended.
#[derive(Debug)]
enum LayerResult {
    Done(PublishOutcome),
    StyleOnly,
    Failed(PublishError),
}

impl Publish {
    #[instrument(name = "publish", skip_all)]
    pub async fn handle(self, config: Config) -> Result<()> {
        let project = load_project(&config, &self.project)?;
        let mut server = open_server(
            &config,
            self.server.as_deref(),
            project.workspace.clone(),
            project.styles(),
        )?;
        if self.use_original_data_source {
            server.set_use_original_data_source(true);
        }

        let selected = project.select_layers(&self.layers);
        if selected.is_empty() {
            bail!("No layers to publish in '{}'", self.project.display());
        }
        let names = selected
            .iter()
            .map(|layer| layer.layer.name())
            .collect::<Vec<_>>();

        let mut errors = ValidationErrors::default();
        let confirmed = self.yes;
        let confirm_overwrite = |workspace: &WorkspaceName| {
            if !confirmed {
                message::warning(format!(
                    "Publishing deletes the existing layers of workspace '{workspace}', \
                     use '--yes' to overwrite it"
                ));
            }
            confirmed
        };
        server
            .validate_geodata_before_publication(
                &mut errors,
                &names,
                self.only_symbology,
                confirm_overwrite,
            )
            .await;
        if !errors.is_empty() {
            for error in errors.iter() {
                message::error(error);
            }
            bail!("Project cannot be published to '{}'", server.name());
        }

        let mut session = server.prepare_for_publishing(self.only_symbology).await?;

        let mut results = IndexMap::new();
        for layer in &selected {
            let result =
                publish_project_layer(&server, &mut session, layer, self.only_symbology).await;
            results.insert(layer.layer.title.clone(), result);
        }

        if !self.only_symbology && !project.groups.is_empty() {
            server.create_groups(&project.groups).await?;
            message::updated(format!("Published {} layer group(s)", project.groups.len()));
        }

        report(&server, &selected, &results)
    }
}

async fn publish_project_layer(
    server: &GeoserverServer,
    session: &mut PublishSession,
    project_layer: &ProjectLayer,
    only_symbology: bool,
) -> LayerResult {
    let layer = &project_layer.layer;
    if let Err(err) = server.publish_style(session, layer).await {
        return LayerResult::Failed(err);
    }
    if only_symbology {
        return LayerResult::StyleOnly;
    }

    let outcome = match server
        .publish_layer(session, layer, project_layer.fields.as_deref())
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => return LayerResult::Failed(err),
    };

    if let (PublishOutcome::Published { name }, Some(url)) =
        (&outcome, &project_layer.metadata_url)
        && let Err(err) = server.set_layer_metadata_link(name, url).await
    {
        return LayerResult::Failed(err);
    }
    LayerResult::Done(outcome)
}

/// The extent and CRS covering all `layers`, if they share a CRS.
fn preview_bbox<'a>(layers: impl IntoIterator<Item = &'a ProjectLayer>) -> Option<(String, String)> {
    let mut crs: Option<&str> = None;
    let mut extent: Option<Extent> = None;
    for project_layer in layers {
        let layer = &project_layer.layer;
        let layer_extent = layer.as_vector()?.extent;
        match crs {
            Some(crs) if crs != layer.crs => return None,
            _ => crs = Some(layer.crs.as_str()),
        }
        extent = Some(match extent {
            None => layer_extent,
            Some(extent) => Extent {
                xmin: extent.xmin.min(layer_extent.xmin),
                ymin: extent.ymin.min(layer_extent.ymin),
                xmax: extent.xmax.max(layer_extent.xmax),
                ymax: extent.ymax.max(layer_extent.ymax),
            },
        });
    }

    let extent = extent?.rounded(EXTENT_DECIMALS);
    let bbox = format!(
        "{},{},{},{}",
        extent.xmin, extent.ymin, extent.xmax, extent.ymax
    );
    Some((bbox, crs?.to_string()))
}

fn report(
    server: &GeoserverServer,
    selected: &[&ProjectLayer],
    results: &IndexMap<String, LayerResult>,
) -> Result<()> {
    let mut published = Vec::new();
    let mut failed = 0;
    for (title, result) in results {
        match result {
            LayerResult::Done(PublishOutcome::Published { name }) => {
                message::updated(format!("Published layer '{title}' as '{name}'"));
                published.push(name.clone());
            },
            LayerResult::Done(PublishOutcome::Skipped(reason)) => {
                message::warning(format!("Skipped layer '{title}': {reason}"));
            },
            LayerResult::StyleOnly => {
                message::updated(format!("Published style of layer '{title}'"));
            },
            LayerResult::Failed(err) => {
                message::error(format!(
                    "Could not publish layer '{title}': {}",
                    display_chain(err)
                ));
                failed += 1;
            },
        }
    }

    if !published.is_empty() {
        let layers = selected
            .iter()
            .copied()
            .filter(|layer| published.contains(&layer.layer.name()));
        if let Some((bbox, srs)) = preview_bbox(layers) {
            message::plain(format!(
                "Preview: {}",
                server.layer_preview_url(&published, &bbox, &srs)
            ));
        }
        message::plain(format!("WMS: {}", server.layer_wms_url()));
        message::plain(format!("WFS: {}", server.layer_wfs_url()));
    }

    if failed > 0 {
        bail!("{failed} layer(s) could not be published to '{}'", server.name());
    }
    Ok(())
}
