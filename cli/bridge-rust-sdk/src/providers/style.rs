//! Uploading styles and binding them to layers.

use std::path::{Path, PathBuf};

use geoserver_client::types::{LayerEnvelope, NamedLink};
use geoserver_client::{CONTENT_TYPE_ZIP, GeoserverClientError, Method, RequestBody};
use tracing::{debug, info, instrument, warn};

use super::geoserver::GeoserverServer;
use super::publish::{PublishError, read_file};
use super::session::PublishSession;
use crate::models::layer::Layer;

impl GeoserverServer {
    /// Export the style of `layer` as zipped SLD and upload it under the
    /// layer's name, returning the path of the archive.
    #[instrument(skip_all, fields(progress = format!("Publishing style of layer '{}'", layer.title)))]
    pub async fn publish_style(
        &self,
        session: &PublishSession,
        layer: &Layer,
    ) -> Result<PathBuf, PublishError> {
        let name = layer.name();
        let archive = session.temp_dir().join(format!("{name}.zip"));
        let warnings = self
            .exporters()
            .styles
            .save_style_as_zipped_sld(layer, &archive)
            .map_err(|source| PublishError::Export {
                layer: layer.title.clone(),
                source,
            })?;
        for warning in &warnings {
            warn!(layer = %layer.title, "{warning}");
        }
        info!(
            "Style for layer '{}' exported as ZIP file to '{}'",
            layer.title,
            archive.display()
        );

        self.upload_style(&name, &archive).await?;
        Ok(archive)
    }

    /// Create or update the workspace style `name` from a zipped SLD.
    pub async fn upload_style(&self, name: &str, archive: &Path) -> Result<(), PublishError> {
        self.ensure_workspace_exists().await?;

        let (method, url) = if self.style_exists(name).await {
            (Method::PUT, self.workspace_endpoint(format!("styles/{name}")))
        } else {
            (
                Method::POST,
                self.workspace_endpoint(format!("styles?name={name}")),
            )
        };
        self.client()
            .request(method, &url, RequestBody::Bytes {
                data: read_file(archive)?,
                content_type: CONTENT_TYPE_ZIP,
            })
            .await?;
        info!(
            "Successfully created style '{name}' from ZIP file '{}'",
            archive.display()
        );
        Ok(())
    }

    /// Make the workspace style `name` the default style of layer `name`.
    pub(crate) async fn set_layer_style(&self, name: &str) -> Result<(), GeoserverClientError> {
        let url = self.workspace_endpoint(format!("layers/{name}.json"));
        let mut layer: LayerEnvelope = self.client().get_json(&url).await?;
        layer.layer.default_style = Some(NamedLink {
            name: name.to_string(),
            href: Some(self.workspace_endpoint(format!("styles/{name}.json"))),
        });
        self.client().put_json(&url, &layer).await?;
        Ok(())
    }

    /// Rename a layer created by the Importer to `new_name`, bind the
    /// workspace style of that name and remove the global style the
    /// Importer created for it.
    pub(crate) async fn fix_layer_style(
        &self,
        imported_name: &str,
        new_name: &str,
    ) -> Result<(), GeoserverClientError> {
        let mut url = self.workspace_endpoint(format!("layers/{imported_name}.json"));
        let mut layer: LayerEnvelope = match self.client().get_json(&url).await {
            Ok(layer) => layer,
            Err(err) => {
                // the layer should carry the feature type name, try the intended one anyway
                debug!(%err, layer = imported_name, "imported layer not found");
                url = self.workspace_endpoint(format!("layers/{new_name}.json"));
                self.client().get_json(&url).await?
            },
        };

        let remove_url = layer
            .layer
            .default_style
            .as_ref()
            .and_then(|style| style.href.as_deref())
            .map(|href| format!("{href}?recurse=true&purge=true"));

        layer.layer.name = new_name.to_string();
        layer.layer.default_style = Some(NamedLink::name(format!(
            "{}:{new_name}",
            self.workspace()
        )));
        self.client().put_json(&url, &layer).await?;

        if let Some(remove_url) = remove_url {
            if let Err(err) = self.client().delete(&remove_url).await {
                debug!(%err, "global style was not removed");
            }
        }
        Ok(())
    }
}
