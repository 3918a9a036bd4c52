//! A GeoServer instance the layers of a project are published to.
//!
//! [GeoserverServer] is split over several modules, this one holds
//! construction, resource existence probes, deletes and URL builders.
//! Workspace lifecycle, storage strategies, styles and groups live in
//! their own modules as further `impl` blocks.

use std::fmt::Display;

use geoserver_client::types::{
    LayerEnvelope,
    MetadataLink,
    MetadataLinks,
    listing_entries,
};
use geoserver_client::{GeoserverClient, GeoserverClientConfig, GeoserverClientError};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::export::Exporters;
use super::publish::PublishError;
use super::session::LayerCache;
use super::storage::Storage;
use crate::models::server::ServerSettings;
use crate::models::workspace::WorkspaceName;

/// Result of probing whether a remote resource exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    NotFound,
    /// The listing could not be retrieved.
    Unreachable,
}

impl Existence {
    /// Collapse into a boolean, treating [Existence::Unreachable] as absent.
    pub fn exists(self) -> bool {
        self == Existence::Exists
    }
}

/// Kinds of resources whose existence is probed through listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Workspace,
    Style,
    DataStore,
    Layer,
}

impl ResourceCategory {
    /// The plural and singular keys of the category's listing document.
    fn listing_keys(&self) -> (&'static str, &'static str) {
        match self {
            ResourceCategory::Workspace => ("workspaces", "workspace"),
            ResourceCategory::Style => ("styles", "style"),
            ResourceCategory::DataStore => ("dataStores", "dataStore"),
            ResourceCategory::Layer => ("layers", "layer"),
        }
    }
}

#[derive(Debug)]
pub struct GeoserverServer {
    name: String,
    client: GeoserverClient,
    workspace: WorkspaceName,
    storage: Storage,
    use_original_data_source: bool,
    exporters: Exporters,
}

impl GeoserverServer {
    pub fn new(
        settings: &ServerSettings,
        workspace: WorkspaceName,
        storage: Storage,
        exporters: Exporters,
    ) -> Result<Self, GeoserverClientError> {
        let config = GeoserverClientConfig {
            url: settings.url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            user_agent: settings.user_agent.clone(),
            ..Default::default()
        };

        Ok(Self {
            name: settings.name.clone(),
            client: GeoserverClient::new(config)?,
            workspace,
            storage,
            use_original_data_source: settings.use_original_data_source,
            exporters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &GeoserverClient {
        &self.client
    }

    pub fn workspace(&self) -> &WorkspaceName {
        &self.workspace
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn use_original_data_source(&self) -> bool {
        self.use_original_data_source
    }

    pub fn set_use_original_data_source(&mut self, use_original_data_source: bool) {
        self.use_original_data_source = use_original_data_source;
    }

    pub(crate) fn exporters(&self) -> &Exporters {
        &self.exporters
    }

    /// URL of a resource below the project workspace.
    pub(crate) fn workspace_endpoint(&self, path: impl Display) -> String {
        self.client
            .endpoint(format!("workspaces/{}/{path}", self.workspace))
    }

    fn listing_url(&self, category: ResourceCategory) -> String {
        match category {
            ResourceCategory::Workspace => self.client.endpoint("workspaces.json"),
            ResourceCategory::Style => self.workspace_endpoint("styles.json"),
            ResourceCategory::DataStore => self.workspace_endpoint("datastores.json"),
            ResourceCategory::Layer => self.workspace_endpoint("layers.json"),
        }
    }

    /// Names in the listing of `category`, `None` if the document has no
    /// listing at all.
    async fn list_names(
        &self,
        category: ResourceCategory,
    ) -> Result<Option<Vec<String>>, GeoserverClientError> {
        let listing: Value = self.client.get_json(&self.listing_url(category)).await?;
        let (plural, singular) = category.listing_keys();
        Ok(listing_entries(&listing, plural, singular)
            .map(|entries| entries.into_iter().map(|entry| entry.name).collect()))
    }

    fn probe_result(
        category: ResourceCategory,
        name: &str,
        names: Result<Option<Vec<String>>, GeoserverClientError>,
    ) -> (Existence, Option<Vec<String>>) {
        match names {
            Ok(Some(names)) => {
                let existence = if names.iter().any(|n| n == name) {
                    Existence::Exists
                } else {
                    Existence::NotFound
                };
                (existence, Some(names))
            },
            Ok(None) => (Existence::NotFound, None),
            // the listing itself is missing, e.g. workspace styles of an absent workspace
            Err(err) if err.is_not_found() => (Existence::NotFound, None),
            Err(err) => {
                debug!(?category, name, %err, "could not probe resource");
                (Existence::Unreachable, None)
            },
        }
    }

    /// Probe a resource with a fresh listing request.
    pub async fn existence(&self, category: ResourceCategory, name: &str) -> Existence {
        let names = self.list_names(category).await;
        Self::probe_result(category, name, names).0
    }

    /// Probe a layer, consulting and populating `cache`.
    pub async fn layer_existence(&self, cache: &mut LayerCache, name: &str) -> Existence {
        if let Some(names) = cache.names() {
            return if names.contains(name) {
                Existence::Exists
            } else {
                Existence::NotFound
            };
        }

        let names = self.list_names(ResourceCategory::Layer).await;
        let (existence, names) = Self::probe_result(ResourceCategory::Layer, name, names);
        if let Some(names) = names {
            cache.populate(names);
        }
        existence
    }

    pub async fn workspace_exists(&self) -> bool {
        self.existence(ResourceCategory::Workspace, self.workspace.as_str())
            .await
            .exists()
    }

    pub async fn style_exists(&self, name: &str) -> bool {
        self.existence(ResourceCategory::Style, name).await.exists()
    }

    pub async fn datastore_exists(&self, name: &str) -> bool {
        self.existence(ResourceCategory::DataStore, name)
            .await
            .exists()
    }

    /// Whether layer `name` exists, listing the layers only if `cache` is
    /// not populated.
    pub async fn layer_exists(&self, cache: &mut LayerCache, name: &str) -> bool {
        self.layer_existence(cache, name).await.exists()
    }

    /// Names of all layers in the project workspace.
    pub async fn layers(&self) -> Result<Vec<String>, GeoserverClientError> {
        Ok(self
            .list_names(ResourceCategory::Layer)
            .await?
            .unwrap_or_default())
    }

    /// Whether publishing `to_publish` would remove layers that currently
    /// exist in the workspace.
    pub async fn will_delete_layers_on_publication(
        &self,
        to_publish: &[String],
    ) -> Result<bool, GeoserverClientError> {
        let workspaces = self
            .list_names(ResourceCategory::Workspace)
            .await?
            .unwrap_or_default();
        if !workspaces.iter().any(|name| name == self.workspace.as_str()) {
            return Ok(false);
        }
        let layers = self.layers().await?;
        Ok(layers.iter().any(|layer| !to_publish.contains(layer)))
    }

    /// Check that the server answers authenticated requests.
    pub async fn test_connection(&self) -> bool {
        match self
            .client
            .get(&self.client.endpoint("about/version"))
            .await
        {
            Ok(_) => true,
            Err(err) => {
                debug!(%err, "connection test failed");
                false
            },
        }
    }

    // region: deletes

    /// Delete `url`, treating a `404` as success.
    async fn delete_if_exists(&self, url: &str) -> Result<(), GeoserverClientError> {
        match self.client.delete(url).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(url, "resource already absent");
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    pub async fn delete_style(&self, name: &str) -> Result<(), GeoserverClientError> {
        self.delete_if_exists(&self.workspace_endpoint(format!(
            "styles/{name}?purge=true&recurse=true"
        )))
        .await
    }

    pub async fn delete_datastore(&self, name: &str) -> Result<(), GeoserverClientError> {
        self.delete_if_exists(&self.workspace_endpoint(format!("datastores/{name}?recurse=true")))
            .await
    }

    /// Delete layer `name`, invalidating `cache` whether or not it succeeds.
    pub async fn delete_layer(
        &self,
        cache: &mut LayerCache,
        name: &str,
        recurse: bool,
    ) -> Result<(), GeoserverClientError> {
        let param = if recurse { "?recurse=true" } else { "" };
        let result = self
            .delete_if_exists(&self.workspace_endpoint(format!("layers/{name}.json{param}")))
            .await;
        cache.invalidate();
        result
    }

    /// Remove a layer and its style, styles are not deleted with their layer.
    #[instrument(skip(self, cache), fields(progress = format!("Unpublishing layer '{name}'")))]
    pub async fn unpublish_data(
        &self,
        cache: &mut LayerCache,
        name: &str,
    ) -> Result<(), GeoserverClientError> {
        self.delete_layer(cache, name, true).await?;
        self.delete_style(name).await?;
        info!(layer = name, "unpublished layer");
        Ok(())
    }

    // endregion

    // region: service urls

    pub fn full_layer_name(&self, name: &str) -> String {
        format!("{}:{name}", self.workspace)
    }

    /// An OpenLayers WMS preview of the given layers.
    pub fn layer_preview_url(&self, names: &[impl AsRef<str>], bbox: &str, srs: &str) -> String {
        let layers = names
            .iter()
            .map(|name| self.full_layer_name(name.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}/{}/wms?service=WMS&version=1.1.0&request=GetMap&layers={layers}\
             &format=application/openlayers&bbox={bbox}&srs={srs}&width=800&height=600",
            self.client.base_url(),
            self.workspace,
        )
    }

    pub fn layer_wms_url(&self) -> String {
        format!(
            "{}/wms?service=WMS&version=1.1.0&request=GetCapabilities",
            self.client.base_url()
        )
    }

    pub fn layer_wfs_url(&self) -> String {
        format!("{}/wfs", self.client.base_url())
    }

    // endregion

    /// Link the resource behind layer `name` to an ISO 19115 metadata record.
    pub async fn set_layer_metadata_link(&self, name: &str, url: &str) -> Result<(), PublishError> {
        let layer: LayerEnvelope = self
            .client
            .get_json(&self.workspace_endpoint(format!("layers/{name}.json")))
            .await?;
        let resource_url = layer
            .layer
            .resource
            .map(|resource| resource.href)
            .ok_or_else(|| PublishError::MissingLayerResource(name.to_string()))?;

        let mut resource: Value = self.client.get_json(&resource_url).await?;
        let key = if resource.get("featureType").is_some() {
            "featureType"
        } else {
            "coverage"
        };
        let links = MetadataLinks {
            metadata_link: vec![MetadataLink {
                mime_type: "text/html".to_string(),
                metadata_type: "ISO19115:2003".to_string(),
                content: url.to_string(),
            }],
        };
        match resource.get_mut(key).and_then(Value::as_object_mut) {
            Some(object) => {
                object.insert(
                    "metadataLinks".to_string(),
                    serde_json::to_value(links).map_err(GeoserverClientError::Encode)?,
                );
            },
            None => {
                warn!(layer = name, "layer resource is neither a feature type nor a coverage");
                return Err(PublishError::MissingLayerResource(name.to_string()));
            },
        }

        self.client.put_json(&resource_url, &resource).await?;
        Ok(())
    }
}
