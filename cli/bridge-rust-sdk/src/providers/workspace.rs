//! Creating, clearing and recreating the project workspace.

use geoserver_client::GeoserverClientError;
use geoserver_client::types::{
    ConnectionParameters,
    DataStoreEnvelope,
    NamespaceEnvelope,
    WorkspaceEnvelope,
    listing_entries,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::geoserver::{Existence, GeoserverServer, ResourceCategory};
use super::publish::PublishError;
use super::session::{LayerCache, PublishSession};

impl GeoserverServer {
    pub async fn create_workspace(&self) -> Result<(), GeoserverClientError> {
        let url = self.client().endpoint("workspaces");
        self.client()
            .post_json(&url, &WorkspaceEnvelope::new(self.workspace().as_str()))
            .await?;
        info!(workspace = %self.workspace(), "created workspace");
        Ok(())
    }

    pub async fn ensure_workspace_exists(&self) -> Result<(), GeoserverClientError> {
        if !self.workspace_exists().await {
            self.create_workspace().await?;
        }
        Ok(())
    }

    /// Point the `namespace` connection parameter at the URI of the
    /// workspace's namespace.
    ///
    /// Returns whether the parameter was present and has been updated.
    pub async fn fix_namespace_param(&self, params: &mut ConnectionParameters) -> bool {
        let Some(namespace) = params.get_mut("namespace") else {
            return false;
        };

        let url = self
            .client()
            .endpoint(format!("namespaces/{}.json", self.workspace()));
        match self.client().get_json::<NamespaceEnvelope>(&url).await {
            Ok(envelope) => {
                *namespace = envelope.namespace.uri;
                true
            },
            Err(err) => {
                warn!(workspace = %self.workspace(), %err, "GeoServer namespace does not exist");
                false
            },
        }
    }

    /// Remove all layers, feature types, coverages and styles of the workspace
    /// while keeping its database datastores.
    ///
    /// GeoServer cannot delete feature types while keeping their datastore,
    /// so database datastores are snapshotted, the workspace is deleted
    /// recursively and recreated, and the snapshots are posted again.
    /// The calls are not transactional, a failure midway can leave the
    /// workspace without its datastores. `cache` is invalidated either way.
    #[instrument(
        skip(self, cache),
        fields(progress = format!("Clearing workspace '{}'", self.workspace()))
    )]
    pub async fn clear_workspace(&self, cache: &mut LayerCache) -> Result<(), GeoserverClientError> {
        let result = self.remove_workspace_contents().await;
        cache.invalidate();
        result
    }

    async fn remove_workspace_contents(&self) -> Result<(), GeoserverClientError> {
        if self
            .existence(ResourceCategory::Workspace, self.workspace().as_str())
            .await
            != Existence::Exists
        {
            return self.create_workspace().await;
        }

        let mut db_stores = Vec::new();
        let listing: Value = self
            .client()
            .get_json(&self.workspace_endpoint("datastores.json"))
            .await?;
        for store in listing_entries(&listing, "dataStores", "dataStore").unwrap_or_default() {
            let url = self.workspace_endpoint(format!("datastores/{}.json", store.name));
            let mut datastore: DataStoreEnvelope = self.client().get_json(&url).await?;
            if !datastore.data_store.has_parameter("dbtype") {
                continue;
            }
            if let Some(params) = datastore.data_store.connection_parameters.as_mut() {
                if self.fix_namespace_param(params).await {
                    self.client().put_json(&url, &datastore).await?;
                }
            }
            debug!(datastore = %store.name, "keeping database datastore");
            db_stores.push(datastore);
        }

        // purge, otherwise the SLD files stay behind in the data directory
        let listing: Value = self
            .client()
            .get_json(&self.workspace_endpoint("styles.json"))
            .await?;
        for style in listing_entries(&listing, "styles", "style").unwrap_or_default() {
            self.client()
                .delete(&self.workspace_endpoint(format!(
                    "styles/{}.json?recurse=true&purge=true",
                    style.name
                )))
                .await?;
        }

        let url = self
            .client()
            .endpoint(format!("workspaces/{}.json?recurse=true", self.workspace()));
        self.client().delete(&url).await?;

        self.create_workspace().await?;

        let url = self.workspace_endpoint("datastores.json");
        for datastore in db_stores {
            self.client().post_json(&url, &datastore).await?;
            info!(datastore = %datastore.data_store.name, "restored database datastore");
        }
        Ok(())
    }

    /// Start a publishing run.
    ///
    /// Unless only styles are published, the workspace is cleared first.
    pub async fn prepare_for_publishing(
        &self,
        only_symbology: bool,
    ) -> Result<PublishSession, PublishError> {
        let mut session = PublishSession::new().map_err(PublishError::TempDir)?;
        if !only_symbology {
            self.clear_workspace(session.layer_cache_mut()).await?;
        }
        self.ensure_workspace_exists().await?;
        Ok(session)
    }
}
