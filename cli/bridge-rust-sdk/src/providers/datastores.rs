//! Discovery and provisioning of PostGIS datastores, and feature type naming.

use geoserver_client::GeoserverClientError;
use geoserver_client::types::{
    DataStoreEnvelope,
    NamedLink,
    StringList,
    WorkspaceEnvelope,
    listing_entries,
};
use serde_json::Value;
use tracing::{debug, info};

use super::geoserver::GeoserverServer;
use super::publish::PublishError;

impl GeoserverServer {
    /// Names of the enabled PostGIS datastores in a datastore listing.
    ///
    /// `list_url` is the datastores endpoint of a workspace and defaults to
    /// the one of the project workspace.
    /// The `dbtype` connection parameter is checked instead of the store
    /// type, which is not set for e.g. JNDI connection pools.
    pub async fn get_postgis_datastores(
        &self,
        list_url: Option<&str>,
    ) -> Result<Vec<String>, GeoserverClientError> {
        let default_url;
        let list_url = match list_url {
            Some(url) => url,
            None => {
                default_url = self.workspace_endpoint("datastores.json");
                &default_url
            },
        };

        let listing: Value = self.client().get_json(list_url).await?;
        let mut names = Vec::new();
        for entry in listing_entries(&listing, "dataStores", "dataStore").unwrap_or_default() {
            let Some(href) = entry.href else {
                continue;
            };
            let datastore = self
                .client()
                .get_json::<DataStoreEnvelope>(&href)
                .await?
                .data_store;
            let is_postgis = datastore
                .parameter("dbtype")
                .is_some_and(|dbtype| dbtype.starts_with("postgis"));
            if datastore.enabled == Some(true) && is_postgis {
                names.push(datastore.name);
            }
        }
        Ok(names)
    }

    /// All enabled PostGIS datastores on the server as `workspace:datastore`.
    pub async fn postgis_datastores(&self) -> Result<Vec<String>, GeoserverClientError> {
        let listing: Value = self
            .client()
            .get_json(&self.client().endpoint("workspaces.json"))
            .await?;

        let mut datastores = Vec::new();
        for entry in listing_entries(&listing, "workspaces", "workspace").unwrap_or_default() {
            let Some(href) = entry.href else {
                continue;
            };
            let workspace = self
                .client()
                .get_json::<WorkspaceEnvelope>(&href)
                .await?
                .workspace;
            let Some(list_url) = workspace.data_stores else {
                continue;
            };
            for datastore in self.get_postgis_datastores(Some(&list_url)).await? {
                datastores.push(format!("{}:{datastore}", workspace.name));
            }
        }
        Ok(datastores)
    }

    /// The PostGIS datastore the Importer writes into.
    ///
    /// Uses the first PostGIS datastore of the project workspace, or copies
    /// the `workspace:datastore` `template` into the project workspace under
    /// the name of the workspace.
    pub async fn create_postgis_datastore(
        &self,
        template: Option<&str>,
    ) -> Result<String, PublishError> {
        if let Some(existing) = self.get_postgis_datastores(None).await?.into_iter().next() {
            debug!(datastore = %existing, "using existing PostGIS datastore");
            return Ok(existing);
        }

        let template = template.ok_or(PublishError::MissingDatastoreTemplate)?;
        let (template_workspace, template_name) = template
            .split_once(':')
            .ok_or_else(|| PublishError::InvalidDatastoreTemplate(template.to_string()))?;

        let url = self.client().endpoint(format!(
            "workspaces/{template_workspace}/datastores/{template_name}.json"
        ));
        let mut datastore: DataStoreEnvelope = self.client().get_json(&url).await?;

        let workspace = self.workspace().as_str();
        let store = &mut datastore.data_store;
        store.name = workspace.to_string();
        store.workspace = Some(NamedLink {
            name: workspace.to_string(),
            href: Some(self.client().endpoint(format!("workspaces/{workspace}.json"))),
        });
        store.feature_types = Some(self.workspace_endpoint(format!(
            "datastores/{workspace}/featuretypes.json"
        )));
        if let Some(params) = store.connection_parameters.as_mut() {
            self.fix_namespace_param(params).await;
        }

        self.client()
            .post_json(&self.workspace_endpoint("datastores.json"), &datastore)
            .await?;
        info!(datastore = workspace, template, "created PostGIS datastore from template");
        Ok(workspace.to_string())
    }

    /// Register an explicitly defined datastore in the project workspace.
    pub async fn add_postgis_datastore(
        &self,
        definition: &DataStoreEnvelope,
    ) -> Result<(), GeoserverClientError> {
        self.client()
            .post_json(&self.workspace_endpoint("datastores"), definition)
            .await?;
        Ok(())
    }

    /// Predict the name GeoServer will give a new feature type `name` in
    /// `datastore`.
    ///
    /// GeoServer never really removes a feature type name, it appends a
    /// numeric suffix to new ones instead.
    pub async fn get_next_feature_type_name(
        &self,
        datastore: &str,
        name: &str,
    ) -> Result<String, GeoserverClientError> {
        let url =
            self.workspace_endpoint(format!("datastores/{datastore}/featuretypes.json?list=all"));
        let listing: StringList = match self.client().get_json(&url).await {
            Ok(listing) => listing,
            // workspace or datastore do not exist yet
            Err(err) if err.is_not_found() => return Ok(name.to_string()),
            Err(err) => return Err(err),
        };

        Ok(next_feature_type_name(&listing.into_names(), name))
    }
}

/// The name following the highest numeric suffix of `name` in `existing`.
///
/// A feature type named exactly `name` does not count as suffixed.
pub fn next_feature_type_name(existing: &[impl AsRef<str>], name: &str) -> String {
    let highest = existing
        .iter()
        .filter_map(|candidate| candidate.as_ref().strip_prefix(name))
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u128>().ok())
        .max();

    match highest {
        Some(suffix) => format!("{name}{}", suffix.saturating_add(1)),
        None => name.to_string(),
    }
}
