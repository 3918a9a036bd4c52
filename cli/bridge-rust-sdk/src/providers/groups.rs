//! Publishing (nested) layer groups.

use geoserver_client::GeoserverClientError;
use geoserver_client::types::{
    LayerGroup,
    LayerGroupEnvelope,
    Publishables,
    Published,
    PublishedKind,
};
use tracing::{debug, info};

use super::geoserver::GeoserverServer;
use crate::models::group::{GroupDescriptor, GroupMember};

impl GeoserverServer {
    pub async fn create_groups(&self, groups: &[GroupDescriptor]) -> Result<(), GeoserverClientError> {
        for group in groups {
            self.publish_group(group).await?;
        }
        Ok(())
    }

    /// Publish `group`, publishing nested groups before the groups
    /// referencing them.
    async fn publish_group(&self, group: &GroupDescriptor) -> Result<(), GeoserverClientError> {
        let mut published = Vec::with_capacity(group.layers.len());
        for member in &group.layers {
            match member {
                GroupMember::Group(inner) => {
                    published.push(Published {
                        kind: PublishedKind::LayerGroup,
                        name: self.full_layer_name(&inner.name),
                    });
                    Box::pin(self.publish_group(inner)).await?;
                },
                GroupMember::Layer(name) => published.push(Published {
                    kind: PublishedKind::Layer,
                    name: self.full_layer_name(name),
                }),
            }
        }

        let definition = LayerGroupEnvelope {
            layer_group: LayerGroup {
                name: group.name.clone(),
                title: group.title.clone(),
                abstract_txt: group.abstract_text.clone(),
                mode: "NAMED".to_string(),
                publishables: Publishables { published },
            },
        };

        // there is no create-or-update for groups
        let url = self.workspace_endpoint("layergroups");
        if let Err(err) = self.client().post_json(&url, &definition).await {
            debug!(%err, group = %group.name, "could not create group, updating it");
            let url = self.workspace_endpoint(format!("layergroups/{}.json", group.name));
            self.client().put_json(&url, &definition).await?;
        }
        info!("Successfully created group '{}'", group.name);
        Ok(())
    }
}
