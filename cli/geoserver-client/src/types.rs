//! Payload types of the GeoServer REST API.
//!
//! Resources that are read, modified and written back (data stores, feature
//! types, layers) keep all fields they do not model in `extra`, so a
//! round trip never drops server side settings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A `{ "name": ..., "href": ... }` reference as found in resource listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedLink {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl NamedLink {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: None,
        }
    }
}

/// Extract the entries of a listing such as
/// `{"styles": {"style": [{"name": "a", "href": "..."}]}}`.
///
/// GeoServer renders an empty listing as `{"styles": ""}`, which yields
/// `Some(vec![])`. `None` is returned if the plural key is missing altogether.
pub fn listing_entries(listing: &Value, plural: &str, singular: &str) -> Option<Vec<NamedLink>> {
    let root = listing.get(plural)?;
    let entries = match root.get(singular) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect(),
        // single element listings are occasionally rendered as an object
        Some(entry @ Value::Object(_)) => serde_json::from_value(entry.clone())
            .map(|link| vec![link])
            .unwrap_or_default(),
        _ => vec![],
    };
    Some(entries)
}

// region: workspaces and namespaces

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEnvelope {
    pub workspace: WorkspaceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub name: String,
    /// Link to the data store listing, only present in responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_stores: Option<String>,
}

impl WorkspaceEnvelope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            workspace: WorkspaceInfo {
                name: name.into(),
                data_stores: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceEnvelope {
    pub namespace: NamespaceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    #[serde(default)]
    pub prefix: Option<String>,
    pub uri: String,
}

// endregion

// region: data stores

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreEnvelope {
    #[serde(rename = "dataStore")]
    pub data_store: DataStore,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStore {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<NamedLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_parameters: Option<ConnectionParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_types: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataStore {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.connection_parameters
            .as_ref()
            .and_then(|params| params.get(key))
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameter(key).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub entry: Vec<ParameterEntry>,
}

impl ConnectionParameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entry
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        self.entry
            .iter_mut()
            .find(|entry| entry.key == key)
            .map(|entry| &mut entry.value)
    }
}

impl FromIterator<(String, String)> for ConnectionParameters {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entry: iter
                .into_iter()
                .map(|(key, value)| ParameterEntry { key, value })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterEntry {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "$")]
    pub value: String,
}

// endregion

// region: feature types and coverages

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTypeEnvelope {
    #[serde(rename = "featureType")]
    pub feature_type: FeatureType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_bounding_box: Option<BoundingBox>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minx: f64,
    pub maxx: f64,
    pub miny: f64,
    pub maxy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srs: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata links of a feature type or coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataLinks {
    pub metadata_link: Vec<MetadataLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataLink {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub metadata_type: String,
    pub content: String,
}

/// The `{"list": {"string": [...]}}` shape returned by `featuretypes.json?list=all`.
///
/// An empty list is rendered as `{"list": ""}` and a single name as
/// `{"list": {"string": "name"}}`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StringList {
    #[serde(default)]
    list: StringListBody,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum StringListBody {
    Strings {
        #[serde(default)]
        string: OneOrMany,
    },
    Empty(String),
}

impl Default for StringListBody {
    fn default() -> Self {
        StringListBody::Empty(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<String>),
    One(String),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl StringList {
    pub fn into_names(self) -> Vec<String> {
        match self.list {
            StringListBody::Strings {
                string: OneOrMany::Many(names),
            } => names,
            StringListBody::Strings {
                string: OneOrMany::One(name),
            } => vec![name],
            StringListBody::Empty(_) => Vec::new(),
        }
    }
}

// endregion

// region: layers, styles and groups

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEnvelope {
    pub layer: LayerInfo,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_style: Option<NamedLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLink {
    #[serde(rename = "@class", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerGroupEnvelope {
    #[serde(rename = "layerGroup")]
    pub layer_group: LayerGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerGroup {
    pub name: String,
    pub title: String,
    pub abstract_txt: String,
    pub mode: String,
    pub publishables: Publishables,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publishables {
    pub published: Vec<Published>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
    #[serde(rename = "@type")]
    pub kind: PublishedKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishedKind {
    #[serde(rename = "layer")]
    Layer,
    #[serde(rename = "layerGroup")]
    LayerGroup,
}

// endregion

// region: importer extension

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCreateEnvelope {
    pub import: ImportCreate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCreate {
    pub target_store: TargetStore,
    pub target_workspace: WorkspaceEnvelopeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStore {
    #[serde(rename = "dataStore")]
    pub data_store: NamedLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEnvelopeRef {
    pub workspace: NamedLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEnvelope {
    pub import: ImportInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub id: i64,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    #[serde(default)]
    pub task: Option<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: i64,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub layer: Option<NamedLink>,
}

// endregion

// region: about

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboutEnvelope {
    pub about: About,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct About {
    #[serde(default)]
    pub resource: Vec<AboutResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboutResource {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
}

// endregion
