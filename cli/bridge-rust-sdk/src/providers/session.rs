//! State shared between the publish calls of one publishing run.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A dataset uploaded to GeoServer during this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDataset {
    pub datastore: String,
    /// Name of the table the first layer published from the upload.
    pub table: String,
}

/// Names of the layers in the workspace, as last listed.
///
/// The listing is fetched at most once until a layer is added or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayerCache {
    #[default]
    Empty,
    Populated(BTreeSet<String>),
    /// The listing is stale because layers were added or removed.
    Invalidated,
}

impl LayerCache {
    /// The cached layer names, if the cache is populated.
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            LayerCache::Populated(names) => Some(names),
            LayerCache::Empty | LayerCache::Invalidated => None,
        }
    }

    pub fn populate(&mut self, names: impl IntoIterator<Item = String>) {
        *self = LayerCache::Populated(names.into_iter().collect());
    }

    pub fn invalidate(&mut self) {
        *self = LayerCache::Invalidated;
    }
}

/// Caches owned by a single publishing run.
///
/// A session is created by
/// [GeoserverServer::prepare_for_publishing](super::geoserver::GeoserverServer::prepare_for_publishing)
/// and passed to every publish call of the run, so one exported file can back
/// several layers without being exported or uploaded twice.
#[derive(Debug)]
pub struct PublishSession {
    /// Exported file path to the datastore and table it was uploaded as.
    uploaded_datasets: HashMap<PathBuf, UploadedDataset>,
    /// Layer source to the file it was exported to.
    exported_layers: HashMap<String, PathBuf>,
    layer_cache: LayerCache,
    temp_dir: TempDir,
}

impl PublishSession {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            uploaded_datasets: HashMap::new(),
            exported_layers: HashMap::new(),
            layer_cache: LayerCache::default(),
            temp_dir: tempfile::Builder::new().prefix("bridge-").tempdir()?,
        })
    }

    /// Directory for exported files, removed when the session is dropped.
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn uploaded(&self, file: &Path) -> Option<&UploadedDataset> {
        self.uploaded_datasets.get(file)
    }

    pub fn record_upload(&mut self, file: PathBuf, dataset: UploadedDataset) {
        self.uploaded_datasets.insert(file, dataset);
    }

    pub fn exported(&self, source: &str) -> Option<&Path> {
        self.exported_layers.get(source).map(PathBuf::as_path)
    }

    pub fn record_export(&mut self, source: impl Into<String>, file: PathBuf) {
        self.exported_layers.insert(source.into(), file);
    }

    pub fn layer_cache(&self) -> &LayerCache {
        &self.layer_cache
    }

    pub fn layer_cache_mut(&mut self) -> &mut LayerCache {
        &mut self.layer_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_cache_transitions() {
        let mut cache = LayerCache::default();
        assert_eq!(cache.names(), None);

        cache.populate(["roads".to_string(), "rivers".to_string()]);
        assert!(cache.names().unwrap().contains("roads"));

        cache.invalidate();
        assert_eq!(cache, LayerCache::Invalidated);
        assert_eq!(cache.names(), None);
    }

    #[test]
    fn temp_dir_is_removed_with_session() {
        let session = PublishSession::new().unwrap();
        let dir = session.temp_dir().to_path_buf();
        assert!(dir.is_dir());
        drop(session);
        assert!(!dir.exists());
    }
}
