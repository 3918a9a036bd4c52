//! Checks run before anything is published.

use geoserver_client::types::AboutEnvelope;
use semver::Version;
use tracing::{debug, warn};

use super::geoserver::GeoserverServer;
use crate::models::validation::ValidationErrors;
use crate::models::workspace::WorkspaceName;

/// The oldest GeoServer release Bridge can publish to.
pub const MIN_GEOSERVER_VERSION: Version = Version::new(2, 14, 0);

/// Whether `version` is older than [MIN_GEOSERVER_VERSION].
///
/// Only the major and minor parts of a `major.minor.patch` version are
/// compared, the patch part may be anything (`2.13.x`). Versions of another
/// form are development builds, which are accepted.
pub fn is_unsupported_version(version: &str) -> bool {
    let parts = version.split('.').collect::<Vec<_>>();
    let parsed = match parts[..] {
        [major, minor, _patch] => major.parse::<u64>().ok().zip(minor.parse::<u64>().ok()),
        _ => None,
    };
    let Some((major, minor)) = parsed else {
        debug!(version, "treating GeoServer version as development build");
        return false;
    };

    major < MIN_GEOSERVER_VERSION.major
        || (major == MIN_GEOSERVER_VERSION.major && minor < MIN_GEOSERVER_VERSION.minor)
}

impl GeoserverServer {
    /// Add an error if the server cannot be reached or is too old.
    pub async fn check_min_geoserver_version(&self, errors: &mut ValidationErrors) {
        let url = self.client().endpoint("about/version.json");
        let about = match self.client().get_json::<AboutEnvelope>(&url).await {
            Ok(about) => about,
            Err(err) => {
                debug!(%err, "could not read GeoServer version");
                errors.add(
                    "Could not connect to GeoServer. \
                     Please check the server settings (including password).",
                );
                return;
            },
        };

        let version = about
            .about
            .resource
            .into_iter()
            .find(|resource| resource.name == "GeoServer")
            .and_then(|resource| resource.version);
        let Some(version) = version else {
            // no version reported, a development build
            return;
        };

        if is_unsupported_version(&version) {
            errors.add(format!(
                "GeoServer {MIN_GEOSERVER_VERSION} or later is required. \
                 Selected GeoServer is version '{version}'."
            ));
        }
    }

    /// Collect the reasons why the project cannot be published.
    ///
    /// `confirm_overwrite` is asked whether existing layers of the workspace
    /// may be deleted, it is only called if publishing would delete any.
    pub async fn validate_geodata_before_publication(
        &self,
        errors: &mut ValidationErrors,
        to_publish: &[String],
        only_symbology: bool,
        confirm_overwrite: impl FnOnce(&WorkspaceName) -> bool,
    ) {
        self.workspace().validate(errors);

        if !only_symbology {
            match self.will_delete_layers_on_publication(to_publish).await {
                Ok(true) => {
                    if !confirm_overwrite(self.workspace()) {
                        errors.add("Cannot overwrite existing workspace.");
                    }
                },
                Ok(false) => {},
                // publishing clears the workspace, so not knowing its layers is an error
                Err(err) => {
                    warn!(%err, "could not list the layers of the workspace");
                    errors.add(format!(
                        "Could not list the layers of workspace '{}': {err}",
                        self.workspace()
                    ));
                },
            }
        }

        self.check_min_geoserver_version(errors).await;
    }
}
