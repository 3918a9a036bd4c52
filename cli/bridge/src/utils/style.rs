//! Packaging of SLD files written alongside a project.
//!
//! External graphics referenced by an SLD through `xlink:href` are added to
//! the archive and the references are rewritten to the archive root, which
//! is where GeoServer looks for them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use bridge_rust_sdk::models::layer::Layer;
use bridge_rust_sdk::providers::export::{ExportError, StyleExporter};
use bridge_rust_sdk::utils::archive::zip_files;
use regex::{Captures, Regex};
use tracing::debug;

static EXTERNAL_GRAPHIC_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"xlink:href\s*=\s*"([^"]+)""#).expect("valid regex")
});

/// Zips the SLD files of a project's layers.
#[derive(Debug, Clone, Default)]
pub struct SldStyleExporter {
    /// SLD files by layer name.
    styles: BTreeMap<String, PathBuf>,
}

impl SldStyleExporter {
    pub fn new(styles: BTreeMap<String, PathBuf>) -> Self {
        Self { styles }
    }
}

fn is_remote(href: &str) -> bool {
    href.contains("://") || href.starts_with('#')
}

impl StyleExporter for SldStyleExporter {
    fn save_style_as_zipped_sld(
        &self,
        layer: &Layer,
        target: &Path,
    ) -> Result<Vec<String>, ExportError> {
        let name = layer.name();
        let sld_path = self
            .styles
            .get(&name)
            .ok_or_else(|| ExportError::MissingStyle(layer.title.clone()))?;
        let sld_dir = sld_path.parent().unwrap_or_else(|| Path::new("."));
        let sld = fs::read_to_string(sld_path)?;

        let mut warnings = Vec::new();
        let mut resources: Vec<(PathBuf, String)> = Vec::new();
        let sld = EXTERNAL_GRAPHIC_HREF.replace_all(&sld, |captures: &Captures| {
            let href = &captures[1];
            if is_remote(href) {
                return captures[0].to_string();
            }

            let path = sld_dir.join(href.trim_start_matches("file://"));
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                return captures[0].to_string();
            };
            if !path.is_file() {
                warnings.push(format!(
                    "Graphic '{href}' used by the style of layer '{}' was not found",
                    layer.title
                ));
                return captures[0].to_string();
            }

            if !resources.iter().any(|(_, name)| *name == file_name) {
                resources.push((path, file_name.clone()));
            }
            format!(r#"xlink:href="{file_name}""#)
        });

        let packaged_sld = target.with_extension("sld");
        fs::write(&packaged_sld, sld.as_bytes())?;
        let sld_name = format!("{name}.sld");

        debug!(
            style = %sld_path.display(),
            resources = resources.len(),
            "packaging style"
        );
        let entries = std::iter::once((packaged_sld.as_path(), sld_name.as_str())).chain(
            resources
                .iter()
                .map(|(path, name)| (path.as_path(), name.as_str())),
        );
        zip_files(target, entries).map_err(|err| ExportError::Other(err.to_string()))?;
        fs::remove_file(&packaged_sld)?;

        Ok(warnings)
    }
}
