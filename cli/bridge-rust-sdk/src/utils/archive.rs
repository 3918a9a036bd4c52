use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// The Shapefile components GeoServer needs to import a layer.
pub const SHAPEFILE_COMPONENTS: [&str; 4] = ["shp", "shx", "prj", "dbf"];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("could not read '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write archive '{}'", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write archive '{}'", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Write `files` into a new ZIP archive at `target`.
///
/// Each file is stored under the given archive name.
pub fn zip_files<'a>(
    target: &Path,
    files: impl IntoIterator<Item = (&'a Path, &'a str)>,
) -> Result<(), ArchiveError> {
    let write_err = |source| ArchiveError::Write {
        path: target.to_path_buf(),
        source,
    };
    let zip_err = |source| ArchiveError::Zip {
        path: target.to_path_buf(),
        source,
    };

    let archive = File::create(target).map_err(write_err)?;
    let mut zip = ZipWriter::new(archive);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, name) in files {
        let mut source = File::open(path).map_err(|source| ArchiveError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        zip.start_file(name, options).map_err(zip_err)?;
        io::copy(&mut source, &mut zip).map_err(write_err)?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

/// Zip the components of the Shapefile at `shp` next to it,
/// returning the path of the archive (`<basename>.zip`).
pub fn zip_shapefile(shp: &Path) -> Result<PathBuf, ArchiveError> {
    let target = shp.with_extension("zip");
    let components = SHAPEFILE_COMPONENTS
        .iter()
        .map(|ext| shp.with_extension(ext))
        .collect::<Vec<_>>();
    let names = components
        .iter()
        .map(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();

    zip_files(
        &target,
        components
            .iter()
            .map(PathBuf::as_path)
            .zip(names.iter().map(String::as_str)),
    )?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use zip::ZipArchive;

    use super::*;

    #[test]
    fn shapefile_components_are_zipped() {
        let dir = tempfile::tempdir().unwrap();
        for ext in SHAPEFILE_COMPONENTS.iter().chain(["cpg"].iter()) {
            fs::write(dir.path().join(format!("roads.{ext}")), ext.as_bytes()).unwrap();
        }

        let archive = zip_shapefile(&dir.path().join("roads.shp")).unwrap();
        assert_eq!(archive, dir.path().join("roads.zip"));

        let archive = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut names = archive.file_names().collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, ["roads.dbf", "roads.prj", "roads.shp", "roads.shx"]);
    }

    #[test]
    fn missing_component_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roads.shp"), b"shp").unwrap();

        let err = zip_shapefile(&dir.path().join("roads.shp")).unwrap_err();
        assert!(
            matches!(&err, ArchiveError::Read { path, .. } if path.ends_with("roads.shx")),
            "unexpected error: {err:?}"
        );
    }
}
