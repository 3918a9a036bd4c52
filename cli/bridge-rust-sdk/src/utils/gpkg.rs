//! Introspection of GeoPackage files.
//!
//! GeoServer does not report the name of the table it created from an
//! uploaded GeoPackage, so it is read from the file itself.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::models::layer::Extent;

/// Summary of a feature table in a GeoPackage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTableInfo {
    pub table: String,
    pub feature_count: u64,
    pub extent: Option<Extent>,
    /// `AUTHORITY:CODE` of the table's spatial reference system.
    pub crs: Option<String>,
}

fn open(path: &Path) -> Result<Connection, rusqlite::Error> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
}

/// Names of the tables with a geometry column, in registration order.
pub fn feature_tables(path: &Path) -> Result<Vec<String>, rusqlite::Error> {
    let conn = open(path)?;
    let mut statement = conn.prepare("SELECT table_name FROM gpkg_geometry_columns ORDER BY rowid")?;
    let tables = statement
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tables)
}

/// Resolve the feature table `table`, or the first one if `table` is `None`.
///
/// Returns `None` if the GeoPackage has no such feature table.
pub fn feature_table(path: &Path, table: Option<&str>) -> Result<Option<String>, rusqlite::Error> {
    let mut tables = feature_tables(path)?.into_iter();
    Ok(match table {
        Some(table) => tables.find(|candidate| candidate == table),
        None => tables.next(),
    })
}

/// Read name, feature count, extent and CRS of a feature table.
///
/// Uses the first feature table if `table` is `None`.
pub fn inspect(path: &Path, table: Option<&str>) -> Result<Option<FeatureTableInfo>, rusqlite::Error> {
    let Some(table) = feature_table(path, table)? else {
        return Ok(None);
    };

    let conn = open(path)?;
    let contents = conn
        .query_row(
            "SELECT c.min_x, c.min_y, c.max_x, c.max_y, s.organization, s.organization_coordsys_id
             FROM gpkg_contents c
             LEFT JOIN gpkg_spatial_ref_sys s ON s.srs_id = c.srs_id
             WHERE c.table_name = ?1",
            [table.as_str()],
            |row| {
                let bounds: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
                    (row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?);
                let extent = match bounds {
                    (Some(xmin), Some(ymin), Some(xmax), Some(ymax)) => Some(Extent {
                        xmin,
                        ymin,
                        xmax,
                        ymax,
                    }),
                    _ => None,
                };
                let organization: Option<String> = row.get(4)?;
                let code: Option<i64> = row.get(5)?;
                let crs = organization
                    .zip(code)
                    .map(|(organization, code)| format!("{}:{code}", organization.to_uppercase()));
                Ok((extent, crs))
            },
        )
        .optional()?;

    let Some((extent, crs)) = contents else {
        return Ok(None);
    };

    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\"")),
        [],
        |row| row.get(0),
    )?;

    Ok(Some(FeatureTableInfo {
        table,
        feature_count: count.max(0) as u64,
        extent,
        crs,
    }))
}

/// Write a minimal GeoPackage with one feature table, for tests.
#[cfg(test)]
pub(crate) fn write_test_geopackage(path: &Path, table: &str, features: usize) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (
             srs_name TEXT, srs_id INTEGER PRIMARY KEY, organization TEXT,
             organization_coordsys_id INTEGER, definition TEXT, description TEXT);
         INSERT INTO gpkg_spatial_ref_sys VALUES ('WGS 84', 4326, 'EPSG', 4326, '', NULL);
         CREATE TABLE gpkg_contents (
             table_name TEXT PRIMARY KEY, data_type TEXT, identifier TEXT,
             min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE, srs_id INTEGER);
         CREATE TABLE gpkg_geometry_columns (
             table_name TEXT, column_name TEXT, geometry_type_name TEXT,
             srs_id INTEGER, z TINYINT, m TINYINT);",
    )
    .unwrap();
    add_test_feature_table(path, table, features);
}

/// Add a feature table to a GeoPackage written by [write_test_geopackage].
#[cfg(test)]
pub(crate) fn add_test_feature_table(path: &Path, table: &str, features: usize) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "INSERT INTO gpkg_contents VALUES ('{table}', 'features', '{table}', 4.5, 52.0, 5.25, 53.0, 4326);
         INSERT INTO gpkg_geometry_columns VALUES ('{table}', 'geom', 'POLYGON', 4326, 0, 0);
         CREATE TABLE \"{table}\" (fid INTEGER PRIMARY KEY, geom BLOB);"
    ))
    .unwrap();
    for _ in 0..features {
        conn.execute(&format!("INSERT INTO \"{table}\" (geom) VALUES (NULL)"), [])
            .unwrap();
    }
}
