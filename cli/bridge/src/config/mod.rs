use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_rust_sdk::models::postgis::PostgisConnection;
use bridge_rust_sdk::models::server::ServerSettings;
use bridge_rust_sdk::providers::importer::RetryPolicy;
use config::{Config as HierarchicalConfig, Environment};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;
use xdg::BaseDirectories;

/// Name of bridge managed directories
pub const BRIDGE_DIR_NAME: &str = "bridge";
pub const BRIDGE_CONFIG_DIR_VAR: &str = "BRIDGE_CONFIG_DIR";
pub const BRIDGE_CONFIG_FILE: &str = "bridge.toml";
/// Prefix of environment variables overriding config values,
/// nested keys are separated by `__`, e.g. `BRIDGE_SERVERS__PROD__PASSWORD`.
const BRIDGE_ENV_PREFIX: &str = "BRIDGE";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct Config {
    /// Server used if a command does not name one
    #[serde(default)]
    pub default_server: Option<String>,

    /// GeoServer instances by name
    #[serde(default)]
    pub servers: BTreeMap<String, ServerSettings>,

    /// PostGIS databases Bridge can copy layers into, by id
    #[serde(default)]
    pub databases: BTreeMap<String, PostgisConnection>,

    /// How long to wait for the GeoServer Importer
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl ImportConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerSelectionError {
    #[error("No GeoServer is configured, add a [servers.<name>] table to {BRIDGE_CONFIG_FILE}")]
    NoServers,
    #[error("Several GeoServers are configured, select one of {} with '--server'", .0.join(", "))]
    Ambiguous(Vec<String>),
    #[error("Unknown GeoServer '{0}'")]
    Unknown(String),
    #[error("GeoServer '{name}' has an invalid URL '{url}'")]
    InvalidUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl Config {
    /// Read the layered configuration.
    ///
    /// Sources, later ones override earlier ones:
    /// 1. `/etc/bridge/bridge.toml`
    /// 2. `bridge/bridge.toml` in the XDG config directories
    /// 3. `$BRIDGE_CONFIG_DIR/bridge.toml`
    /// 4. `explicit_file`, which has to exist
    /// 5. `BRIDGE_` environment variables
    pub fn parse(explicit_file: Option<&Path>) -> Result<Config> {
        let raw = Self::raw_config(explicit_file)?;
        let config: Config = raw.try_deserialize().context("Could not parse config")?;
        Ok(config)
    }

    fn raw_config(explicit_file: Option<&Path>) -> Result<HierarchicalConfig> {
        let bridge_dirs = BaseDirectories::with_prefix(BRIDGE_DIR_NAME);

        let mut builder = HierarchicalConfig::builder();

        // read from /etc
        builder = builder.add_source(
            config::File::from(
                PathBuf::from("/etc")
                    .join(BRIDGE_DIR_NAME)
                    .join(BRIDGE_CONFIG_FILE),
            )
            .format(config::FileFormat::Toml)
            .required(false),
        );

        // look for files in XDG_CONFIG_DIRS locations
        for file in bridge_dirs.find_config_files(BRIDGE_CONFIG_FILE) {
            debug!(file = %file.display(), "reading config file");
            builder = builder.add_source(config::File::from(file).format(config::FileFormat::Toml));
        }

        if let Ok(config_dir) = std::env::var(BRIDGE_CONFIG_DIR_VAR) {
            debug!("`${BRIDGE_CONFIG_DIR_VAR}` set: {config_dir}");
            builder = builder.add_source(
                config::File::from(PathBuf::from(config_dir).join(BRIDGE_CONFIG_FILE))
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        if let Some(file) = explicit_file {
            debug!(file = %file.display(), "reading explicit config file");
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        // override via env variables
        builder = builder.add_source(
            Environment::with_prefix(BRIDGE_ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let final_config = builder.build().context("Could not read config")?;
        Ok(final_config)
    }

    /// The settings of the server called `name`.
    ///
    /// Without a name the `default_server` is used,
    /// or the only configured server if there is just one.
    pub fn server(&self, name: Option<&str>) -> Result<ServerSettings, ServerSelectionError> {
        let name = match name.or(self.default_server.as_deref()) {
            Some(name) => name.to_string(),
            None => {
                let mut names = self.servers.keys();
                match (names.next(), names.next()) {
                    (None, _) => return Err(ServerSelectionError::NoServers),
                    (Some(name), None) => name.clone(),
                    _ => {
                        return Err(ServerSelectionError::Ambiguous(
                            self.servers.keys().cloned().collect(),
                        ));
                    },
                }
            },
        };

        let mut settings = self
            .servers
            .get(&name)
            .cloned()
            .ok_or_else(|| ServerSelectionError::Unknown(name.clone()))?;

        if let Err(source) = Url::parse(&settings.url) {
            return Err(ServerSelectionError::InvalidUrl {
                name,
                url: settings.url,
                source,
            });
        }

        settings.name = name;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bridge_rust_sdk::models::server::StorageKind;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        default_server = "local"

        [servers.local]
        url = "http://localhost:8080/geoserver"
        username = "admin"
        password = "geoserver"

        [servers.production]
        url = "https://maps.example.com/geoserver"
        username = "publisher"
        storage = "postgis-bridge"
        postgis_db = "gis"

        [databases.gis]
        host = "db.example.com"
        database = "gis"
        username = "bridge"

        [import]
        max_attempts = 3
    "#};

    /// Parse `content` as explicit config file with an isolated environment.
    fn parse_with_env(content: &str, vars: &[(&str, Option<&str>)]) -> Result<Config> {
        let tempdir = tempfile::tempdir().unwrap();
        let file = tempdir.path().join(BRIDGE_CONFIG_FILE);
        fs::write(&file, content).unwrap();

        let xdg_home = tempdir.path().join("xdg");
        let xdg_home = xdg_home.to_string_lossy();
        let mut env = vec![
            ("XDG_CONFIG_HOME", Some(xdg_home.as_ref())),
            ("XDG_CONFIG_DIRS", Some(xdg_home.as_ref())),
            (BRIDGE_CONFIG_DIR_VAR, None),
        ];
        env.extend_from_slice(vars);
        temp_env::with_vars(env, || Config::parse(Some(&file)))
    }

    #[test]
    #[serial]
    fn reads_servers_and_databases() {
        let config = parse_with_env(CONFIG, &[]).unwrap();

        assert_eq!(config.servers.len(), 2);
        let production = &config.servers["production"];
        assert_eq!(production.storage, StorageKind::PostgisBridge);
        assert_eq!(production.postgis_db.as_deref(), Some("gis"));

        let gis = &config.databases["gis"];
        assert_eq!(gis.port, 5432);
        assert_eq!(gis.schema, "public");

        assert_eq!(config.import, ImportConfig {
            max_attempts: 3,
            ..Default::default()
        });
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let config = parse_with_env(CONFIG, &[
            ("BRIDGE_SERVERS__PRODUCTION__PASSWORD", Some("s3cret")),
            ("BRIDGE_IMPORT__MAX_ATTEMPTS", Some("7")),
        ])
        .unwrap();

        assert_eq!(
            config.servers["production"].password.as_deref(),
            Some("s3cret")
        );
        assert_eq!(config.import.max_attempts, 7);
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let result = temp_env::with_vars(
            [
                ("XDG_CONFIG_HOME", Some(tempdir.path().as_os_str())),
                (BRIDGE_CONFIG_DIR_VAR, None),
            ],
            || Config::parse(Some(&tempdir.path().join("missing.toml"))),
        );
        assert!(result.is_err());
    }

    #[test]
    fn selects_default_server() {
        let config = Config {
            default_server: Some("local".to_string()),
            servers: BTreeMap::from([
                ("local".to_string(), ServerSettings {
                    url: "http://localhost:8080/geoserver".to_string(),
                    ..Default::default()
                }),
                ("other".to_string(), ServerSettings {
                    url: "http://other/geoserver".to_string(),
                    ..Default::default()
                }),
            ]),
            ..Default::default()
        };

        let settings = config.server(None).unwrap();
        assert_eq!(settings.name, "local");

        let settings = config.server(Some("other")).unwrap();
        assert_eq!(settings.name, "other");
    }

    #[test]
    fn single_server_needs_no_selection() {
        let config = Config {
            servers: BTreeMap::from([("only".to_string(), ServerSettings {
                url: "http://localhost:8080/geoserver".to_string(),
                ..Default::default()
            })]),
            ..Default::default()
        };
        assert_eq!(config.server(None).unwrap().name, "only");
    }

    #[test]
    fn server_selection_errors() {
        let empty = Config::default();
        assert!(matches!(
            empty.server(None),
            Err(ServerSelectionError::NoServers)
        ));

        let settings = |url: &str| ServerSettings {
            url: url.to_string(),
            ..Default::default()
        };
        let config = Config {
            servers: BTreeMap::from([
                ("a".to_string(), settings("http://a/geoserver")),
                ("b".to_string(), settings("not a url")),
            ]),
            ..Default::default()
        };
        assert!(matches!(
            config.server(None),
            Err(ServerSelectionError::Ambiguous(names)) if names == ["a", "b"]
        ));
        assert!(matches!(
            config.server(Some("c")),
            Err(ServerSelectionError::Unknown(name)) if name == "c"
        ));
        assert!(matches!(
            config.server(Some("b")),
            Err(ServerSelectionError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn import_config_builds_retry_policy() {
        let import = ImportConfig {
            max_attempts: 0,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
        };
        assert_eq!(import.retry_policy(), RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        });
    }
}
