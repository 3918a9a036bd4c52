mod datastores;
mod publish;
mod test_connection;
mod unpublish;
mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bpaf::{Bpaf, ShellComp};
use bridge_rust_sdk::models::workspace::WorkspaceName;
use bridge_rust_sdk::providers::export::Exporters;
use bridge_rust_sdk::providers::geoserver::GeoserverServer;
use bridge_rust_sdk::providers::storage::Storage;
use indoc::indoc;
use tracing::debug;

use crate::config::Config;
use crate::project::Project;
use crate::utils::exporter::GdalExporter;
use crate::utils::postgis;
use crate::utils::style::SldStyleExporter;

const SHELL_COMPLETION_FILE: ShellComp = ShellComp::File { mask: None };

static BRIDGE_DESCRIPTION: &'_ str = indoc! {"
    Bridge publishes map layers, their styles and layer groups to GeoServer.

    Layers are described in a project file, GeoServer instances and PostGIS
    databases in the configuration file 'bridge.toml'."
};

fn vec_len<T>(x: Vec<T>) -> usize {
    Vec::len(&x)
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf)]
#[bpaf(options, descr(BRIDGE_DESCRIPTION), version)]
pub struct BridgeCli(#[bpaf(external(bridge_args))] pub BridgeArgs);

/// Main bridge args parser
///
/// To parse the bridge CLI, use [`BridgeCli`] instead using [`bridge_cli()`].
#[derive(Debug, Bpaf)]
#[bpaf(ignore_rustdoc)]
pub struct BridgeArgs {
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Read configuration from FILE in addition to the default locations
    #[bpaf(long, short, argument("FILE"), complete_shell(SHELL_COMPLETION_FILE))]
    pub config: Option<PathBuf>,

    #[bpaf(external(commands))]
    command: Commands,
}

impl BridgeArgs {
    pub async fn handle(self) -> Result<()> {
        let config = Config::parse(self.config.as_deref())?;
        debug!(
            servers = config.servers.len(),
            databases = config.databases.len(),
            "read configuration"
        );

        match self.command {
            Commands::Publish(args) => args.handle(config).await,
            Commands::Unpublish(args) => args.handle(config).await,
            Commands::Validate(args) => args.handle(config).await,
            Commands::TestConnection(args) => args.handle(config).await,
            Commands::Datastores(args) => args.handle(config).await,
        }
    }
}

#[derive(Bpaf, Clone)]
enum Commands {
    /// Publish the layers of a project
    #[bpaf(command)]
    Publish(#[bpaf(external(publish::publish))] publish::Publish),

    /// Remove published layers and their styles
    #[bpaf(command)]
    Unpublish(#[bpaf(external(unpublish::unpublish))] unpublish::Unpublish),

    /// Check whether a project can be published
    #[bpaf(command)]
    Validate(#[bpaf(external(validate::validate))] validate::Validate),

    /// Check that a GeoServer is reachable with the configured credentials
    #[bpaf(command("test-connection"))]
    TestConnection(
        #[bpaf(external(test_connection::test_connection))] test_connection::TestConnection,
    ),

    /// List the PostGIS datastores of a GeoServer
    #[bpaf(command)]
    Datastores(#[bpaf(external(datastores::datastores))] datastores::Datastores),
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command")
    }
}

/// Connect to the server called `server` for publishing into `workspace`.
///
/// `styles` are the SLD files of the layers that may be published.
pub(crate) fn open_server(
    config: &Config,
    server: Option<&str>,
    workspace: WorkspaceName,
    styles: BTreeMap<String, PathBuf>,
) -> Result<GeoserverServer> {
    let settings = config.server(server)?;
    let storage = Storage::from_settings(
        &settings,
        postgis::registry(&config.databases),
        config.import.retry_policy(),
    );
    debug!(server = %settings.name, storage = ?storage.kind(), "using GeoServer");

    let exporters = Exporters::new(GdalExporter::default(), SldStyleExporter::new(styles));
    GeoserverServer::new(&settings, workspace, storage, exporters)
        .with_context(|| format!("Could not set up GeoServer '{}'", settings.name))
}

pub(crate) fn load_project(config: &Config, path: &Path) -> Result<Project> {
    Project::load(path, &config.databases)
        .with_context(|| format!("Could not load project '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use bpaf::Args;

    use super::*;

    fn parse(args: &[&str]) -> BridgeArgs {
        let BridgeCli(args) = bridge_cli().run_inner(Args::from(args)).unwrap();
        args
    }

    #[test]
    fn counts_verbose_flags() {
        let args = parse(&["-vv", "test-connection"]);
        assert!(matches!(args.verbosity, Verbosity::Verbose(2)));

        let args = parse(&["--quiet", "test-connection"]);
        assert!(matches!(args.verbosity, Verbosity::Quiet));
    }

    #[test]
    fn parses_publish_arguments() {
        let args = parse(&[
            "--config",
            "/etc/maps.toml",
            "publish",
            "--server",
            "prod",
            "--layer",
            "roads",
            "-l",
            "rivers",
            "--only-symbology",
            "maps/city.toml",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/maps.toml")));
        let Commands::Publish(publish) = args.command else {
            panic!("expected publish command");
        };
        assert_eq!(publish.server.as_deref(), Some("prod"));
        assert_eq!(publish.layers, ["roads", "rivers"]);
        assert!(publish.only_symbology);
        assert!(!publish.yes);
        assert_eq!(publish.project, PathBuf::from("maps/city.toml"));
    }

    #[test]
    fn requires_a_command() {
        assert!(bridge_cli().run_inner(Args::from(&["-v"][..])).is_err());
    }
}
