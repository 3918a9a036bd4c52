use std::sync::OnceLock;

use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::Verbosity;

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// The filter directive for a verbosity level.
///
/// Progress of the publishing core is logged at info level,
/// so it is shown by default.
pub(crate) fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,bridge=error,bridge_rust_sdk=error",
        // Show publishing progress and warnings
        Verbosity::Verbose(0) => "off,bridge=warn,bridge_rust_sdk=info",
        Verbosity::Verbose(1) => "off,bridge=info,bridge_rust_sdk=info,geoserver_client=info",
        // Also show debug from our libraries
        Verbosity::Verbose(2) => "off,bridge=debug,bridge_rust_sdk=debug,geoserver_client=debug",
        // Also show trace from our libraries
        Verbosity::Verbose(3) => "off,bridge=trace,bridge_rust_sdk=trace,geoserver_client=trace",
        // Also show debug from third party crates (reqwest, hyper, ...)
        Verbosity::Verbose(4) => "debug,bridge=trace,bridge_rust_sdk=trace,geoserver_client=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

pub(crate) fn init_logger(verbosity: Option<Verbosity>) {
    let verbosity = verbosity.unwrap_or_default();

    let filter_handle = LOGGER_HANDLE.get_or_init(|| {
        let (subscriber, reload_handle) = create_registry_and_filter_reload_handle();
        subscriber.init();
        reload_handle
    });

    update_filters(filter_handle, log_filter(verbosity));
}

/// Replace the active filter, `RUST_LOG` takes precedence over `log_filter`.
pub fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => {
                error!("Updating logger filter failed: {}", err);
            },
        };
    });
    if let Err(err) = result {
        error!("Updating logger filter failed: {}", err);
    }
}

pub fn create_registry_and_filter_reload_handle() -> (
    impl tracing_subscriber::util::SubscriberInitExt,
    Handle<EnvFilter, Registry>,
) {
    // Start out permissive, the actual level is set through the reload handle.
    let filter = EnvFilter::new("trace");
    let (filter, filter_reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let registry = tracing_subscriber::registry().with(filter).with(log_layer);

    (registry, filter_reload_handle)
}
