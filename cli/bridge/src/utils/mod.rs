pub mod command;
pub mod exporter;
pub mod init;
pub mod message;
pub mod postgis;
pub mod style;

/// Displays and formats a chain of errors connected via their `source` attribute.
pub fn display_chain(mut err: &dyn std::error::Error) -> String {
    let mut fmt = err.to_string();
    while let Some(source) = err.source() {
        fmt = format!("{fmt}: {source}");
        err = source;
    }

    fmt
}

#[cfg(test)]
mod tests {
    use bridge_rust_sdk::geoserver_client::GeoserverClientError;
    use bridge_rust_sdk::providers::export::ExportError;
    use bridge_rust_sdk::providers::publish::PublishError;

    use super::*;

    #[test]
    fn chain_includes_sources() {
        let err = PublishError::Export {
            layer: "Roads".to_string(),
            source: ExportError::MissingStyle("Roads".to_string()),
        };
        assert_eq!(
            display_chain(&err),
            "could not export layer 'Roads': layer 'Roads' has no style to export"
        );

        let err = GeoserverClientError::InvalidHeader("X-Bad".to_string());
        assert_eq!(display_chain(&err), "invalid header 'X-Bad'");
    }
}
