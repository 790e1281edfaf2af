use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Name of the configuration file that is picked up from the working directory
/// when it exists.
pub const CONFIG_FILE_NAME: &str = "gemini-relay.toml";

/// This struct represents the gemini-relay.toml configuration. All properties
/// are optional so that the user only specifies the ones that they want to
/// override in that file.
#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Base URL of the upstream API that all requests are forwarded to.
    pub upstream_url: Option<Url>,

    /// The listen address for the relay's web server.
    pub listen_address: Option<SocketAddr>,
}

/// Load the configuration file from the current directory. A missing file is
/// not an error, it simply results in the default (empty) configuration.
pub fn load_config() -> Result<RelayConfig> {
    let path = Path::new(CONFIG_FILE_NAME);
    if !path.exists() {
        debug!("No {CONFIG_FILE_NAME} found, using defaults");
        return Ok(RelayConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read configuration file {CONFIG_FILE_NAME}"))?;

    toml::from_str(&contents)
        .with_context(|| format!("Unable to parse configuration file {CONFIG_FILE_NAME}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: RelayConfig = toml::from_str(
            r#"
            upstream-url = "https://generativelanguage.googleapis.com/v1beta/openai"
            listen-address = "0.0.0.0:9000"
            "#,
        )
        .expect("expected the config to parse");

        assert_eq!(
            config.upstream_url.unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/openai"
        );
        assert_eq!(
            config.listen_address.unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn empty_config_is_valid() {
        let config: RelayConfig = toml::from_str("").expect("expected the config to parse");

        assert!(config.upstream_url.is_none());
        assert!(config.listen_address.is_none());
    }

    #[test]
    fn invalid_upstream_url_is_rejected() {
        let result = toml::from_str::<RelayConfig>(r#"upstream-url = "not a url""#);

        assert!(result.is_err());
    }
}
