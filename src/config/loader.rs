//! Configuration loader backed by the `config` crate's environment source

use super::{
    parse_allowed_file_types, Config, ConfigError, MetricsConfig, ServerConfig, StorageConfig,
    DEFAULT_GCS_ENDPOINT, DEFAULT_MAX_FILE_SIZE, DEFAULT_METADATA_HOST, DEFAULT_PORT,
};
use serde::Deserialize;

/// Raw settings as they appear in the environment.
///
/// The environment source lower-cases variable names, so `GCP_BUCKET_NAME`
/// lands in `gcp_bucket_name`. Names are matched case-sensitively before that
/// happens; see [`ConfigLoader::from_vars`].
#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    gcp_bucket_name: Option<String>,
    max_file_size: Option<u64>,
    allowed_file_types: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    gcs_endpoint: Option<String>,
    gcp_access_token: Option<String>,
    #[serde(default)]
    gcs_anonymous: bool,
    gce_metadata_host: Option<String>,
    #[serde(default)]
    metrics_enabled: bool,
    metrics_port: Option<u16>,
}

impl EnvSettings {
    fn into_config(self) -> Result<Config, ConfigError> {
        let bucket_name = self
            .gcp_bucket_name
            .ok_or(ConfigError::MissingVar("GCP_BUCKET_NAME"))?;

        let metrics_defaults = MetricsConfig::default();

        Ok(Config {
            bucket_name,
            max_file_size: self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE),
            allowed_file_types: self
                .allowed_file_types
                .as_deref()
                .and_then(parse_allowed_file_types),
            server: ServerConfig {
                host: self.host.unwrap_or_else(|| ServerConfig::default().host),
                port: self.port.unwrap_or(DEFAULT_PORT),
            },
            storage: StorageConfig {
                endpoint: self
                    .gcs_endpoint
                    .map(|e| e.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GCS_ENDPOINT.to_string()),
                access_token: self.gcp_access_token,
                anonymous: self.gcs_anonymous,
                metadata_host: self
                    .gce_metadata_host
                    .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
            },
            metrics: MetricsConfig {
                enabled: self.metrics_enabled,
                port: self.metrics_port.unwrap_or(metrics_defaults.port),
            },
        })
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Config, ConfigError> {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        Self::from_vars(vars)
    }

    /// Load configuration from an explicit set of variables instead of the
    /// process environment.
    ///
    /// Only upper-case names are recognised: `gcp_bucket_name` does not stand
    /// in for `GCP_BUCKET_NAME`.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Config, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _): &(String, String)| !k.chars().any(|c| c.is_ascii_lowercase()))
            .collect();
        Self::load(Self::environment().source(Some(source)))
    }

    fn environment() -> config::Environment {
        config::Environment::default()
            .try_parsing(true)
            .ignore_empty(true)
    }

    fn load(environment: config::Environment) -> Result<Config, ConfigError> {
        let settings: EnvSettings = config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        let config = settings.into_config()?;
        config.validate()?;
        Ok(config)
    }
}
