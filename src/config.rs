//! # Configuration Management
//!
//! This module handles loading the service configuration from multiple sources:
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with VOICE_ANONYMIZER_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: derive `Serialize`/`Deserialize` so the `config` crate can merge sources
//!   into our plain structs
//! - **impl Default**: the built-in defaults double as documentation of sane values
//! - **Result<T, E>**: loading and validation both return `anyhow::Result`
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Short environment variables (VOICE_ANONYMIZER_PORT, VOICE_ANONYMIZER_HOST,
//!    VOICE_ANONYMIZER_SCRATCH_DIR)
//! 2. Nested environment variables (VOICE_ANONYMIZER_LIMITS__MAX_UPLOAD_MB, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;                   // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML and env sources
use std::env;                         // For reading environment variables
use std::path::PathBuf;

/// Short environment variables and the config keys they override.
///
/// `VOICE_ANONYMIZER_PORT` is the documented way to pick the listening port; the other
/// two follow the same naming so deployments only need to learn one convention.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("VOICE_ANONYMIZER_HOST", "server.host"),
    ("VOICE_ANONYMIZER_PORT", "server.port"),
    ("VOICE_ANONYMIZER_SCRATCH_DIR", "storage.scratch_dir"),
];

/// Resolve the short-form variables that are set into `(config key, value)` pairs.
///
/// `lookup` stands in for `std::env::var`, so the variable-to-key mapping can be
/// exercised without mutating the process environment.
fn overrides_from<F>(lookup: F) -> Vec<(&'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    ENV_OVERRIDES
        .iter()
        .filter_map(|(var, key)| lookup(var).map(|value| (*key, value)))
        .collect()
}

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, storage, limits) keeps the
/// TOML file readable and maps one-to-one onto `[server]`, `[storage]` and `[limits]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address to bind to; `0.0.0.0` accepts connections on every interface
/// - `port`: TCP port number to listen on (defaults to 5002)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// Where per-request scratch files are written.
///
/// ## Fields:
/// - `scratch_dir`: directory holding `input_<id>.<ext>` and `output_<id>.wav` files.
///   Defaults to the OS temp directory, which is reaped externally; the service never
///   deletes output files itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub scratch_dir: String,
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest accepted upload, in megabytes
    pub max_upload_mb: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),  // All interfaces
                port: 5002,
            },
            storage: StorageConfig {
                scratch_dir: env::temp_dir().to_string_lossy().into_owned(),
            },
            limits: LimitsConfig {
                max_upload_mb: 50,  // Matches the largest recordings clients send
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `VOICE_ANONYMIZER_PORT=8080`: Override server port
    /// - `VOICE_ANONYMIZER_SCRATCH_DIR=/var/tmp/anon`: Override scratch directory
    /// - `VOICE_ANONYMIZER_LIMITS__MAX_UPLOAD_MB=10`: Override any nested key
    pub fn load() -> Result<Self> {
        let overrides = overrides_from(|var| env::var(var).ok());
        Self::load_with_overrides(&overrides)
    }

    /// Same as [`AppConfig::load`], but with the short-form overrides passed in
    /// explicitly instead of read from the process environment.
    ///
    /// ## Rust Concepts:
    /// - **&[(&str, String)]**: a borrowed slice of (config key, value) pairs
    /// - **Builder pattern**: each `add_source` call layers on top of the previous ones
    pub fn load_with_overrides(overrides: &[(&str, String)]) -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Nested environment variables, e.g. VOICE_ANONYMIZER_SERVER__HOST
            .add_source(
                config::Environment::with_prefix("VOICE_ANONYMIZER")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // 4. Short-form variables win over everything else
        for (key, value) in overrides {
            settings = settings.set_override(*key, value.as_str())?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 would bind a random port nobody knows about)
    /// - Upload limit is greater than 0 (otherwise every request is rejected)
    /// - Scratch directory is not an empty path
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.limits.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.storage.scratch_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Scratch directory cannot be empty"));
        }

        Ok(())  // All validation passed
    }

    /// Address string for `HttpServer::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.scratch_dir)
    }

    /// Upload limit converted to bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.limits.max_upload_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The defaults must match the documented service contract.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5002);
        assert_eq!(config.scratch_dir(), env::temp_dir());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.limits.max_upload_mb = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.scratch_dir = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_override_is_parsed() {
        let config =
            AppConfig::load_with_overrides(&[("server.port", "9090".to_string())]).unwrap();
        assert_eq!(config.server.port, 9090);
        // Untouched keys keep their defaults
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_scratch_dir_override() {
        let config = AppConfig::load_with_overrides(&[(
            "storage.scratch_dir",
            "/var/tmp/anonymizer".to_string(),
        )])
        .unwrap();
        assert_eq!(config.scratch_dir(), PathBuf::from("/var/tmp/anonymizer"));
    }

    fn fake_env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| k.as_str() == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_port_variable_sets_server_port() {
        let overrides = overrides_from(fake_env(&[("VOICE_ANONYMIZER_PORT", "9090")]));
        assert_eq!(overrides, vec![("server.port", "9090".to_string())]);

        let config = AppConfig::load_with_overrides(&overrides).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn test_host_and_scratch_variables_are_mapped() {
        let overrides = overrides_from(fake_env(&[
            ("VOICE_ANONYMIZER_HOST", "127.0.0.1"),
            ("VOICE_ANONYMIZER_SCRATCH_DIR", "/var/tmp/anon"),
            ("UNRELATED_PORT", "1"),
        ]));

        let config = AppConfig::load_with_overrides(&overrides).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.scratch_dir(), PathBuf::from("/var/tmp/anon"));
        assert_eq!(config.server.port, 5002);
    }

    #[test]
    fn test_no_variables_means_no_overrides() {
        assert!(overrides_from(|_| None).is_empty());
    }

    /// Only this test touches the real environment, and only with a variable nothing
    /// else reads.
    #[test]
    fn test_nested_environment_layer() {
        env::set_var("VOICE_ANONYMIZER_LIMITS__MAX_UPLOAD_MB", "7");
        let result = AppConfig::load_with_overrides(&[]);
        env::remove_var("VOICE_ANONYMIZER_LIMITS__MAX_UPLOAD_MB");

        let config = result.unwrap();
        assert_eq!(config.limits.max_upload_mb, 7);
        assert_eq!(config.max_upload_bytes(), 7 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_port_override_fails() {
        let result =
            AppConfig::load_with_overrides(&[("server.port", "not-a-port".to_string())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bind_addr_and_upload_limit() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:5002");
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
    }
}
