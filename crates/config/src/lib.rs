//! Engine configuration.
//!
//! Configuration is applied once, when the engine is constructed, and never
//! changes afterwards. It can come from a file (TOML, JSON or YAML, picked by
//! extension), from an in-process JSON object, or both layered with the
//! object on top:
//!
//! ```
//! use resync_config::Config;
//! use resync_storage::BackendKind;
//! use serde_json::json;
//!
//! let config = Config::parse(&json!({"storage": "local", "namespace": "app"})).unwrap();
//! assert_eq!(config.preferred_backend, BackendKind::Flat);
//! assert_eq!(config.namespace, "app");
//! assert!(config.check_for_updates);
//! ```
//!
//! Parsing is all-or-nothing: an unknown key, a value of the wrong type or a
//! value that fails validation rejects the *whole* configuration.
//! [`Config::resolve`] turns such a rejection into the defaults plus the
//! error, which is what the engine does at construction.

pub mod error;

use crate::error::{ErrorKind, Result};
use figment::Figment;
use figment::providers::{Format, Json, Toml, Yaml};
use resync_storage::{BackendKind, validate_namespace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_NAMESPACE: &str = "quiche";
pub const DEFAULT_CONNECTIVITY_URL: &str = "https://www.google.com/generate_204";

/// Recognized options.
///
/// Keys are camelCase. The legacy names `debug`, `onlineCheckTimeout` and
/// `storage` are accepted as aliases (for `debugLogging`, `probeTimeoutMs` and
/// `preferredBackend`); giving both names of one option is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    /// Emit per-transition diagnostics at `debug` level.
    #[serde(alias = "debug")]
    pub debug_logging: bool,
    /// Bound on every fingerprint and connectivity probe.
    #[serde(alias = "onlineCheckTimeout")]
    pub probe_timeout_ms: u64,
    /// Bound on every full download, body included.
    pub download_timeout_ms: u64,
    /// Verify cached resources against the origin before reusing them.
    pub check_for_updates: bool,
    /// Backend to use when the host supports it.
    #[serde(alias = "storage")]
    pub preferred_backend: BackendKind,
    /// Prefix of every persisted entry.
    pub namespace: String,
    /// Endpoint of the connectivity probe.
    pub connectivity_url: String,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            debug_logging: false,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            download_timeout_ms: DEFAULT_DOWNLOAD_TIMEOUT_MS,
            check_for_updates: true,
            preferred_backend: BackendKind::Dual,
            namespace: DEFAULT_NAMESPACE.to_string(),
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Toml,
    Json,
    Yaml,
}
impl FileFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => exn::bail!(ErrorKind::Invalid(format!(
                "unsupported configuration file `{}` (expected .toml, .json, .yaml or .yml)",
                path.display()
            ))),
        }
    }
}

impl Config {
    /// Strictly parse an in-process configuration object.
    ///
    /// # Errors
    ///
    /// [`NotAnObject`](ErrorKind::NotAnObject) for anything other than a
    /// non-empty JSON object; [`Invalid`](ErrorKind::Invalid) for unknown
    /// keys, wrong types or values that fail validation.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::load(None, Some(value))
    }

    /// Strictly parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()), None)
    }

    /// Layer an optional file and an optional in-process object (which wins)
    /// over the defaults.
    pub fn load(file: Option<&Path>, overrides: Option<&Value>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            let format = FileFormat::from_path(path)?;
            // Providers treat a missing file as empty; a named file must exist.
            if !path.is_file() {
                exn::bail!(ErrorKind::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("`{}` does not exist", path.display()),
                )));
            }
            figment = match format {
                FileFormat::Toml => figment.merge(Toml::file(path)),
                FileFormat::Json => figment.merge(Json::file(path)),
                FileFormat::Yaml => figment.merge(Yaml::file(path)),
            };
        }
        if let Some(value) = overrides {
            if !value.as_object().is_some_and(|object| !object.is_empty()) {
                exn::bail!(ErrorKind::NotAnObject);
            }
            figment = figment.merge(Json::string(&value.to_string()));
        }
        let config: Self = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the all-or-nothing rule: the parsed configuration, or the
    /// defaults together with the reason the input was rejected.
    ///
    /// `None` means no configuration was given, which is not an error.
    pub fn resolve(value: Option<&Value>) -> (Self, Option<error::Error>) {
        let Some(value) = value else {
            return (Self::default(), None);
        };
        match Self::parse(value) {
            Ok(config) => (config, None),
            Err(err) => {
                tracing::warn!(error = %err, "Configuration rejected, using defaults");
                (Self::default(), Some(err))
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.probe_timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("probeTimeoutMs must be greater than zero".to_string()));
        }
        if self.download_timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("downloadTimeoutMs must be greater than zero".to_string()));
        }
        if validate_namespace(&self.namespace).is_err() {
            exn::bail!(ErrorKind::Invalid(format!("namespace {:?} cannot be used for storage", self.namespace)));
        }
        if self.connectivity_url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("connectivityUrl must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.debug_logging);
        assert_eq!(config.probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.download_timeout(), Duration::from_secs(30));
        assert!(config.check_for_updates);
        assert_eq!(config.preferred_backend, BackendKind::Dual);
        assert_eq!(config.namespace, "quiche");
    }

    #[test]
    fn test_parse_all_options() {
        let config = Config::parse(&json!({
            "debugLogging": true,
            "probeTimeoutMs": 300,
            "downloadTimeoutMs": 5000,
            "checkForUpdates": false,
            "preferredBackend": "flat",
            "namespace": "app",
            "connectivityUrl": "http://127.0.0.1:9/204",
        }))
        .unwrap();
        assert_eq!(
            config,
            Config {
                debug_logging: true,
                probe_timeout_ms: 300,
                download_timeout_ms: 5000,
                check_for_updates: false,
                preferred_backend: BackendKind::Flat,
                namespace: "app".to_string(),
                connectivity_url: "http://127.0.0.1:9/204".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_legacy_names() {
        let config = Config::parse(&json!({"debug": true, "onlineCheckTimeout": 20, "storage": "localStorage"})).unwrap();
        assert!(config.debug_logging);
        assert_eq!(config.probe_timeout_ms, 20);
        assert_eq!(config.preferred_backend, BackendKind::Flat);
        // Unspecified options keep their defaults.
        assert_eq!(config.namespace, "quiche");
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!("debug"))]
    #[case(json!(42))]
    #[case(json!([{"debug": true}]))]
    #[case(json!({}))]
    fn test_rejects_non_object(#[case] value: Value) {
        let err = Config::parse(&value).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotAnObject));
    }

    #[rstest]
    #[case(json!({"debugLogging": true, "colour": "blue"}))]
    #[case(json!({"probeTimeoutMs": "fast"}))]
    #[case(json!({"probeTimeoutMs": 0}))]
    #[case(json!({"downloadTimeoutMs": 0}))]
    #[case(json!({"preferredBackend": "indexeddb"}))]
    #[case(json!({"namespace": ""}))]
    #[case(json!({"namespace": "a/b"}))]
    #[case(json!({"debug": true, "debugLogging": false}))]
    fn test_rejects_invalid(#[case] value: Value) {
        let err = Config::parse(&value).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)), "{err}");
    }

    #[test]
    fn test_resolve_is_all_or_nothing() {
        let (config, err) = Config::resolve(Some(&json!({"debugLogging": true, "bogus": 1})));
        assert_eq!(config, Config::default());
        assert!(err.is_some());

        let (config, err) = Config::resolve(Some(&json!({"namespace": "ok"})));
        assert_eq!(config.namespace, "ok");
        assert!(err.is_none());

        let (config, err) = Config::resolve(None);
        assert_eq!(config, Config::default());
        assert!(err.is_none());
    }

    #[rstest]
    #[case("config.toml", "namespace = \"from-toml\"\nprobeTimeoutMs = 250\n")]
    #[case("config.json", r#"{"namespace": "from-json", "probeTimeoutMs": 250}"#)]
    #[case("config.yaml", "namespace: from-yaml\nprobeTimeoutMs: 250\n")]
    fn test_from_file(#[case] name: &str, #[case] contents: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert!(config.namespace.starts_with("from-"));
        assert_eq!(config.probe_timeout_ms, 250);
    }

    #[test]
    fn test_from_file_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = Config::from_file(temp_dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(&*missing, ErrorKind::Io(_)));
        let unsupported = Config::from_file(temp_dir.path().join("config.ini")).unwrap_err();
        assert!(matches!(&*unsupported, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_object_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "namespace = \"file\"\ncheckForUpdates = false\n").unwrap();
        let config = Config::load(Some(&path), Some(&json!({"namespace": "object"}))).unwrap();
        assert_eq!(config.namespace, "object");
        assert!(!config.check_for_updates);
    }
}
