//! Server and client configuration.
//!
//! Both files are flat TOML tables. Loading is lenient per field: a key
//! that is missing keeps its default silently, a key with the wrong type or
//! an out-of-range value keeps its default with a warning, and unknown keys
//! are reported and ignored. A missing file yields the defaults.
//!
//! ```toml
//! # server.toml
//! bind_addr = "0.0.0.0:50023"
//! cert_file = "cert.pem"
//! key_file = "cert.key"
//! database_file = "dicelog.db"
//! token_timeout_secs = 172800
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dicelog_session::SessionConfig;
use dicelog_transport::{ClientTlsConfig, Timeouts};
use serde::de::DeserializeOwned;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading a configuration file.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting is missing or unusable.
    #[error("configuration validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Settings for `dicelog server`, `new-user` and `passwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the TLS listener binds to.
    pub bind_addr: String,
    /// PEM certificate chain presented to clients.
    pub cert_file: PathBuf,
    /// PEM private key for `cert_file`.
    pub key_file: PathBuf,
    /// SQLite database holding identities, tokens and history.
    pub database_file: PathBuf,
    /// Lifetime of a session token in seconds.
    pub token_timeout_secs: i64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Extra read time granted while waiting for an `AuthMessage`.
    pub auth_timeout_extension_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:50023".into(),
            cert_file: PathBuf::from("cert.pem"),
            key_file: PathBuf::from("cert.key"),
            database_file: PathBuf::from("dicelog.db"),
            token_timeout_secs: SessionConfig::default().token_timeout_secs,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            auth_timeout_extension_ms: 60_000,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, or is not
    /// valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&read_config(path)?)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table = content.parse::<toml::Table>()?;
        let defaults = Self::default();
        let mut fields = Fields::new(&table);

        let config = Self {
            bind_addr: fields.get_checked("bind_addr", defaults.bind_addr, |addr: &String| {
                host_port(addr)
            }),
            cert_file: fields.get("cert_file", defaults.cert_file),
            key_file: fields.get("key_file", defaults.key_file),
            database_file: fields.get("database_file", defaults.database_file),
            token_timeout_secs: fields.get_checked(
                "token_timeout_secs",
                defaults.token_timeout_secs,
                |&secs| non_negative(secs),
            ),
            read_timeout_ms: fields.get_checked(
                "read_timeout_ms",
                defaults.read_timeout_ms,
                |&ms| positive(ms),
            ),
            write_timeout_ms: fields.get_checked(
                "write_timeout_ms",
                defaults.write_timeout_ms,
                |&ms| positive(ms),
            ),
            auth_timeout_extension_ms: fields.get(
                "auth_timeout_extension_ms",
                defaults.auth_timeout_extension_ms,
            ),
        };
        fields.warn_unknown();
        Ok(config)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_millis(self.read_timeout_ms, self.write_timeout_ms)
    }

    pub fn auth_extension(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_extension_ms)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            token_timeout_secs: self.token_timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Settings for `dicelog client`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the DiceLog server.
    pub server_addr: String,
    /// Name the server certificate must carry.
    pub server_name: String,
    /// SHA-256 fingerprint of a self-signed server certificate. Empty
    /// disables pinning.
    pub server_fingerprint: String,
    /// Optional PEM file with additional trust anchors.
    pub ca_file: Option<PathBuf>,
    /// Identity name offered when the server asks for a password.
    pub username: String,
    /// Where the session token is kept between runs.
    pub token_file: PathBuf,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Extra write time granted while authenticating.
    pub auth_timeout_extension_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:50023".into(),
            server_name: "localhost".into(),
            server_fingerprint: String::new(),
            ca_file: None,
            username: "Discord Bot".into(),
            token_file: PathBuf::from(".token"),
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            auth_timeout_extension_ms: 60_000,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml(&read_config(path)?)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let table = content.parse::<toml::Table>()?;
        let defaults = Self::default();
        let mut fields = Fields::new(&table);

        let config = Self {
            server_addr: fields.get_checked("server_addr", defaults.server_addr, |addr: &String| {
                host_port(addr)
            }),
            server_name: fields.get_checked("server_name", defaults.server_name, |name: &String| {
                if name.is_empty() {
                    Err("must not be empty".into())
                } else {
                    Ok(())
                }
            }),
            server_fingerprint: fields
                .get("server_fingerprint", defaults.server_fingerprint),
            ca_file: fields.get("ca_file", defaults.ca_file),
            username: fields.get("username", defaults.username),
            token_file: fields.get("token_file", defaults.token_file),
            read_timeout_ms: fields.get_checked(
                "read_timeout_ms",
                defaults.read_timeout_ms,
                |&ms| positive(ms),
            ),
            write_timeout_ms: fields.get_checked(
                "write_timeout_ms",
                defaults.write_timeout_ms,
                |&ms| positive(ms),
            ),
            auth_timeout_extension_ms: fields.get(
                "auth_timeout_extension_ms",
                defaults.auth_timeout_extension_ms,
            ),
        };
        fields.warn_unknown();
        Ok(config)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from_millis(self.read_timeout_ms, self.write_timeout_ms)
    }

    pub fn auth_extension(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_extension_ms)
    }

    /// TLS settings for [`TlsDialer`](dicelog_transport::TlsDialer).
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if `ca_file` is set but unreadable.
    pub fn tls_config(&self) -> Result<ClientTlsConfig, ConfigError> {
        let ca_pem = match &self.ca_file {
            Some(path) => Some(std::fs::read(path).map_err(|source| {
                ConfigError::Io {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };
        let fingerprint = Some(self.server_fingerprint.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_owned);

        Ok(ClientTlsConfig {
            server_name: self.server_name.clone(),
            fingerprint,
            ca_pem,
        })
    }
}

// ---------------------------------------------------------------------------
// Lenient field extraction
// ---------------------------------------------------------------------------

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts `host:port` where host is a name or an address.
fn host_port(addr: &str) -> Result<(), String> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => port
            .parse::<u16>()
            .map(|_| ())
            .map_err(|e| format!("bad port: {e}")),
        _ => Err("expected host:port".into()),
    }
}

fn positive(ms: u64) -> Result<(), String> {
    if ms == 0 {
        Err("must be greater than zero".into())
    } else {
        Ok(())
    }
}

fn non_negative(secs: i64) -> Result<(), String> {
    if secs < 0 {
        Err("must not be negative".into())
    } else {
        Ok(())
    }
}

/// Reads typed fields out of a TOML table, remembering which keys were used.
struct Fields<'a> {
    table: &'a toml::Table,
    known: HashSet<&'static str>,
}

impl<'a> Fields<'a> {
    fn new(table: &'a toml::Table) -> Self {
        Self {
            table,
            known: HashSet::new(),
        }
    }

    fn get<T: DeserializeOwned>(&mut self, key: &'static str, default: T) -> T {
        self.get_checked(key, default, |_| Ok(()))
    }

    fn get_checked<T, F>(&mut self, key: &'static str, default: T, check: F) -> T
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> Result<(), String>,
    {
        self.known.insert(key);
        let Some(value) = self.table.get(key) else {
            return default;
        };
        let parsed = value
            .clone()
            .try_into::<T>()
            .map_err(|e| e.to_string())
            .and_then(|v| check(&v).map(|()| v));
        match parsed {
            Ok(v) => v,
            Err(reason) => {
                tracing::warn!(key, %reason, "invalid configuration value, using default");
                default
            }
        }
    }

    fn warn_unknown(&self) {
        for key in self.table.keys() {
            if !self.known.contains(key.as_str()) {
                tracing::warn!(key = %key, "unknown configuration key ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // ServerConfig
    // =====================================================================

    #[test]
    fn test_server_from_toml_empty_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr, "127.0.0.1:50023");
        assert_eq!(config.token_timeout_secs, 172_800);
        assert_eq!(config.auth_extension(), Duration::from_secs(60));
    }

    #[test]
    fn test_server_from_toml_overrides_fields() {
        let config = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            database_file = "/var/lib/dicelog.db"
            token_timeout_secs = 60
            read_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.database_file, PathBuf::from("/var/lib/dicelog.db"));
        assert_eq!(config.session_config().token_timeout_secs, 60);
        assert_eq!(config.timeouts().read, Duration::from_millis(250));
        assert_eq!(config.timeouts().write, Duration::from_millis(5000));
    }

    #[test]
    fn test_server_from_toml_wrong_type_falls_back() {
        let config = ServerConfig::from_toml(
            r#"
            read_timeout_ms = "fast"
            write_timeout_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.read_timeout_ms, 5000);
        assert_eq!(config.write_timeout_ms, 100);
    }

    #[test]
    fn test_server_from_toml_hostname_bind_addr_kept() {
        let config = ServerConfig::from_toml(r#"bind_addr = "localhost:50023""#).unwrap();
        assert_eq!(config.bind_addr, "localhost:50023");

        let config = ServerConfig::from_toml(r#"bind_addr = "[::1]:7000""#).unwrap();
        assert_eq!(config.bind_addr, "[::1]:7000");
    }

    #[test]
    fn test_host_port_bad_port_or_missing_host_rejected() {
        assert!(host_port("localhost:50023").is_ok());
        assert!(host_port("localhost:99999").is_err());
        assert!(host_port("localhost").is_err());
        assert!(host_port(":50023").is_err());
    }

    #[test]
    fn test_server_from_toml_out_of_range_falls_back() {
        let config = ServerConfig::from_toml(
            r#"
            bind_addr = "not an address"
            token_timeout_secs = -5
            write_timeout_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:50023");
        assert_eq!(config.token_timeout_secs, 172_800);
        assert_eq!(config.write_timeout_ms, 5000);
    }

    #[test]
    fn test_server_from_toml_unknown_key_ignored() {
        let config =
            ServerConfig::from_toml("colour = \"blue\"\nkey_file = \"k.pem\"")
                .unwrap();
        assert_eq!(config.key_file, PathBuf::from("k.pem"));
    }

    #[test]
    fn test_server_from_toml_syntax_error_fails() {
        let result = ServerConfig::from_toml("bind_addr = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_server_load_or_default_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            ServerConfig::load_or_default(&dir.path().join("absent.toml"))
                .unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_server_from_file_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "cert_file = \"chain.pem\"\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.cert_file, PathBuf::from("chain.pem"));
    }

    #[test]
    fn test_server_from_file_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    // =====================================================================
    // ClientConfig
    // =====================================================================

    #[test]
    fn test_client_from_toml_empty_uses_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.username, "Discord Bot");
        assert_eq!(config.token_file, PathBuf::from(".token"));
    }

    #[test]
    fn test_client_from_toml_overrides_fields() {
        let config = ClientConfig::from_toml(
            r#"
            server_addr = "dice.example:50023"
            server_name = "dice.example"
            server_fingerprint = "AB:CD"
            username = "bot"
            ca_file = "ca.pem"
            "#,
        )
        .unwrap();
        assert_eq!(config.server_addr, "dice.example:50023");
        assert_eq!(config.username, "bot");
        assert_eq!(config.ca_file, Some(PathBuf::from("ca.pem")));
    }

    #[test]
    fn test_client_from_toml_empty_server_name_falls_back() {
        let config = ClientConfig::from_toml("server_name = \"\"").unwrap();
        assert_eq!(config.server_name, "localhost");
    }

    #[test]
    fn test_client_tls_config_empty_fingerprint_disables_pinning() {
        let tls = ClientConfig::default().tls_config().unwrap();
        assert_eq!(tls.server_name, "localhost");
        assert!(tls.fingerprint.is_none());
        assert!(tls.ca_pem.is_none());
    }

    #[test]
    fn test_client_tls_config_reads_ca_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, b"-----BEGIN CERTIFICATE-----").unwrap();

        let config = ClientConfig {
            ca_file: Some(path),
            server_fingerprint: " 0A0B ".into(),
            ..ClientConfig::default()
        };
        let tls = config.tls_config().unwrap();
        assert_eq!(tls.fingerprint.as_deref(), Some("0A0B"));
        assert!(tls.ca_pem.is_some());
    }

    #[test]
    fn test_client_tls_config_missing_ca_file_fails() {
        let config = ClientConfig {
            ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..ClientConfig::default()
        };
        assert!(matches!(config.tls_config(), Err(ConfigError::Io { .. })));
    }
}
