use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::{AuthWire, ClientMetadataWire};
use crate::reconnect::ReconnectPolicy;

/// Default config file template with comments, used by `config init`.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# gateway-client configuration file

# Connection defaults
# [connection]
# host = "127.0.0.1"
# port = 8765
# timeout_ms = 30000
# connect_timeout_ms = 10000

# Authentication (token XOR password — set at most one)
# [auth]
# token = "..."
# password = "..."

# Client identity sent during the handshake
# [client]
# id = "operator-cli"
# version = "0.1.0"
# platform = "linux"
# mode = "interactive"

# Reconnection policy
# [reconnect]
# max_retries = 5
# initial_backoff_ms = 100
# max_backoff_ms = 5000

# Output defaults
# [output]
# format = "json"           # json, pretty, plain
"#;

// ---------------------------------------------------------------------------
// Config structs (parsed from TOML) — every field optional
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    pub connection: ConnectionSection,
    pub auth: AuthSection,
    pub client: ClientSection,
    pub reconnect: ReconnectSection,
    pub output: OutputSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    /// Deadline for the second (`completion`) response of a split-response `agent` call.
    pub agent_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSection {
    pub token: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSection {
    pub id: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSection {
    pub format: Option<String>,
}

// ---------------------------------------------------------------------------
// Auth (token XOR password)
// ---------------------------------------------------------------------------

/// Authentication credential presented during the handshake. Exactly one of token or password,
/// never both — enforced at construction (`from_parts`), not left representable.
#[derive(Debug, Clone)]
pub enum Auth {
    Token(String),
    Password(String),
}

impl Auth {
    /// Builds an `Auth` from raw optional fields, rejecting the "both set" and accepting the
    /// "neither set" case as `Ok(None)` (unauthenticated connect, left to the server to refuse).
    ///
    /// # Errors
    /// Returns a protocol error if both `token` and `password` are set.
    pub fn from_parts(token: Option<String>, password: Option<String>) -> crate::err::Result<Option<Self>> {
        match (token, password) {
            (Some(_), Some(_)) => Err(crate::err::GatewayError::protocol(
                "auth: token and password are mutually exclusive",
            )),
            (Some(token), None) => Ok(Some(Self::Token(token))),
            (None, Some(password)) => Ok(Some(Self::Password(password))),
            (None, None) => Ok(None),
        }
    }

    #[must_use]
    pub fn to_wire(&self) -> AuthWire {
        match self {
            Self::Token(token) => AuthWire::token(token.clone()),
            Self::Password(password) => AuthWire::password(password.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ClientMetadata {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

impl ClientMetadata {
    #[must_use]
    pub fn to_wire(&self) -> ClientMetadataWire {
        ClientMetadataWire {
            id: self.id.clone(),
            version: self.version.clone(),
            platform: self.platform.clone(),
            mode: self.mode.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults filled in)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub agent_timeout: Duration,
}

/// Fully resolved, immutable-per-client configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub connection: ResolvedConnection,
    pub auth: Option<Auth>,
    pub client: ClientMetadata,
    pub reconnect: ReconnectPolicy,
    pub output_format: String,
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub role: &'static str,
}

impl ResolvedConfig {
    /// The `ws://` URL this config connects to.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/", self.connection.host, self.connection.port)
    }
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8765;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_AGENT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_MIN_PROTOCOL: u32 = 1;
const DEFAULT_MAX_PROTOCOL: u32 = 1;

/// Resolve a config file (plus any explicit overrides already folded into it) into a fully
/// populated `ResolvedConfig`.
///
/// # Errors
/// Returns an error if `auth` has both `token` and `password` set.
pub fn resolve_config(file: &ConfigFile, config_path: Option<PathBuf>) -> crate::err::Result<ResolvedConfig> {
    let port = file.connection.port.unwrap_or(DEFAULT_PORT);
    let port = if port == 0 { DEFAULT_PORT } else { port };

    let auth = Auth::from_parts(file.auth.token.clone(), file.auth.password.clone())?;

    Ok(ResolvedConfig {
        config_path,
        connection: ResolvedConnection {
            host: file.connection.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port,
            timeout: Duration::from_millis(file.connection.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
            connect_timeout: Duration::from_millis(
                file.connection.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            agent_timeout: Duration::from_millis(
                file.connection.agent_timeout_ms.unwrap_or(DEFAULT_AGENT_TIMEOUT_MS),
            ),
        },
        auth,
        client: ClientMetadata {
            id: file.client.id.clone().unwrap_or_else(|| "gateway-cli".to_owned()),
            version: file
                .client
                .version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
            platform: file.client.platform.clone().unwrap_or_else(|| std::env::consts::OS.to_owned()),
            mode: file.client.mode.clone().unwrap_or_else(|| "interactive".to_owned()),
        },
        reconnect: ReconnectPolicy {
            max_retries: file.reconnect.max_retries.unwrap_or(ReconnectPolicy::default().max_retries),
            initial_backoff: file
                .reconnect
                .initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(ReconnectPolicy::default().initial_backoff),
            max_backoff: file
                .reconnect
                .max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(ReconnectPolicy::default().max_backoff),
        },
        output_format: file.output.format.clone().unwrap_or_else(|| "json".to_owned()),
        min_protocol: DEFAULT_MIN_PROTOCOL,
        max_protocol: DEFAULT_MAX_PROTOCOL,
        role: "operator",
    })
}

// ---------------------------------------------------------------------------
// Config file search and loading
// ---------------------------------------------------------------------------

/// Find the first config file that exists, checking locations in priority order.
///
/// Search order:
/// 1. `explicit_path` (from `--config` flag)
/// 2. `$GATEWAY_CLIENT_CONFIG` environment variable
/// 3. `./.gateway-client.toml` (project-local)
/// 4. `~/.gateway-client.toml` (home directory fallback)
#[must_use]
pub fn find_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    find_config_file_with(explicit_path, std::env::var("GATEWAY_CLIENT_CONFIG").ok())
}

/// Testable variant of [`find_config_file`] that accepts an explicit env value.
#[must_use]
pub fn find_config_file_with(explicit_path: Option<&Path>, env_config: Option<String>) -> Option<PathBuf> {
    if let Some(p) = explicit_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
    }

    if let Some(env_path) = env_config {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return Some(p);
        }
    }

    let local = PathBuf::from(".gateway-client.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let home_config = PathBuf::from(home).join(".gateway-client.toml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load and parse a config file. Returns the file path (if found) and the parsed config.
///
/// On parse errors, logs a warning and returns `ConfigFile::default()`.
#[must_use]
pub fn load_config(explicit_path: Option<&Path>) -> (Option<PathBuf>, ConfigFile) {
    let path = find_config_file(explicit_path);
    match &path {
        Some(p) => (path.clone(), load_config_from(p)),
        None => (None, ConfigFile::default()),
    }
}

#[must_use]
pub fn load_config_from(path: &Path) -> ConfigFile {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "could not read config file");
            return ConfigFile::default();
        }
    };

    parse_config(&contents, path)
}

/// Parse TOML content into a `ConfigFile`. Uses a two-pass strategy: strict parsing first (to
/// detect unknown keys), then lenient parsing so a typo in one section doesn't discard the rest.
#[must_use]
pub fn parse_config(contents: &str, path: &Path) -> ConfigFile {
    match toml::from_str::<StrictConfigFile>(contents) {
        Ok(strict) => strict.into(),
        Err(strict_err) => match toml::from_str::<ConfigFile>(contents) {
            Ok(config) => {
                tracing::warn!(path = %path.display(), error = %strict_err, "unknown keys in config file");
                config
            }
            Err(parse_err) => {
                tracing::warn!(path = %path.display(), error = %parse_err, "could not parse config file");
                ConfigFile::default()
            }
        },
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictConfigFile {
    #[serde(default)]
    connection: ConnectionSection,
    #[serde(default)]
    auth: AuthSection,
    #[serde(default)]
    client: ClientSection,
    #[serde(default)]
    reconnect: ReconnectSection,
    #[serde(default)]
    output: OutputSection,
}

impl From<StrictConfigFile> for ConfigFile {
    fn from(strict: StrictConfigFile) -> Self {
        Self {
            connection: strict.connection,
            auth: strict.auth,
            client: strict.client,
            reconnect: strict.reconnect,
            output: strict.output,
        }
    }
}

// ---------------------------------------------------------------------------
// Config init
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    AlreadyExists(PathBuf),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(f, "config file error: {error}"),
            Self::AlreadyExists(path) => write!(f, "config file already exists: {}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::AlreadyExists(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

/// Create a default config file at `path`.
///
/// # Errors
/// - `ConfigError::AlreadyExists` if the file already exists
/// - `ConfigError::Io` on I/O failure
pub fn init_config_to(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(path.to_path_buf())
}
