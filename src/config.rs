//! Connector configuration.
//!
//! [`ConnectorConfig`] holds the connection identity handed to
//! [`UstRouterConnector::init`](crate::UstRouterConnector::init);
//! [`ConnectorSettings`] holds tuning values fixed when the connector is
//! constructed. Both can be assembled with `with_*` setters or read from the
//! `[ust_router]` section of an INI file.

use std::{
    ffi::OsString,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use ini::{Ini, Properties};

use crate::{
    drop_report::DEFAULT_WARN_INTERVAL,
    error::ConfigError,
    timestamp::{Base36, TimestampCodec},
    transaction::DEFAULT_QUEUE_CAPACITY,
};

/// Default time allowed for a reply, or for a connection attempt.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default write timeout applied to the Router socket.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time `flush` waits for the queue to drain.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default base delay for reconnect retries.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Default maximum delay between reconnect retries.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);
/// Default window after which scheduled retries stop until the next enqueue.
pub const DEFAULT_BACKOFF_DEADLINE: Duration = Duration::from_secs(120);

/// INI section read by [`load_ini_file`] and [`load_ini_str`].
pub const INI_SECTION: &str = "ust_router";

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp://";

/// Where the Router listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouterAddress {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl RouterAddress {
    /// Interpret an address string.
    ///
    /// Accepts `unix:<path>`, `tcp://<host>:<port>`, `<host>:<port>`, and bare
    /// socket paths (anything containing `/` or lacking a numeric port).
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = |reason| ConfigError::InvalidAddress {
            address: raw.to_owned(),
            reason,
        };
        if let Some(path) = raw.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            return Ok(RouterAddress::Unix { path: path.into() });
        }
        if let Some(rest) = raw.strip_prefix(TCP_PREFIX) {
            return Self::parse_host_port(rest).ok_or_else(|| invalid("expected host:port"));
        }
        if raw.is_empty() {
            return Err(invalid("empty address"));
        }
        if raw.contains('/') {
            return Ok(RouterAddress::Unix { path: raw.into() });
        }
        Ok(Self::parse_host_port(raw).unwrap_or_else(|| RouterAddress::Unix { path: raw.into() }))
    }

    fn parse_host_port(raw: &str) -> Option<Self> {
        let (host, port) = raw.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(RouterAddress::Tcp {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for RouterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterAddress::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{host}]:{port}")
            }
            RouterAddress::Tcp { host, port } => write!(f, "{host}:{port}"),
            RouterAddress::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Identity and credentials used to talk to the Router.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub router_address: String,
    pub user: String,
    pub password: String,
    pub gateway_key: String,
    pub app_group_name: String,
    pub node_name: String,
}

impl ConnectorConfig {
    /// Empty configuration whose node name defaults to the host name.
    pub fn new() -> Self {
        Self {
            node_name: default_node_name(),
            ..Self::default()
        }
    }

    pub fn with_router_address(mut self, address: impl Into<String>) -> Self {
        self.router_address = address.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_gateway_key(mut self, key: impl Into<String>) -> Self {
        self.gateway_key = key.into();
        self
    }

    pub fn with_app_group_name(mut self, name: impl Into<String>) -> Self {
        self.app_group_name = name.into();
        self
    }

    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Check every required field and parse the Router address.
    pub fn validate(&self) -> Result<RouterAddress, ConfigError> {
        let required = [
            ("router_address", &self.router_address),
            ("user", &self.user),
            ("password", &self.password),
            ("gateway_key", &self.gateway_key),
            ("app_group_name", &self.app_group_name),
            ("node_name", &self.node_name),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::Missing(*field));
        }
        RouterAddress::parse(&self.router_address)
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("router_address", &self.router_address)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("gateway_key", &self.gateway_key)
            .field("app_group_name", &self.app_group_name)
            .field("node_name", &self.node_name)
            .finish()
    }
}

/// Host name used as the default node name.
pub fn default_node_name() -> String {
    node_name_from(hostname::get())
}

fn node_name_from(host: io::Result<OsString>) -> String {
    host.ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// Exponential backoff policy for reconnect retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub deadline: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
            deadline: DEFAULT_BACKOFF_DEADLINE,
        }
    }
}

/// Tuning values fixed for the lifetime of a connector.
#[derive(Clone)]
pub struct ConnectorSettings {
    pub queue_capacity: usize,
    pub watchdog_timeout: Duration,
    pub write_timeout: Duration,
    pub flush_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub warn_interval: Duration,
    pub codec: Arc<dyn TimestampCodec>,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            codec: Arc::new(Base36),
        }
    }
}

impl ConnectorSettings {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the codec used for wire timestamps.
    pub fn with_codec(mut self, codec: impl TimestampCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }
}

impl fmt::Debug for ConnectorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorSettings")
            .field("queue_capacity", &self.queue_capacity)
            .field("watchdog_timeout", &self.watchdog_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("flush_timeout", &self.flush_timeout)
            .field("backoff", &self.backoff)
            .field("warn_interval", &self.warn_interval)
            .finish_non_exhaustive()
    }
}

/// Read configuration and settings from an INI file.
pub fn load_ini_file(
    path: impl AsRef<Path>,
) -> Result<(ConnectorConfig, ConnectorSettings), ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ini(&path.display().to_string(), &text)
}

/// Read configuration and settings from INI text.
pub fn load_ini_str(text: &str) -> Result<(ConnectorConfig, ConnectorSettings), ConfigError> {
    parse_ini("<string>", text)
}

fn parse_ini(
    origin: &str,
    text: &str,
) -> Result<(ConnectorConfig, ConnectorSettings), ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse {
        origin: origin.to_owned(),
        message: err.to_string(),
    })?;
    let section = ini
        .section(Some(INI_SECTION))
        .ok_or_else(|| ConfigError::Parse {
            origin: origin.to_owned(),
            message: format!("missing [{INI_SECTION}] section"),
        })?;

    let text_value = |key: &str| section.get(key).map(str::trim).unwrap_or_default().to_owned();
    let mut config = ConnectorConfig::new()
        .with_router_address(text_value("address"))
        .with_credentials(text_value("user"), text_value("password"))
        .with_gateway_key(text_value("gateway_key"))
        .with_app_group_name(text_value("app_group_name"));
    if let Some(node) = section.get("node_name").map(str::trim).filter(|n| !n.is_empty()) {
        config.node_name = node.to_owned();
    }

    let mut settings = ConnectorSettings::default();
    if let Some(capacity) = parse_positive(section, "queue_capacity")? {
        settings.queue_capacity =
            usize::try_from(capacity).map_err(|_| ConfigError::InvalidValue {
                key: "queue_capacity".to_owned(),
                value: capacity.to_string(),
            })?;
    }
    if let Some(ms) = parse_positive(section, "watchdog_timeout_ms")? {
        settings.watchdog_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_positive(section, "write_timeout_ms")? {
        settings.write_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_positive(section, "flush_timeout_ms")? {
        settings.flush_timeout = Duration::from_millis(ms);
    }
    Ok((config, settings))
}

fn parse_positive(section: &Properties, key: &str) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: raw.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[fixture]
    fn complete() -> ConnectorConfig {
        ConnectorConfig::new()
            .with_router_address("unix:/tmp/ust_router.socket")
            .with_credentials("logging", "secret")
            .with_gateway_key("gw-key")
            .with_app_group_name("/srv/app (production)")
            .with_node_name("web1")
    }

    #[rstest]
    #[case("unix:/tmp/router.sock", RouterAddress::Unix { path: "/tmp/router.sock".into() })]
    #[case("/var/run/router.sock", RouterAddress::Unix { path: "/var/run/router.sock".into() })]
    #[case("router.sock", RouterAddress::Unix { path: "router.sock".into() })]
    #[case("127.0.0.1:9344", RouterAddress::Tcp { host: "127.0.0.1".into(), port: 9344 })]
    #[case("tcp://localhost:9344", RouterAddress::Tcp { host: "localhost".into(), port: 9344 })]
    #[case("[::1]:9344", RouterAddress::Tcp { host: "::1".into(), port: 9344 })]
    fn parses_address_forms(#[case] raw: &str, #[case] expected: RouterAddress) {
        assert_eq!(RouterAddress::parse(raw).expect("valid address"), expected);
    }

    #[rstest]
    #[case("unix:")]
    #[case("tcp://localhost")]
    #[case("tcp://:80")]
    #[case("   ")]
    fn rejects_malformed_addresses(#[case] raw: &str) {
        let err = RouterAddress::parse(raw).expect_err("address must be rejected");
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[rstest]
    fn displays_addresses_in_parseable_form() {
        for raw in ["unix:/tmp/r.sock", "127.0.0.1:9344", "[::1]:9344"] {
            let parsed = RouterAddress::parse(raw).expect("valid");
            assert_eq!(RouterAddress::parse(&parsed.to_string()).expect("valid"), parsed);
        }
    }

    #[rstest]
    fn complete_config_validates(complete: ConnectorConfig) {
        let address = complete.validate().expect("config is complete");
        assert!(matches!(address, RouterAddress::Unix { .. }));
    }

    #[rstest]
    #[case::address("router_address")]
    #[case::user("user")]
    #[case::password("password")]
    #[case::gateway_key("gateway_key")]
    #[case::app_group("app_group_name")]
    #[case::node("node_name")]
    fn any_empty_field_is_reported(complete: ConnectorConfig, #[case] field: &str) {
        let mut config = complete;
        match field {
            "router_address" => config.router_address.clear(),
            "user" => config.user.clear(),
            "password" => config.password.clear(),
            "gateway_key" => config.gateway_key.clear(),
            "app_group_name" => config.app_group_name.clear(),
            _ => config.node_name.clear(),
        }
        let err = config.validate().expect_err("incomplete config");
        assert!(matches!(err, ConfigError::Missing(name) if name == field));
    }

    #[rstest]
    fn debug_output_redacts_password(complete: ConnectorConfig) {
        let rendered = format!("{complete:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[rstest]
    fn default_node_name_is_never_empty() {
        assert!(!default_node_name().is_empty());
    }

    #[rstest]
    fn default_node_name_is_the_system_host_name() {
        let system = hostname::get()
            .expect("read host name")
            .into_string()
            .expect("utf-8 host name");
        assert_eq!(default_node_name(), system.trim());
    }

    #[rstest]
    #[case(Err(io::Error::other("no host name")))]
    #[case(Ok(OsString::from("  ")))]
    fn node_name_falls_back_to_localhost(#[case] host: io::Result<OsString>) {
        assert_eq!(node_name_from(host), "localhost");
    }

    #[rstest]
    fn loads_ini_with_tuning() {
        let text = "[ust_router]\n\
                    address = unix:/tmp/r.sock\n\
                    user = logging\n\
                    password = pw\n\
                    gateway_key = gk\n\
                    app_group_name = app\n\
                    node_name = node-7\n\
                    queue_capacity = 10\n\
                    watchdog_timeout_ms = 250\n";
        let (config, settings) = load_ini_str(text).expect("valid ini");
        assert_eq!(config.node_name, "node-7");
        assert_eq!(config.password, "pw");
        assert!(config.validate().is_ok());
        assert_eq!(settings.queue_capacity, 10);
        assert_eq!(settings.watchdog_timeout, Duration::from_millis(250));
        assert_eq!(settings.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }

    #[rstest]
    fn ini_without_section_is_rejected() {
        let err = load_ini_str("[other]\nkey = value\n").expect_err("section required");
        assert!(matches!(err, ConfigError::Parse { message, .. } if message.contains("ust_router")));
    }

    #[rstest]
    #[case("queue_capacity = 0")]
    #[case("watchdog_timeout_ms = soon")]
    #[case("queue_capacity = 18446744073709551616")]
    fn ini_rejects_bad_tuning(#[case] line: &str) {
        let err = load_ini_str(&format!("[ust_router]\n{line}\n")).expect_err("bad value");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[cfg(target_pointer_width = "32")]
    #[rstest]
    fn ini_rejects_capacity_beyond_usize() {
        let err = load_ini_str("[ust_router]\nqueue_capacity = 4294967296\n")
            .expect_err("capacity exceeds usize");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "queue_capacity"));
    }

    #[rstest]
    fn loads_ini_from_disk() {
        let mut file = NamedTempFile::new().expect("create temp ini file");
        writeln!(file, "[ust_router]\naddress = 127.0.0.1:9344\nuser = u").expect("write ini");
        let (config, _) = load_ini_file(file.path()).expect("should parse");
        assert_eq!(config.router_address, "127.0.0.1:9344");
        assert!(matches!(config.validate(), Err(ConfigError::Missing("password"))));
    }

    #[rstest]
    fn missing_file_reports_path() {
        let err = load_ini_file("/nonexistent/ust_router.ini").expect_err("file is missing");
        assert!(err.to_string().contains("/nonexistent/ust_router.ini"));
    }
}
