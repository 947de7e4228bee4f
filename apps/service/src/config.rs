use std::{env, fmt, str::FromStr, time::Duration};

use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::pipeline::{ChannelPolicy, FailurePolicy};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_DATABASE: &str = "healthcheck.db";
const DEFAULT_USER: &str = "foo";
const DEFAULT_PASSWORD: &str = "bar";
const DEFAULT_PERSIST_ATTEMPTS: u32 = 3;
const DEFAULT_PERSIST_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: Server,
    pub database: DatabaseConfig,
    pub credentials: Credentials,
    pub pipeline: Pipeline,
    /// Per-probe timeout; `None` leaves the transport default in place
    pub probe_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Local file path, or a `libsql://` / `http(s)://` URL
    pub url: String,
    pub auth_token: Option<String>,
    pub max_connections: usize,
}

impl DatabaseConfig {
    pub fn is_remote(&self) -> bool {
        ["libsql://", "http://", "https://"].iter().any(|scheme| self.url.starts_with(scheme))
    }
}

/// The single static credential pair guarding the management routes
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Compare both halves in constant time, never short-circuiting on the username
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let username = self.username.as_bytes().ct_eq(username.as_bytes());
        let password = self.password.as_bytes().ct_eq(password.as_bytes());
        (username & password).into()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub channel: ChannelPolicy,
    pub failure: FailurePolicy,
}

/// Cloud Foundry style service bindings (`VCAP_SERVICES`)
#[derive(Debug, Deserialize)]
struct VcapServices {
    #[serde(rename = "user-provided", default)]
    user_provided: Vec<UserProvidedService>,
}

#[derive(Debug, Deserialize)]
struct UserProvidedService {
    credentials: ServiceCredentials,
}

#[derive(Debug, Deserialize)]
struct ServiceCredentials {
    #[serde(alias = "Uri")]
    uri: String,
}

fn database_url_from_vcap(raw: &str) -> Option<String> {
    match serde_json::from_str::<VcapServices>(raw) {
        Ok(services) => services.user_provided.into_iter().next().map(|s| s.credentials.uri),
        Err(e) => {
            warn!("Failed to parse VCAP_SERVICES, ignoring it: {e}");
            None
        }
    }
}

/// Read `name` through `lookup`, falling back to `default` when unset or malformed
fn get_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid value for {name} ({raw:?}): {e}, using default");
            default
        }),
        None => default,
    }
}

fn get_duration(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = lookup(name)?;
    humantime::parse_duration(raw.trim())
        .inspect_err(|e| warn!("Invalid duration for {name} ({raw:?}): {e}, ignoring it"))
        .ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Server { bind: DEFAULT_BIND.into(), port: DEFAULT_PORT },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE.into(),
                auth_token: None,
                max_connections: 8,
            },
            credentials: Credentials {
                username: DEFAULT_USER.into(),
                password: DEFAULT_PASSWORD.into(),
            },
            pipeline: Pipeline::default(),
            probe_timeout: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let database_url = lookup("PINGER_DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .or_else(|| lookup("VCAP_SERVICES").and_then(|raw| database_url_from_vcap(&raw)))
            .unwrap_or(defaults.database.url);

        let failure = match lookup("PINGER_PERSIST_FAILURE").as_deref().map(str::trim) {
            Some("halt") => FailurePolicy::Halt,
            other => {
                if let Some(other) = other.filter(|v| *v != "retry") {
                    warn!("Unknown PINGER_PERSIST_FAILURE {other:?}, using retry");
                }
                FailurePolicy::Retry {
                    attempts: get_var(&lookup, "PINGER_PERSIST_ATTEMPTS", DEFAULT_PERSIST_ATTEMPTS),
                    backoff: get_duration(&lookup, "PINGER_PERSIST_BACKOFF")
                        .unwrap_or(DEFAULT_PERSIST_BACKOFF),
                }
            }
        };

        Self {
            server: Server {
                bind: lookup("BIND").unwrap_or(defaults.server.bind),
                port: get_var(&lookup, "PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: database_url,
                auth_token: lookup("PINGER_DATABASE_AUTH_TOKEN"),
                max_connections: get_var(
                    &lookup,
                    "PINGER_DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
            },
            credentials: Credentials {
                username: lookup("PINGER_AUTH_USER").unwrap_or(defaults.credentials.username),
                password: lookup("PINGER_AUTH_PASSWORD").unwrap_or(defaults.credentials.password),
            },
            pipeline: Pipeline {
                channel: get_var(&lookup, "PINGER_CHANNEL", defaults.pipeline.channel),
                failure,
            },
            probe_timeout: get_duration(&lookup, "PINGER_PROBE_TIMEOUT"),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let failure = match self.pipeline.failure {
            FailurePolicy::Halt => "halt".to_string(),
            FailurePolicy::Retry { attempts, backoff } => format!(
                "retry ({attempts} attempts, {} backoff)",
                humantime::format_duration(backoff)
            ),
        };
        let probe_timeout = self
            .probe_timeout
            .map(|t| humantime::format_duration(t).to_string())
            .unwrap_or_else(|| "transport default".to_string());

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_1(f, "Auth User", &self.credentials.username)?;
        write_title_1(f, "Database")?;
        write_1(f, "URL", &self.database.url)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Pipeline")?;
        write_1(f, "Channel", &self.pipeline.channel)?;
        write_1(f, "On Persist Failure", &failure)?;
        write_1(f, "Probe Timeout", &probe_timeout)?;

        Ok(())
    }
}
