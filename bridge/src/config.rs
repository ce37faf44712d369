use crate::errors::ConfigError;
use crate::model::Device;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_HOME_MARKER: &str = "home.php";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_DEBUG_DUMP_DIR: &str = ".";

const REQUIRED_KEYS: [&str; 13] = [
    "WEB_USERNAME",
    "WEB_PASSWORD",
    "MQTT_USER",
    "MQTT_PASS",
    "LOGIN_URL",
    "HOME_URL",
    "AAQ_DATA_URL",
    "MQTT_HOST",
    "MQTT_PORT",
    "MQTT_TOPIC",
    "DEVICE_MILL_1",
    "DEVICE_MILL_2",
    "LOOP_INTERVAL",
];

/// Web portal endpoints and credentials.
#[derive(Clone)]
pub struct WebConfig {
    pub username: String,
    pub password: String,
    pub login_url: Url,
    pub home_url: Url,
    pub data_url: Url,
    /// Fragment the post-login landing URL must contain.
    pub home_marker: String,
    pub origin: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub topic: String,
    pub client_id: String,
    pub ack_timeout: Duration,
}

/// Everything the bridge needs, validated once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub web: WebConfig,
    pub mqtt: MqttConfig,
    pub mill_1: Device,
    pub mill_2: Device,
    pub interval: Duration,
    pub debug_dir: PathBuf,
}

impl fmt::Debug for WebConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .field("login_url", &self.login_url.as_str())
            .field("home_url", &self.home_url.as_str())
            .field("data_url", &self.data_url.as_str())
            .field("home_marker", &self.home_marker)
            .field("origin", &self.origin)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("ack_timeout", &self.ack_timeout)
            .finish()
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as missing, and every missing key is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        // Presence was checked above.
        let required = |key: &str| get(key).unwrap_or_default();

        let home_url = parse_url("HOME_URL", required("HOME_URL"))?;
        let origin = match get("SITE_ORIGIN") {
            Some(origin) => origin,
            None => home_url.origin().ascii_serialization(),
        };

        let web = WebConfig {
            username: required("WEB_USERNAME"),
            password: required("WEB_PASSWORD"),
            login_url: parse_url("LOGIN_URL", required("LOGIN_URL"))?,
            data_url: parse_url("AAQ_DATA_URL", required("AAQ_DATA_URL"))?,
            home_url,
            home_marker: get("HOME_MARKER").unwrap_or_else(|| DEFAULT_HOME_MARKER.to_string()),
            origin,
            timeout: Duration::from_secs(parse_optional_secs(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        };

        let mqtt = MqttConfig {
            host: required("MQTT_HOST"),
            port: parse_port(required("MQTT_PORT"))?,
            username: required("MQTT_USER"),
            password: required("MQTT_PASS"),
            topic: required("MQTT_TOPIC"),
            client_id: get("MQTT_CLIENT_ID")
                .unwrap_or_else(|| format!("spm-bridge-{}", uuid::Uuid::new_v4())),
            ack_timeout: Duration::from_secs(parse_optional_secs(
                "PUBLISH_TIMEOUT_SECS",
                get("PUBLISH_TIMEOUT_SECS"),
                DEFAULT_PUBLISH_TIMEOUT_SECS,
            )?),
        };

        Ok(Config {
            web,
            mqtt,
            mill_1: Device::new(required("DEVICE_MILL_1"), "MILL_1"),
            mill_2: Device::new(required("DEVICE_MILL_2"), "MILL_2"),
            interval: Duration::from_secs(parse_positive("LOOP_INTERVAL", required("LOOP_INTERVAL"))?),
            debug_dir: PathBuf::from(
                get("DEBUG_DUMP_DIR").unwrap_or_else(|| DEFAULT_DEBUG_DUMP_DIR.to_string()),
            ),
        })
    }
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|e| ConfigError::InvalidUrl {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_port(value: String) -> Result<u16, ConfigError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidInteger {
            key: "MQTT_PORT",
            value,
        }),
    }
}

fn parse_positive(key: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidInteger { key, value }),
    }
}

fn parse_optional_secs(
    key: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<u64, ConfigError> {
    match value {
        Some(value) => parse_positive(key, value),
        None => Ok(default),
    }
}
