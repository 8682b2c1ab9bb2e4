use crate::error::AppResult;
use config::{Config, Environment, File, FileFormat};
use dtouch_driver::{Connection, DeviceConfig};
use dtouch_sdk::RetryPolicy;
use serde::Deserialize;
use std::{ops::Deref, path::PathBuf, sync::Arc};

pub const DEFAULT_CONFIG_FILE_NAME: &str = "dtouch.toml";
const ENV_PREFIX: &str = "DTOUCH";

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load `config_path` (optional) overlaid with `DTOUCH__*` environment
    /// variables, e.g. `DTOUCH__DEVICE__ADDRESS=3`.
    pub fn new(config_path: &str) -> AppResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        let inner: Inner = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub connection: Connection,
    /// Backoff for (re)opening the connection.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default = "Log::level_default")]
    pub level: String,
    /// Directory of the daily rolling log file.
    #[serde(default = "Log::directory_default")]
    pub directory: String,
    #[serde(default = "Log::file_name_default")]
    pub file_name: String,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: Log::level_default(),
            directory: Log::directory_default(),
            file_name: Log::file_name_default(),
        }
    }
}

impl Log {
    fn level_default() -> String {
        "info".into()
    }

    fn directory_default() -> String {
        "logs".into()
    }

    fn file_name_default() -> String {
        "dtouch.log".into()
    }
}

/// Where finalized values go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Output {
    /// One structured log line per value.
    #[default]
    Log,
    /// JSON lines on stdout, or appended to `path`.
    Json {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtouch_driver::types::SerialParity;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.output, Output::Log);
        assert_eq!(settings.device.address, 1);
        assert_eq!(settings.device.update_interval_ms, 5_000);
        match &settings.connection {
            Connection::Serial {
                baud_rate, parity, ..
            } => {
                assert_eq!(*baud_rate, 57_600);
                assert_eq!(*parity, SerialParity::Even);
            }
            other => panic!("unexpected connection {other:?}"),
        }
    }

    #[test]
    fn full_settings_file() {
        let settings = Settings::from_toml_str(
            r#"
            [log]
            level = "debug"

            [connection]
            type = "tcp"
            host = "192.168.1.20"
            port = 4001

            [retry]
            initial_interval_ms = 500
            max_attempts = 10

            [device]
            address = 2
            update_interval_ms = 10000
            response_timeout_ms = 300

            [device.temperature]
            name = "kiln_temperature"
            num_probes = 4
            ideal = true
            final = true

            [device.equivalent_moisture_content]
            num_probes = 2

            [device.fans_level]
            name = "fans"

            [output]
            type = "json"
            path = "values.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(settings.log.level, "debug");
        assert_eq!(
            settings.connection,
            Connection::Tcp {
                host: "192.168.1.20".into(),
                port: 4001
            }
        );
        assert_eq!(settings.retry.initial_interval_ms, 500);
        assert_eq!(settings.retry.max_attempts, Some(10));
        assert_eq!(settings.device.address, 2);
        assert_eq!(settings.device.response_timeout_ms, Some(300));

        let temp = settings.device.temperature.as_ref().unwrap();
        assert_eq!(temp.num_probes, 4);
        assert!(temp.ideal && temp.final_value);
        assert_eq!(
            settings
                .device
                .equilibrium_moisture_content
                .as_ref()
                .unwrap()
                .num_probes,
            2
        );
        assert!(settings.device.fans_level.is_some());
        assert_eq!(
            settings.output,
            Output::Json {
                path: Some(PathBuf::from("values.jsonl"))
            }
        );
    }
}
