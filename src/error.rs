use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no device named `{name}` was found in the fake fixture")]
    NoMatchingFixtureDevice { name: String },
    #[error("required Nuimo endpoints are missing: {missing}")]
    MissingRequiredEndpoints { missing: String },
    #[error("characteristic `{uuid}` was not discovered on the connected device")]
    UnknownCharacteristic { uuid: String },
    #[error("no device is connected")]
    NotConnected,
    #[error("the device link has been closed")]
    LinkClosed,
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
}

/// Errors returned when parsing fake backend fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("notification fixture `{record}` must have the form `source=hex`")]
    InvalidRecord { record: String },
    #[error("unknown notification source `{name}`")]
    UnknownSource { name: String },
    #[error("fixture payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned while loading the scene configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scene configuration `{path}`")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("scene configuration is malformed")]
    Malformed(#[from] serde_json::Error),
    #[error("scene configuration is malformed")]
    MalformedToml(#[from] toml::de::Error),
    #[error("scene configuration `{path}` must be a `.json` or `.toml` file")]
    UnsupportedFormat { path: PathBuf },
    #[error("scene configuration must define at least one scene")]
    NoScenes,
    #[error("scene names must not be empty")]
    EmptySceneName,
    #[error("scene `{name}` is defined more than once")]
    DuplicateScene { name: String },
    #[error("no configuration directory is available on this platform")]
    NoConfigDirectory,
}

/// Errors returned while parsing or rendering a command template.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CommandError {
    #[error("command `{command}` has no `prefix:` separator")]
    MissingSeparator { command: String },
    #[error("template references unknown field `{field}`")]
    UnknownField { field: String },
    #[error("template `{body}` has an unterminated placeholder")]
    UnterminatedPlaceholder { body: String },
}

/// Errors returned by the FHEM telnet client.
#[derive(Debug, Error)]
pub enum FhemError {
    #[error("failed to connect to FHEM at {address}")]
    Connect {
        address: String,
        source: std::io::Error,
    },
    #[error("failed to write command to FHEM")]
    Write(#[source] std::io::Error),
    #[error("failed to read FHEM reply")]
    Read(#[source] std::io::Error),
    #[error("timed out waiting for FHEM reply")]
    ReadTimeout,
    #[error("FHEM closed the connection")]
    Closed,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}
