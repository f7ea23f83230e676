use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::fhem::{DEFAULT_FHEM_HOST, DEFAULT_FHEM_PORT};
use crate::handlers::{DEFAULT_ICON_BRIGHTNESS, DEFAULT_ICON_TIMEOUT};
use crate::hw::{DEFAULT_DEVICE_NAME, FakeTransportConfig, NotificationFixture, SessionConfig};

/// Command-line options for the Nuimo to FHEM bridge.
#[derive(Debug, Parser)]
#[command(
    name = "nuimo-bridge",
    version,
    about = "Bridge a Senic Nuimo controller to a FHEM home automation server."
)]
pub struct Args {
    /// FHEM telnet host.
    #[arg(long, default_value = DEFAULT_FHEM_HOST)]
    host: String,
    /// FHEM telnet port.
    #[arg(long, default_value_t = DEFAULT_FHEM_PORT)]
    port: u16,
    /// Interval between keepalive battery reads (e.g. `300s`, `5m`); `0s` disables keepalive.
    #[arg(long, default_value = "300s", value_parser = parse_duration)]
    keepalive: Duration,
    /// Scene configuration file, JSON or `.toml` (YAML is not supported). Defaults to
    /// `./scenes.json` or `./scenes.toml`, then the user config directory.
    #[arg(long)]
    scenes: Option<PathBuf>,
    /// Advertised BLE name to connect to.
    #[arg(long, default_value = DEFAULT_DEVICE_NAME)]
    device_name: String,
    /// LED brightness for icons.
    #[arg(long, default_value_t = DEFAULT_ICON_BRIGHTNESS)]
    icon_brightness: u8,
    /// Icon display time in tenths of a second.
    #[arg(long, default_value_t = DEFAULT_ICON_TIMEOUT)]
    icon_timeout: u8,
    /// Log level override; `RUST_LOG` applies when unset.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    /// Log output format. Defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    /// Uses the fake BLE transport instead of real hardware.
    #[arg(long)]
    fake: bool,
    /// Battery level reported by the fake transport.
    #[arg(long, requires = "fake")]
    fake_battery: Option<u8>,
    /// Fake notifications in the form `source=hex,...` (sources: battery, info, click, rotate, swipe, fly).
    #[arg(long, requires = "fake")]
    fake_notifications: Option<NotificationFixture>,
}

impl Args {
    /// Returns the FHEM `host:port` address.
    #[must_use]
    pub fn fhem_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the keepalive interval, or `None` when disabled.
    #[must_use]
    pub fn keepalive(&self) -> Option<Duration> {
        (!self.keepalive.is_zero()).then_some(self.keepalive)
    }

    #[must_use]
    pub fn scenes_path(&self) -> Option<&Path> {
        self.scenes.as_deref()
    }

    #[must_use]
    pub fn icon_brightness(&self) -> u8 {
        self.icon_brightness
    }

    #[must_use]
    pub fn icon_timeout(&self) -> u8 {
        self.icon_timeout
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn log_format(&self) -> Option<LogFormat> {
        self.log_format
    }

    /// Builds the session settings for the configured device.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::builder()
            .device_name(self.device_name.clone())
            .build()
    }

    /// Returns fake transport settings when `--fake` is set.
    #[must_use]
    pub fn fake_transport_config(&self) -> Option<FakeTransportConfig> {
        self.fake.then(|| {
            FakeTransportConfig::builder()
                .device_name(self.device_name.clone())
                .maybe_battery_level(self.fake_battery)
                .maybe_notifications(self.fake_notifications.clone())
                .build()
        })
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Log line format accepted by `--log-format`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_a_local_fhem_install() {
        let args = Args::try_parse_from(["nuimo-bridge"]).expect("defaults should parse");

        assert_eq!("localhost:7072", args.fhem_address());
        assert_eq!(Some(Duration::from_secs(300)), args.keepalive());
        assert_eq!(None, args.scenes_path());
        assert_eq!((255, 10), (args.icon_brightness(), args.icon_timeout()));
        assert_eq!("Nuimo", args.session_config().device_name());
        assert!(args.fake_transport_config().is_none());
    }

    #[rstest]
    #[case("90s", Some(Duration::from_secs(90)))]
    #[case("5m", Some(Duration::from_secs(300)))]
    #[case("0s", None)]
    fn keepalive_parses_human_durations(#[case] raw: &str, #[case] expected: Option<Duration>) {
        let args = Args::try_parse_from(["nuimo-bridge", "--keepalive", raw])
            .expect("duration should parse");
        assert_eq!(expected, args.keepalive());
    }

    #[test]
    fn keepalive_rejects_bare_numbers() {
        let error = Args::try_parse_from(["nuimo-bridge", "--keepalive", "300"])
            .expect_err("unitless duration should be rejected");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[rstest]
    #[case(&["--fake-battery", "50"])]
    #[case(&["--fake-notifications", "click=01"])]
    fn fake_fixture_flags_require_fake_mode(#[case] flags: &[&str]) {
        let error = Args::try_parse_from(std::iter::once("nuimo-bridge").chain(flags.iter().copied()))
            .expect_err("fake flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn malformed_fake_notifications_are_rejected() {
        let error = Args::try_parse_from([
            "nuimo-bridge",
            "--fake",
            "--fake-notifications",
            "knob=01",
        ])
        .expect_err("unknown source should be rejected");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let args = Args::try_parse_from([
            "nuimo-bridge",
            "--fake",
            "--fake-battery",
            "42",
            "--fake-notifications",
            "click=01",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .expect("fake arguments should parse");

        assert!(args.fake_transport_config().is_some());
        assert_eq!(Some(LogLevel::Debug), args.log_level());
        assert_eq!(Some(LogFormat::Json), args.log_format());
    }
}
