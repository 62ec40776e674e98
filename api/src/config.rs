//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible
//! defaults. All knobs of the reference deployment (upstream URL, poll
//! interval, device list, reference timezone) are explicit values here
//! rather than ambient globals.

use anyhow::Result;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Upstream API base of the Tampere reference deployment.
const DEFAULT_UPSTREAM_URL: &str = "http://trafficlights.tampere.fi/api/v1";

/// Reference timezone used for timestamp keys and naive upstream timestamps.
const DEFAULT_TIMEZONE: &str = "Europe/Helsinki";

/// Seconds between the start of one collection cycle and the next.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;

/// Timeout applied to each upstream request. The upstream has none of its
/// own, and a hung call would otherwise stall the cycle indefinitely.
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `TRAFFICWATCH_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `TRAFFICWATCH_PORT`: The port to listen on (default: 8080)
/// - `TRAFFICWATCH_UPSTREAM_URL`: Base URL of the traffic-light API
/// - `TRAFFICWATCH_POLL_INTERVAL_SECS`: Collection cycle interval (default: 600)
/// - `TRAFFICWATCH_UPSTREAM_TIMEOUT_SECS`: Per-request timeout (default: 30)
/// - `TRAFFICWATCH_TIMEZONE`: Reference timezone (default: "Europe/Helsinki")
/// - `TRAFFICWATCH_COORDINATES_PATH`: Coordinate metadata file
/// - `TRAFFICWATCH_DEVICES`: Comma-separated device codes overriding the
///   built-in list
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Base URL of the upstream traffic-light API.
    pub upstream_url: String,
    /// Seconds between collection cycle starts (fixed-rate schedule).
    pub poll_interval_secs: u64,
    /// Timeout in seconds for each upstream request.
    pub upstream_timeout_secs: u64,
    /// Reference timezone for timestamp keys.
    pub timezone: Tz,
    /// Path to the static coordinate metadata file.
    pub coordinates_path: PathBuf,
    /// Ordered list of device codes polled each cycle.
    pub devices: Vec<String>,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `TRAFFICWATCH_PORT`, `TRAFFICWATCH_POLL_INTERVAL_SECS` or
    ///   `TRAFFICWATCH_UPSTREAM_TIMEOUT_SECS` is set but not a valid number
    /// - `TRAFFICWATCH_TIMEZONE` is not a known timezone name
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("TRAFFICWATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("TRAFFICWATCH_PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()?
            .unwrap_or(8080);

        let upstream_url = std::env::var("TRAFFICWATCH_UPSTREAM_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string());

        let poll_interval_secs = std::env::var("TRAFFICWATCH_POLL_INTERVAL_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);

        let upstream_timeout_secs = std::env::var("TRAFFICWATCH_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()?
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let timezone: Tz = std::env::var("TRAFFICWATCH_TIMEZONE")
            .unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid TRAFFICWATCH_TIMEZONE: {e}"))?;

        let coordinates_path = std::env::var("TRAFFICWATCH_COORDINATES_PATH")
            .map_or_else(|_| PathBuf::from("static/coordinates.json"), PathBuf::from);

        let devices = std::env::var("TRAFFICWATCH_DEVICES")
            .map_or_else(|_| default_devices(), |list| parse_device_list(&list));

        Ok(Self {
            host,
            port,
            upstream_url,
            poll_interval_secs,
            upstream_timeout_secs,
            timezone,
            coordinates_path,
            devices,
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Panics
    ///
    /// Panics if the host and port combination cannot be parsed as a valid
    /// socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address from config")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            timezone: chrono_tz::Europe::Helsinki,
            coordinates_path: PathBuf::from("static/coordinates.json"),
            devices: default_devices(),
        }
    }
}

/// The fixed device list of the reference deployment.
fn default_devices() -> Vec<String> {
    [
        "tre216", "tre209", "tre212", "tre134", "tre148", "tre144", "tre133", "tre132", "tre124",
        "tre101", "tre115", "tre103", "tre158", "tre227", "tre112_114", "tre117_575", "tre120_159",
        "tre121", "tre123", "tre127", "tre150",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Parses a comma-separated device list, ignoring empty segments.
fn parse_device_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval_secs, 600);
        assert_eq!(config.upstream_timeout_secs, 30);
        assert_eq!(config.timezone, chrono_tz::Europe::Helsinki);
    }

    #[test]
    fn test_default_device_list_has_reference_deployment_size() {
        let devices = default_devices();
        assert_eq!(devices.len(), 21);
        assert_eq!(devices[0], "tre216");
        assert!(devices.contains(&"tre112_114".to_string()));
    }

    #[test]
    fn test_parse_device_list() {
        let devices = parse_device_list("tre216, tre212,,tre134 ");
        assert_eq!(devices, vec!["tre216", "tre212", "tre134"]);
    }

    #[test]
    fn test_config_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        let addr = config.socket_addr();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
