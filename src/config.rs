use std::{str::FromStr, time::Duration};

use crate::command::{LedPalette, Rgb};
use crate::error::ConfigError;

/// Configuration for the enclosure bridge loaded from environment variables.
///
/// Everything is optional: with no variables set the bridge runs with the
/// enclosure disabled and no physical I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the enclosure controller, e.g. `http://enclosure.local`.
    ///
    /// An empty hostname disables all HTTP commands.
    /// Environment variable: `ENCLOSE_HOSTNAME`
    pub hostname: String,

    /// Token callers must present to use the command API.
    ///
    /// When unset, every caller on the host feed is trusted.
    /// Environment variable: `ENCLOSE_API_TOKEN`
    pub api_token: Option<String>,

    /// How long after a print starts the keep-alive timer fires.
    /// Environment variable: `ENCLOSE_KEEP_ALIVE_SECONDS`
    pub keep_alive: Duration,

    /// Timeout for each HTTP request to the enclosure.
    /// Environment variable: `ENCLOSE_REQUEST_TIMEOUT_SECONDS`
    pub request_timeout: Duration,

    /// Button that turns the enclosure light on when held.
    /// Environment variable: `ENCLOSE_BUTTON_PIN`
    pub enclosure_button_pin: Option<u32>,

    /// Button that toggles the power relay when held.
    /// Environment variable: `ENCLOSE_POWER_BUTTON_PIN`
    pub power_button_pin: Option<u32>,

    /// Output pin driving the power relay.
    /// Environment variable: `ENCLOSE_POWER_RELAY_PIN`
    pub power_relay_pin: Option<u32>,

    /// How long a button must be held before it triggers.
    /// Environment variable: `ENCLOSE_BUTTON_HOLD_MS`
    pub button_hold: Duration,

    /// LED colors per printer situation.
    /// Environment variables: `ENCLOSE_LED_PRINTING`, `ENCLOSE_LED_DONE`,
    /// `ENCLOSE_LED_ATTENTION`, `ENCLOSE_LED_FAILURE` (each `r,g,b`)
    pub palette: LedPalette,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            api_token: None,
            keep_alive: Duration::from_secs(constants::KEEP_ALIVE_SECONDS),
            request_timeout: Duration::from_secs(constants::REQUEST_TIMEOUT_SECONDS),
            enclosure_button_pin: None,
            power_button_pin: None,
            power_relay_pin: None,
            button_hold: Duration::from_millis(constants::BUTTON_HOLD_MS),
            palette: LedPalette::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value that cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let hostname = lookup("ENCLOSE_HOSTNAME")
            .map(|h| h.trim().to_string())
            .unwrap_or_default();

        let api_token = non_empty("ENCLOSE_API_TOKEN");

        let keep_alive = match non_empty("ENCLOSE_KEEP_ALIVE_SECONDS") {
            Some(v) => Duration::from_secs(parse_positive("ENCLOSE_KEEP_ALIVE_SECONDS", &v)?),
            None => defaults.keep_alive,
        };

        let request_timeout = match non_empty("ENCLOSE_REQUEST_TIMEOUT_SECONDS") {
            Some(v) => Duration::from_secs(parse_positive("ENCLOSE_REQUEST_TIMEOUT_SECONDS", &v)?),
            None => defaults.request_timeout,
        };

        let button_hold = match non_empty("ENCLOSE_BUTTON_HOLD_MS") {
            Some(v) => Duration::from_millis(parse_positive("ENCLOSE_BUTTON_HOLD_MS", &v)?),
            None => defaults.button_hold,
        };

        let enclosure_button_pin = non_empty("ENCLOSE_BUTTON_PIN")
            .map(|v| parse("ENCLOSE_BUTTON_PIN", &v))
            .transpose()?;
        let power_button_pin = non_empty("ENCLOSE_POWER_BUTTON_PIN")
            .map(|v| parse("ENCLOSE_POWER_BUTTON_PIN", &v))
            .transpose()?;
        let power_relay_pin = non_empty("ENCLOSE_POWER_RELAY_PIN")
            .map(|v| parse("ENCLOSE_POWER_RELAY_PIN", &v))
            .transpose()?;

        let color = |name: &str, default: Rgb| -> Result<Rgb, ConfigError> {
            match non_empty(name) {
                Some(v) => Rgb::parse(&v).map_err(|reason| ConfigError::InvalidValue {
                    var_name: name.to_string(),
                    value: v,
                    reason,
                }),
                None => Ok(default),
            }
        };

        let palette = LedPalette {
            printing: color("ENCLOSE_LED_PRINTING", defaults.palette.printing)?,
            done: color("ENCLOSE_LED_DONE", defaults.palette.done)?,
            attention: color("ENCLOSE_LED_ATTENTION", defaults.palette.attention)?,
            failure: color("ENCLOSE_LED_FAILURE", defaults.palette.failure)?,
        };

        Ok(Config {
            hostname,
            api_token,
            keep_alive,
            request_timeout,
            enclosure_button_pin,
            power_button_pin,
            power_relay_pin,
            button_hold,
            palette,
        })
    }
}

fn parse<T>(var_name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            var_name: var_name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_positive(var_name: &str, value: &str) -> Result<u64, ConfigError> {
    match parse::<u64>(var_name, value)? {
        0 => Err(ConfigError::InvalidValue {
            var_name: var_name.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

/// Application constants used throughout the bridge.
pub mod constants {
    /// Identifier used on messages published to the host.
    pub const PLUGIN_ID: &str = "enclose";

    /// Default keep-alive timer duration in seconds.
    pub const KEEP_ALIVE_SECONDS: u64 = 60 * 3;

    /// Default HTTP request timeout in seconds.
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 10;

    /// Default button hold threshold in milliseconds.
    pub const BUTTON_HOLD_MS: u64 = 2000;

    /// Interval between button samples in milliseconds.
    pub const BUTTON_POLL_MS: u64 = 20;

    /// How long a button must read released before a hold is considered over.
    pub const BUTTON_DEBOUNCE_MS: u64 = 50;

    /// Attempts at configuring a freshly exported GPIO pin.
    pub const GPIO_SETUP_ATTEMPTS: u32 = 10;

    /// Pause between GPIO setup attempts in milliseconds.
    pub const GPIO_SETUP_RETRY_MS: u64 = 50;
}
