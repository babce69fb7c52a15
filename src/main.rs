use anyhow::{Context, Result};
use log::{info, warn};
use std::{io, path::Path, sync::Arc};

use enclosure_bridge::{
    CommandApi, CommandDispatcher, Config, EnclosureController, HostBridge, HttpTransport,
    TokenAuthorizer, Transport,
    buttons::watch_buttons,
    gpio::{InputPin, MemoryPin, OutputPin, SYSFS_GPIO_ROOT, SysfsPin},
    notify::JsonLinePublisher,
};

/// Enclosure Bridge - drives a 3D printer enclosure from print lifecycle events.
///
/// Reads printer host messages as JSON lines on stdin, forwards the matching
/// commands to the enclosure controller over HTTP and answers command API
/// calls and power notifications as JSON lines on stdout. Logs go to stderr.
///
/// # Environment Variables
///
/// All optional:
/// * `ENCLOSE_HOSTNAME` - Enclosure controller base URL (empty disables HTTP)
/// * `ENCLOSE_API_TOKEN` - Token required on command API calls
/// * `ENCLOSE_KEEP_ALIVE_SECONDS` - Keep-alive delay after a print starts (default: 180)
/// * `ENCLOSE_REQUEST_TIMEOUT_SECONDS` - HTTP timeout (default: 10)
/// * `ENCLOSE_BUTTON_PIN` / `ENCLOSE_POWER_BUTTON_PIN` - Hold button pins
/// * `ENCLOSE_POWER_RELAY_PIN` - Relay output pin
/// * `ENCLOSE_BUTTON_HOLD_MS` - Hold threshold (default: 2000)
/// * `ENCLOSE_LED_PRINTING`, `ENCLOSE_LED_DONE`, `ENCLOSE_LED_ATTENTION`,
///   `ENCLOSE_LED_FAILURE` - LED colors as `r,g,b`
///
/// # Usage
///
/// ```bash
/// export ENCLOSE_HOSTNAME="http://enclosure.local"
/// export ENCLOSE_POWER_RELAY_PIN=22
/// echo '{"event": "PrintStarted"}' | ./enclosure-bridge
/// ```
fn main() -> Result<()> {
    // stdout carries the host protocol, so logs go to stderr
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .filter_level(
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|level| level.parse().ok())
                .unwrap_or(log::LevelFilter::Info),
        )
        .init();

    let config = Config::load().context(
        "Failed to load configuration. Please check the ENCLOSE_* environment variables.",
    )?;

    info!("Enclosure bridge (on host: {})", config.hostname);
    if config.hostname.is_empty() {
        warn!("ENCLOSE_HOSTNAME is not set, enclosure commands are disabled");
    }
    if config.api_token.is_none() {
        warn!("ENCLOSE_API_TOKEN is not set, the command API trusts every caller");
    }

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        config.hostname.clone(),
        config.request_timeout,
    )?);
    let dispatcher = CommandDispatcher::spawn(Arc::clone(&transport))
        .context("Failed to start the command sender thread")?;

    let gpio_root = Path::new(SYSFS_GPIO_ROOT);
    let relay: Box<dyn OutputPin> = match config.power_relay_pin {
        Some(pin) => {
            info!("Power relay on GPIO {}", pin);
            Box::new(SysfsPin::output(gpio_root, pin)?)
        }
        None => Box::new(MemoryPin::new()),
    };

    let controller = Arc::new(EnclosureController::new(&config, dispatcher, relay));
    controller.subscribe(Arc::new(JsonLinePublisher::new(io::stdout())));

    let button = |pin: Option<u32>| -> Result<Option<Box<dyn InputPin>>> {
        match pin {
            Some(pin) => {
                info!("Hold button on GPIO {}", pin);
                let input: Box<dyn InputPin> = Box::new(SysfsPin::button(gpio_root, pin)?);
                Ok(Some(input))
            }
            None => Ok(None),
        }
    };
    let _watchers = watch_buttons(
        &controller,
        button(config.enclosure_button_pin)?,
        button(config.power_button_pin)?,
        config.button_hold,
    )
    .context("Failed to start button watchers")?;

    let api = CommandApi::new(
        Arc::clone(&controller),
        Box::new(TokenAuthorizer::new(config.api_token.clone())),
    );
    let bridge = HostBridge::new(Arc::clone(&controller), api, transport);

    info!("Enclosure bridge ready, waiting for host messages");
    bridge.run(io::stdin().lock(), io::stdout())?;

    Ok(())
}
