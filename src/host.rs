//! Line-oriented JSON link to the printer host.
//!
//! The host writes one message per line:
//!
//! ```text
//! {"event": "PrintStarted"}
//! {"event": "PrintProgress", "progress": 42}
//! {"command": "togglePower", "token": "..."}
//! {"settings": {"hostname": "http://enclosure.local"}}
//! ```
//!
//! Command calls are answered with one line, e.g. `{"ok":true}`,
//! `{"ok":true,"isPowerOn":false}` or `{"ok":false,"error":"permission denied"}`.
//! Events and settings updates are not answered.

use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use crate::api::{ApiCommand, Caller, CommandApi};
use crate::controller::EnclosureController;
use crate::error::ApiError;
use crate::events::PrinterEvent;
use crate::notify::PowerState;
use crate::sender::Transport;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostMessage {
    Event {
        event: String,
        #[serde(default)]
        progress: Option<f64>,
    },
    Command {
        command: String,
        #[serde(default)]
        token: Option<String>,
    },
    Settings {
        settings: SettingsUpdate,
    },
}

#[derive(Debug, Deserialize)]
struct SettingsUpdate {
    #[serde(default)]
    hostname: Option<String>,
}

/// Routes host messages to the controller, the command API and the settings.
pub struct HostBridge {
    controller: Arc<EnclosureController>,
    api: CommandApi,
    transport: Arc<dyn Transport>,
}

impl HostBridge {
    pub fn new(
        controller: Arc<EnclosureController>,
        api: CommandApi,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            controller,
            api,
            transport,
        }
    }

    /// Handle one line from the host, returning the reply if one is due.
    ///
    /// Lines that are not valid messages are logged and skipped.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let message = match serde_json::from_str::<HostMessage>(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping malformed host message '{}': {}", line, e);
                return None;
            }
        };

        match message {
            HostMessage::Event { event, progress } => {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                info!("{}: host event {}", timestamp, event);
                self.controller
                    .handle_event(&PrinterEvent::from_host(&event, progress));
                None
            }
            HostMessage::Command { command, token } => {
                let caller = Caller { token };
                let result = command
                    .parse::<ApiCommand>()
                    .and_then(|command| self.api.handle(command, &caller));
                Some(reply(result))
            }
            HostMessage::Settings { settings } => {
                if let Some(hostname) = settings.hostname {
                    // commands queued before the update still go to the old host
                    self.controller.flush();
                    self.transport.set_hostname(hostname.trim().to_string());
                }
                None
            }
        }
    }

    /// Process host messages from `input` until it closes, writing replies
    /// to `output`.
    ///
    /// Lines that are not valid UTF-8 are skipped like any other malformed
    /// line. The keep-alive is cancelled and queued commands are flushed
    /// before returning, including when reading fails.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> io::Result<()> {
        let result = self.serve(&mut input, &mut output);
        match &result {
            Ok(()) => info!("Host feed closed, shutting down"),
            Err(e) => error!("Host feed failed, shutting down: {}", e),
        }
        self.controller.shutdown();
        result
    }

    fn serve<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Skipping host message that is not UTF-8: {}", e);
                    continue;
                }
            };
            if let Some(response) = self.handle_line(line) {
                let mut bytes = serde_json::to_vec(&response)?;
                bytes.push(b'\n');
                output.write_all(&bytes)?;
                output.flush()?;
            }
        }
    }
}

fn reply(result: Result<Option<PowerState>, ApiError>) -> Value {
    match result {
        Ok(Some(state)) => json!({ "ok": true, "isPowerOn": state.is_power_on }),
        Ok(None) => json!({ "ok": true }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    }
}
