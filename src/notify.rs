use log::warn;
use serde::Serialize;
use std::{io::Write, sync::Mutex};

use crate::config::constants;
use crate::lock;

/// Power state as reported to observers and command API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerState {
    #[serde(rename = "isPowerOn")]
    pub is_power_on: bool,
}

/// Receives a notification after every power toggle.
///
/// Observers may read the controller's state from `power_changed`, but must
/// not switch power from inside it.
pub trait PowerObserver: Send + Sync {
    fn power_changed(&self, state: PowerState);
}

#[derive(Serialize)]
struct PluginMessage {
    plugin: &'static str,
    #[serde(flatten)]
    state: PowerState,
}

/// Publishes power changes as JSON lines, one message per toggle.
///
/// Each line goes out in a single write so it cannot interleave with other
/// writers sharing the same stream.
///
/// Each line looks like `{"plugin":"enclose","isPowerOn":true}`.
pub struct JsonLinePublisher<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinePublisher<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> PowerObserver for JsonLinePublisher<W> {
    fn power_changed(&self, state: PowerState) {
        let message = PluginMessage {
            plugin: constants::PLUGIN_ID,
            state,
        };
        let mut out = lock(&self.out);
        if let Err(e) = write_line(&mut *out, &message) {
            warn!("Failed to publish power state: {}", e);
        }
    }
}

fn write_line<W: Write>(out: &mut W, message: &PluginMessage) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    out.write_all(&line)?;
    out.flush()
}
