//! Enclosure Bridge - drives a 3D printer enclosure from print lifecycle events.
//!
//! This library forwards printer host events to an enclosure controller
//! (LED lighting, fan, power relay) that listens for plain HTTP GET requests,
//! and wires optional hold buttons and a relay pin on the host board.
//!
//! # Core Components
//!
//! * [`config`] - Configuration loaded from environment variables
//! * [`command`] - Enclosure command vocabulary and LED palette
//! * [`events`] - Printer lifecycle events
//! * [`sender`] - HTTP transport and the serial command queue
//! * [`timer`] - Single-flight keep-alive timer
//! * [`controller`] - Event mapping, light and power operations
//! * [`api`] - Authorized command API
//! * [`notify`] - Power state notifications
//! * [`gpio`] / [`buttons`] - Relay pin and hold buttons
//! * [`host`] - JSON line link to the printer host
//! * [`error`] - Error types
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use enclosure_bridge::*;
//! use std::sync::Arc;
//!
//! let config = Config::load()?;
//! let transport = Arc::new(HttpTransport::new(config.hostname.clone(), config.request_timeout)?);
//! let dispatcher = CommandDispatcher::spawn(transport)?;
//! let controller = EnclosureController::new(&config, dispatcher, Box::new(gpio::MemoryPin::new()));
//!
//! controller.handle_event(&PrinterEvent::PrintStarted);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod buttons;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gpio;
pub mod host;
pub mod notify;
pub mod sender;
pub mod timer;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-export commonly used types for convenience
pub use api::{ApiCommand, Caller, CommandApi, TokenAuthorizer};
pub use command::{Command, LedPalette, Rgb};
pub use config::Config;
pub use controller::EnclosureController;
pub use error::{ApiError, ConfigError, GpioError};
pub use events::PrinterEvent;
pub use host::HostBridge;
pub use notify::{PowerObserver, PowerState};
pub use sender::{CommandDispatcher, HttpTransport, SendOutcome, Transport};
pub use timer::KeepAliveTimer;

/// Lock `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
