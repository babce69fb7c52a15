use log::{error, info};
use std::{
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::Duration,
};

use crate::command::{Command, LedPalette};
use crate::config::Config;
use crate::events::PrinterEvent;
use crate::gpio::{Level, OutputPin};
use crate::lock;
use crate::notify::{PowerObserver, PowerState};
use crate::sender::CommandDispatcher;
use crate::timer::KeepAliveTimer;

struct PowerControl {
    is_power_on: bool,
    relay: Box<dyn OutputPin>,
}

/// Maps printer lifecycle events onto enclosure commands and owns the
/// enclosure's power state.
///
/// The controller is shared between the host feed, the keep-alive timer and
/// the button watchers. Commands go through a serial [`CommandDispatcher`],
/// so the order in which an event queues them is the order in which the
/// enclosure receives them. Power changes are serialized by a lock covering
/// the relay and the state flag; notifications go out after that lock is
/// released, in the same order as the changes.
pub struct EnclosureController {
    palette: LedPalette,
    keep_alive: Duration,
    dispatcher: CommandDispatcher,
    timer: KeepAliveTimer,
    power: Mutex<PowerControl>,
    observers: RwLock<Vec<Arc<dyn PowerObserver>>>,
    notify_order: Mutex<()>,
}

impl EnclosureController {
    /// Create a controller with power off and no keep-alive scheduled.
    ///
    /// # Arguments
    ///
    /// * `config` - Source of the LED palette and keep-alive duration
    /// * `dispatcher` - Queue used for every outgoing command
    /// * `relay` - Output pin driving the power relay
    pub fn new(config: &Config, dispatcher: CommandDispatcher, relay: Box<dyn OutputPin>) -> Self {
        Self {
            palette: config.palette,
            keep_alive: config.keep_alive,
            dispatcher,
            timer: KeepAliveTimer::new(),
            power: Mutex::new(PowerControl {
                is_power_on: false,
                relay,
            }),
            observers: RwLock::new(Vec::new()),
            notify_order: Mutex::new(()),
        }
    }

    /// Register an observer for power state changes.
    pub fn subscribe(&self, observer: Arc<dyn PowerObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// React to a printer lifecycle event.
    pub fn handle_event(&self, event: &PrinterEvent) {
        match event {
            PrinterEvent::PrintStarted => {
                info!("Print started ({})", event);
                self.send(Command::LedOn(self.palette.printing));
                self.send(Command::FanOn);
                self.start_keep_alive();
            }
            PrinterEvent::PrintDone => {
                info!("Print done ({})", event);
                self.send(Command::LedOn(self.palette.done));
                self.timer.cancel();
            }
            PrinterEvent::Connected
            | PrinterEvent::Disconnected
            | PrinterEvent::PrintCancelled
            | PrinterEvent::PrintPaused
            | PrinterEvent::PrintResumed => {
                info!("Event needs attention ({})", event);
                self.send(Command::LedOn(self.palette.attention));
                self.timer.cancel();
            }
            PrinterEvent::PrintFailed | PrinterEvent::Error => {
                info!("Event error ({})", event);
                self.send(Command::LedOn(self.palette.failure));
                self.timer.cancel();
            }
            PrinterEvent::Progress(progress) => {
                info!("Print progress: {}%", progress);
                self.keep_alive();
            }
            PrinterEvent::Other(_) => info!("Event received ({})", event),
        }
    }

    /// Tell the enclosure the printer is still busy.
    pub fn keep_alive(&self) {
        info!("Keeping enclosure alive");
        self.send(Command::KeepAlive);
    }

    /// Turn the enclosure light on at full white and start the fan.
    pub fn toggle_light(&self) {
        info!("Turning enclosure light on");
        self.send(Command::LedOn(self.palette.printing));
        self.send(Command::FanOn);
    }

    /// Switch the relay to the opposite of the last commanded state.
    pub fn toggle_power(&self) {
        let power = lock(&self.power);
        let target = !power.is_power_on;
        self.set_power(power, target);
    }

    pub fn turn_power_on(&self) {
        self.set_power(lock(&self.power), true);
    }

    pub fn turn_power_off(&self) {
        self.set_power(lock(&self.power), false);
    }

    /// Last commanded relay state. Not read back from the hardware.
    pub fn is_power_on(&self) -> bool {
        lock(&self.power).is_power_on
    }

    pub fn power_state(&self) -> PowerState {
        PowerState {
            is_power_on: self.is_power_on(),
        }
    }

    /// Whether a keep-alive is currently scheduled.
    pub fn keep_alive_pending(&self) -> bool {
        self.timer.is_active()
    }

    /// Cancel the keep-alive and wait for queued commands to go out.
    pub fn shutdown(&self) {
        self.timer.cancel();
        self.dispatcher.flush();
    }

    /// Block until every command queued so far has been attempted.
    pub fn flush(&self) {
        self.dispatcher.flush();
    }

    fn send(&self, command: Command) {
        self.dispatcher.dispatch(command);
    }

    fn start_keep_alive(&self) {
        let dispatcher = self.dispatcher.clone();
        self.timer.start(self.keep_alive, move || {
            info!("Keeping enclosure alive");
            dispatcher.dispatch(Command::KeepAlive);
        });
    }

    fn set_power(&self, mut power: MutexGuard<'_, PowerControl>, on: bool) {
        let level = if on { Level::High } else { Level::Low };
        if let Err(e) = power.relay.write(level) {
            error!("Failed to switch power relay {}: {}", on_off(on), e);
            return;
        }

        power.is_power_on = on;
        info!("Power turned {}", on_off(on));

        // observers may read the state back, so only the ordering lock is held
        let _order = lock(&self.notify_order);
        drop(power);

        let state = PowerState { is_power_on: on };
        for observer in self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            observer.power_changed(state);
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
