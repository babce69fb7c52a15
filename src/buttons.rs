//! Press-and-hold buttons wired to controller operations.
//!
//! Each button is sampled on its own thread. A [`HoldDetector`] turns the
//! samples into a single "held" signal once the button has been pressed
//! continuously for the hold threshold. The button must be released before
//! it can fire again.

use log::{debug, info, warn};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::config::constants;
use crate::controller::EnclosureController;
use crate::gpio::InputPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Idle,
    Held {
        since: Instant,
        fired: bool,
        released_at: Option<Instant>,
    },
}

/// Debounced press-and-hold detector.
///
/// Short releases (bounces) shorter than the release debounce do not reset
/// the hold clock.
#[derive(Debug, Clone)]
pub struct HoldDetector {
    threshold: Duration,
    release_debounce: Duration,
    state: HoldState,
}

impl HoldDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            release_debounce: Duration::from_millis(constants::BUTTON_DEBOUNCE_MS),
            state: HoldState::Idle,
        }
    }

    /// Feed one sample. Returns true exactly once per hold.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        match self.state {
            HoldState::Idle => {
                if pressed {
                    self.state = HoldState::Held {
                        since: now,
                        fired: false,
                        released_at: None,
                    };
                }
                false
            }
            HoldState::Held {
                since,
                fired,
                released_at,
            } => {
                if pressed {
                    let fire = !fired && now.duration_since(since) >= self.threshold;
                    self.state = HoldState::Held {
                        since,
                        fired: fired || fire,
                        released_at: None,
                    };
                    return fire;
                }

                let released_at = released_at.unwrap_or(now);
                self.state = if now.duration_since(released_at) >= self.release_debounce {
                    HoldState::Idle
                } else {
                    HoldState::Held {
                        since,
                        fired,
                        released_at: Some(released_at),
                    }
                };
                false
            }
        }
    }
}

/// A running button sampling thread.
pub struct ButtonWatcher {
    name: &'static str,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ButtonWatcher {
    /// Start sampling `pin` every `poll`, calling `on_hold` each time a hold
    /// of at least `threshold` is detected.
    pub fn spawn<F>(
        name: &'static str,
        pin: Box<dyn InputPin>,
        threshold: Duration,
        poll: Duration,
        on_hold: F,
    ) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(format!("{}-button", name))
            .spawn(move || {
                let mut detector = HoldDetector::new(threshold);
                let mut read_failing = false;

                while !running.load(Ordering::SeqCst) {
                    let pressed = match pin.is_pressed() {
                        Ok(pressed) => {
                            read_failing = false;
                            pressed
                        }
                        Err(e) => {
                            if !read_failing {
                                warn!("Failed to read {} button: {}", name, e);
                                read_failing = true;
                            }
                            false
                        }
                    };

                    if detector.update(pressed, Instant::now()) {
                        info!("{} button held", name);
                        on_hold();
                    }
                    thread::sleep(poll);
                }
                debug!("{} button watcher stopped", name);
            })?;

        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Stop sampling and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} button watcher panicked", self.name);
            }
        }
    }
}

impl Drop for ButtonWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wire the enclosure button to [`EnclosureController::toggle_light`] and
/// the power button to [`EnclosureController::toggle_power`].
///
/// Buttons passed as `None` are not watched.
pub fn watch_buttons(
    controller: &Arc<EnclosureController>,
    enclosure_button: Option<Box<dyn InputPin>>,
    power_button: Option<Box<dyn InputPin>>,
    threshold: Duration,
) -> io::Result<Vec<ButtonWatcher>> {
    let poll = Duration::from_millis(constants::BUTTON_POLL_MS);
    let mut watchers = Vec::new();

    if let Some(pin) = enclosure_button {
        let controller = Arc::clone(controller);
        watchers.push(ButtonWatcher::spawn(
            "enclosure",
            pin,
            threshold,
            poll,
            move || controller.toggle_light(),
        )?);
    }

    if let Some(pin) = power_button {
        let controller = Arc::clone(controller);
        watchers.push(ButtonWatcher::spawn(
            "power",
            pin,
            threshold,
            poll,
            move || controller.toggle_power(),
        )?);
    }

    Ok(watchers)
}
