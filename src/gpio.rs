//! GPIO access for the relay output and the two hold buttons.
//!
//! [`SysfsPin`] drives real pins through the Linux sysfs interface.
//! [`MemoryPin`] keeps the level in memory and stands in when a pin is not
//! configured.

use log::{debug, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use crate::config::constants;
use crate::error::GpioError;
use crate::lock;

/// Default mount point of the sysfs GPIO interface.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// A pin the bridge drives, such as the power relay.
pub trait OutputPin: Send {
    fn write(&mut self, level: Level) -> Result<(), GpioError>;
}

/// A pin the bridge reads, such as a push button.
pub trait InputPin: Send {
    fn is_pressed(&self) -> Result<bool, GpioError>;
}

/// Pin whose level lives in memory.
///
/// Clones share the same level, so one clone can be handed to the
/// controller while another observes or drives it. As an input it reads
/// pressed while `High`.
#[derive(Debug, Clone)]
pub struct MemoryPin {
    level: Arc<Mutex<Level>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryPin {
    pub fn new() -> Self {
        Self {
            level: Arc::new(Mutex::new(Level::Low)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn level(&self) -> Level {
        *lock(&self.level)
    }

    /// Number of writes made through [`OutputPin::write`].
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Change the level without counting it as a write.
    pub fn set(&self, level: Level) {
        *lock(&self.level) = level;
    }
}

impl Default for MemoryPin {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPin for MemoryPin {
    fn write(&mut self, level: Level) -> Result<(), GpioError> {
        *lock(&self.level) = level;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl InputPin for MemoryPin {
    fn is_pressed(&self) -> Result<bool, GpioError> {
        Ok(self.level() == Level::High)
    }
}

/// Pin exported through `/sys/class/gpio`.
pub struct SysfsPin {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `pin` under `root` and configure it as an output driven low.
    pub fn output(root: &Path, pin: u32) -> Result<Self, GpioError> {
        let dir = export(root, pin)?;
        write_direction(pin, &dir, "low")?;
        Ok(Self {
            pin,
            value_path: dir.join("value"),
        })
    }

    /// Export `pin` under `root` as an input for an active-low button.
    ///
    /// The kernel inverts the value, so a pressed button reads `1`.
    pub fn button(root: &Path, pin: u32) -> Result<Self, GpioError> {
        let dir = export(root, pin)?;
        write_direction(pin, &dir, "in")?;
        write_attr(pin, &dir.join("active_low"), "1", "set polarity of")?;
        Ok(Self {
            pin,
            value_path: dir.join("value"),
        })
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl OutputPin for SysfsPin {
    fn write(&mut self, level: Level) -> Result<(), GpioError> {
        let value = match level {
            Level::High => "1",
            Level::Low => "0",
        };
        write_attr(self.pin, &self.value_path, value, "write")
    }
}

impl InputPin for SysfsPin {
    fn is_pressed(&self) -> Result<bool, GpioError> {
        let value = fs::read_to_string(&self.value_path).map_err(|source| GpioError::Io {
            pin: self.pin,
            action: "read",
            source,
        })?;
        Ok(value.trim() == "1")
    }
}

fn export(root: &Path, pin: u32) -> Result<PathBuf, GpioError> {
    let dir = root.join(format!("gpio{}", pin));
    if !dir.exists() {
        debug!("Exporting GPIO pin {}", pin);
        write_attr(pin, &root.join("export"), &pin.to_string(), "export")?;
    }
    Ok(dir)
}

/// Write the pin direction, waiting for the kernel to finish exporting.
///
/// Right after an export the pin directory may not exist yet, or udev may
/// not have granted access to it.
fn write_direction(pin: u32, dir: &Path, direction: &str) -> Result<(), GpioError> {
    let path = dir.join("direction");
    let mut attempt = 1;
    loop {
        match fs::write(&path, direction) {
            Ok(()) => return Ok(()),
            Err(e)
                if attempt < constants::GPIO_SETUP_ATTEMPTS
                    && matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    ) =>
            {
                debug!("GPIO pin {} not ready (attempt {}): {}", pin, attempt, e);
                attempt += 1;
                thread::sleep(Duration::from_millis(constants::GPIO_SETUP_RETRY_MS));
            }
            Err(source) => {
                warn!("Giving up on GPIO pin {} after {} attempts", pin, attempt);
                return Err(GpioError::Io {
                    pin,
                    action: "set direction of",
                    source,
                });
            }
        }
    }
}

fn write_attr(pin: u32, path: &Path, value: &str, action: &'static str) -> Result<(), GpioError> {
    fs::write(path, value).map_err(|source| GpioError::Io {
        pin,
        action,
        source,
    })
}
