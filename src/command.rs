use std::fmt;

/// Highest value a single LED channel accepts on the enclosure controller.
pub const MAX_CHANNEL: u16 = 1023;

/// An LED color as understood by the enclosure controller.
///
/// Each channel ranges from `0` to [`MAX_CHANNEL`]. Values above the range
/// are clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Rgb {
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self {
            r: clamp(r),
            g: clamp(g),
            b: clamp(b),
        }
    }

    /// Parse an `r,g,b` triple such as `"1023,200,200"`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let channels = value
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u16>()
                    .map_err(|e| format!("invalid channel '{}': {}", part.trim(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match channels.as_slice() {
            [r, g, b] => {
                if let Some(over) = channels.iter().find(|c| **c > MAX_CHANNEL) {
                    return Err(format!("channel {} exceeds {}", over, MAX_CHANNEL));
                }
                Ok(Self::new(*r, *g, *b))
            }
            _ => Err(format!("expected 3 channels, got {}", channels.len())),
        }
    }
}

const fn clamp(channel: u16) -> u16 {
    if channel > MAX_CHANNEL {
        MAX_CHANNEL
    } else {
        channel
    }
}

/// The LED colors used for each printer situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPalette {
    /// Full white while printing, also used by the light button.
    pub printing: Rgb,
    /// Print finished successfully.
    pub done: Rgb,
    /// Connection changes, pauses, resumes and cancellations.
    pub attention: Rgb,
    /// Failed prints and printer errors.
    pub failure: Rgb,
}

impl Default for LedPalette {
    fn default() -> Self {
        Self {
            printing: Rgb::new(1023, 1023, 1023),
            done: Rgb::new(200, 1023, 200),
            attention: Rgb::new(800, 800, 800),
            failure: Rgb::new(1023, 200, 200),
        }
    }
}

/// A request understood by the enclosure controller's HTTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    KeepAlive,
    FanOn,
    LedOn(Rgb),
}

impl Command {
    /// The request path relative to the controller's base URL, query included.
    pub fn path(&self) -> String {
        match self {
            Command::KeepAlive => "keepAlive".to_string(),
            Command::FanOn => "fanOn".to_string(),
            Command::LedOn(rgb) => format!("ledOn?r={}&g={}&b={}", rgb.r, rgb.g, rgb.b),
        }
    }

    /// Join the command path onto `hostname`.
    pub fn url(&self, hostname: &str) -> String {
        format!("{}/{}", hostname.trim_end_matches('/'), self.path())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
