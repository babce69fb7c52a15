use std::fmt;

/// Lifecycle events delivered by the printer host.
///
/// Names follow the host's event vocabulary (`PrintStarted`, `Connected`,
/// ...). Anything the bridge does not act on is kept as [`PrinterEvent::Other`]
/// so it can still be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    PrintStarted,
    PrintDone,
    PrintFailed,
    PrintCancelled,
    PrintPaused,
    PrintResumed,
    Connected,
    Disconnected,
    Error,
    /// Periodic progress report, in percent.
    Progress(f64),
    Other(String),
}

impl PrinterEvent {
    /// Build an event from the host's event name and optional progress value.
    pub fn from_host(name: &str, progress: Option<f64>) -> Self {
        match name {
            "PrintStarted" => PrinterEvent::PrintStarted,
            "PrintDone" => PrinterEvent::PrintDone,
            "PrintFailed" => PrinterEvent::PrintFailed,
            "PrintCancelled" => PrinterEvent::PrintCancelled,
            "PrintPaused" => PrinterEvent::PrintPaused,
            "PrintResumed" => PrinterEvent::PrintResumed,
            "Connected" => PrinterEvent::Connected,
            "Disconnected" => PrinterEvent::Disconnected,
            "Error" => PrinterEvent::Error,
            "PrintProgress" => PrinterEvent::Progress(progress.unwrap_or(0.0)),
            other => PrinterEvent::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PrinterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterEvent::Progress(progress) => write!(f, "PrintProgress({})", progress),
            PrinterEvent::Other(name) => f.write_str(name),
            other => write!(f, "{:?}", other),
        }
    }
}
