use log::{debug, error, info, warn};
use std::{
    fmt, io,
    sync::{Arc, RwLock, mpsc},
    thread,
    time::Duration,
};

use crate::command::Command;
use crate::error::ConfigError;

/// Result of sending one command to the enclosure controller.
///
/// Sending never fails in the `Result` sense: the enclosure is best-effort
/// and a lost request must not disturb the print pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The controller answered with this HTTP status code.
    Sent { status: u16 },
    /// No hostname is configured, so nothing was sent.
    Disabled,
    /// The request did not complete.
    Failed(SendFailure),
}

/// Why a request did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub kind: FailureKind,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    InvalidUrl,
    Other,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} failure requesting '{}': {}",
            self.kind, self.url, self.reason
        )
    }
}

/// Delivers commands to the enclosure controller.
pub trait Transport: Send + Sync {
    fn send(&self, command: &Command) -> SendOutcome;

    /// Point the transport at a new enclosure host. Empty disables sending.
    fn set_hostname(&self, hostname: String);
}

/// HTTP transport issuing `GET {hostname}/{command}` requests.
///
/// The hostname can be swapped at runtime through [`Transport::set_hostname`];
/// an empty hostname disables the transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    hostname: RwLock<String>,
}

impl HttpTransport {
    /// Create a transport for `hostname` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(hostname: String, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            hostname: RwLock::new(hostname),
        })
    }

    pub fn hostname(&self) -> String {
        self.hostname
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Transport for HttpTransport {
    fn send(&self, command: &Command) -> SendOutcome {
        let hostname = self.hostname();
        if hostname.is_empty() {
            return SendOutcome::Disabled;
        }

        let url = command.url(&hostname);
        info!("Fetching {}", url);

        match self.client.get(&url).send() {
            Ok(response) => SendOutcome::Sent {
                status: response.status().as_u16(),
            },
            Err(e) => SendOutcome::Failed(SendFailure {
                kind: classify(&e),
                url,
                reason: e.to_string(),
            }),
        }
    }

    fn set_hostname(&self, hostname: String) {
        info!("Enclosure host changed to '{}'", hostname);
        *self.hostname.write().unwrap_or_else(|e| e.into_inner()) = hostname;
    }
}

fn classify(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else if error.is_connect() {
        FailureKind::Connect
    } else if error.is_builder() {
        FailureKind::InvalidUrl
    } else {
        FailureKind::Other
    }
}

enum Job {
    Send(Command),
    Flush(mpsc::Sender<()>),
}

/// Serial queue in front of a [`Transport`].
///
/// Commands are sent one at a time on a dedicated worker thread in the order
/// they were dispatched, so callers never wait on the network. Clones share
/// the same queue.
#[derive(Clone)]
pub struct CommandDispatcher {
    queue: mpsc::Sender<Job>,
}

impl CommandDispatcher {
    /// Start the worker thread for `transport`.
    ///
    /// The worker exits once every clone of the dispatcher has been dropped
    /// and the queue is drained.
    pub fn spawn(transport: Arc<dyn Transport>) -> io::Result<Self> {
        let (queue, jobs) = mpsc::channel::<Job>();

        thread::Builder::new()
            .name("enclosure-sender".to_string())
            .spawn(move || {
                for job in jobs {
                    match job {
                        Job::Send(command) => log_outcome(&command, transport.send(&command)),
                        Job::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!("Command queue closed, sender thread exiting");
            })?;

        Ok(Self { queue })
    }

    /// Queue `command` behind everything dispatched before it.
    pub fn dispatch(&self, command: Command) {
        if self.queue.send(Job::Send(command)).is_err() {
            warn!("Sender thread is gone, dropping command {}", command);
        }
    }

    /// Block until every command queued so far has been attempted.
    pub fn flush(&self) {
        let (done, wait) = mpsc::channel();
        if self.queue.send(Job::Flush(done)).is_ok() {
            let _ = wait.recv();
        }
    }
}

fn log_outcome(command: &Command, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Sent { status } if (200..300).contains(&status) => {
            info!("{}: response status {}", command, status)
        }
        SendOutcome::Sent { status } => {
            warn!("{}: enclosure answered with status {}", command, status)
        }
        SendOutcome::Disabled => debug!("{}: no enclosure host configured, skipping", command),
        SendOutcome::Failed(failure) => error!("Error executing request: {}", failure),
    }
}
