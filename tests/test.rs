use enclosure_bridge::{
    ApiCommand, ApiError, Caller, Command, CommandApi, CommandDispatcher, Config,
    EnclosureController, GpioError, HostBridge, HttpTransport, PowerObserver, PowerState,
    PrinterEvent, SendOutcome, TokenAuthorizer, Transport,
    buttons::watch_buttons,
    gpio::{InputPin, Level, MemoryPin, OutputPin},
    sender::FailureKind,
};
use std::{
    io::{self, BufReader, Cursor, Read},
    sync::{Arc, Mutex, Weak, mpsc},
    thread,
    time::Duration,
};

const HOST: &str = "http://enclosure.test";

/// Transport that records request paths instead of sending them.
struct RecordingTransport {
    hostname: Mutex<String>,
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn new(hostname: &str) -> Self {
        Self {
            hostname: Mutex::new(hostname.to_string()),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self, path: &str) -> usize {
        self.sent().iter().filter(|p| p.as_str() == path).count()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, command: &Command) -> SendOutcome {
        if self.hostname.lock().unwrap().is_empty() {
            return SendOutcome::Disabled;
        }
        self.sent.lock().unwrap().push(command.path());
        SendOutcome::Sent { status: 200 }
    }

    fn set_hostname(&self, hostname: String) {
        *self.hostname.lock().unwrap() = hostname;
    }
}

/// Wraps the real HTTP transport and keeps every outcome.
struct OutcomeTransport {
    inner: HttpTransport,
    outcomes: Mutex<Vec<SendOutcome>>,
}

impl Transport for OutcomeTransport {
    fn send(&self, command: &Command) -> SendOutcome {
        let outcome = self.inner.send(command);
        self.outcomes.lock().unwrap().push(outcome.clone());
        outcome
    }

    fn set_hostname(&self, hostname: String) {
        self.inner.set_hostname(hostname);
    }
}

#[derive(Default)]
struct RecordingObserver {
    states: Mutex<Vec<PowerState>>,
}

impl RecordingObserver {
    fn states(&self) -> Vec<bool> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.is_power_on)
            .collect()
    }
}

impl PowerObserver for RecordingObserver {
    fn power_changed(&self, state: PowerState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Observer that reads the controller state back while being notified.
#[derive(Default)]
struct ReadBackObserver {
    controller: Mutex<Weak<EnclosureController>>,
    seen: Mutex<Vec<bool>>,
}

impl PowerObserver for ReadBackObserver {
    fn power_changed(&self, _state: PowerState) {
        if let Some(controller) = self.controller.lock().unwrap().upgrade() {
            self.seen.lock().unwrap().push(controller.is_power_on());
        }
    }
}

/// Host feed that breaks after its buffered lines.
struct BrokenFeed;

impl Read for BrokenFeed {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "host went away"))
    }
}

struct BrokenRelay;

impl OutputPin for BrokenRelay {
    fn write(&mut self, _level: Level) -> Result<(), GpioError> {
        Err(GpioError::Io {
            pin: 22,
            action: "write",
            source: std::io::Error::other("relay unplugged"),
        })
    }
}

struct Rig {
    controller: Arc<EnclosureController>,
    transport: Arc<RecordingTransport>,
    relay: MemoryPin,
    observer: Arc<RecordingObserver>,
}

fn rig(keep_alive: Duration) -> Rig {
    let config = Config {
        hostname: HOST.to_string(),
        keep_alive,
        ..Config::default()
    };
    let transport = Arc::new(RecordingTransport::new(HOST));
    let dispatcher = CommandDispatcher::spawn(transport.clone()).unwrap();
    let relay = MemoryPin::new();
    let controller = Arc::new(EnclosureController::new(
        &config,
        dispatcher,
        Box::new(relay.clone()),
    ));
    let observer = Arc::new(RecordingObserver::default());
    controller.subscribe(observer.clone());

    Rig {
        controller,
        transport,
        relay,
        observer,
    }
}

#[test]
fn print_cycle_sends_commands_in_order() {
    let rig = rig(Duration::from_secs(180));

    rig.controller.handle_event(&PrinterEvent::PrintStarted);
    assert!(rig.controller.keep_alive_pending());
    rig.controller.handle_event(&PrinterEvent::Progress(10.0));
    rig.controller.handle_event(&PrinterEvent::Progress(50.0));
    rig.controller.handle_event(&PrinterEvent::PrintDone);
    assert!(!rig.controller.keep_alive_pending());

    rig.controller.flush();
    assert_eq!(
        rig.transport.sent(),
        vec![
            "ledOn?r=1023&g=1023&b=1023",
            "fanOn",
            "keepAlive",
            "keepAlive",
            "ledOn?r=200&g=1023&b=200",
        ]
    );
}

#[test]
fn attention_and_failure_events_stop_keep_alive() {
    let rig = rig(Duration::from_secs(180));

    for event in [
        PrinterEvent::Connected,
        PrinterEvent::Disconnected,
        PrinterEvent::PrintCancelled,
        PrinterEvent::PrintPaused,
        PrinterEvent::PrintResumed,
    ] {
        rig.controller.handle_event(&PrinterEvent::PrintStarted);
        rig.controller.handle_event(&event);
        assert!(!rig.controller.keep_alive_pending(), "{} kept timer", event);
    }
    for event in [PrinterEvent::PrintFailed, PrinterEvent::Error] {
        rig.controller.handle_event(&PrinterEvent::PrintStarted);
        rig.controller.handle_event(&event);
        assert!(!rig.controller.keep_alive_pending(), "{} kept timer", event);
    }

    rig.controller.flush();
    assert_eq!(rig.transport.count("ledOn?r=800&g=800&b=800"), 5);
    assert_eq!(rig.transport.count("ledOn?r=1023&g=200&b=200"), 2);
}

#[test]
fn other_events_send_nothing() {
    let rig = rig(Duration::from_secs(180));

    rig.controller
        .handle_event(&PrinterEvent::from_host("FileAdded", None));
    rig.controller.flush();

    assert!(rig.transport.sent().is_empty());
    assert!(!rig.controller.keep_alive_pending());
}

#[test]
fn keep_alive_timer_sends_only_keep_alive() {
    let rig = rig(Duration::from_millis(50));

    rig.controller.handle_event(&PrinterEvent::PrintStarted);
    thread::sleep(Duration::from_millis(400));
    rig.controller.flush();

    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn", "keepAlive"]
    );
    assert!(!rig.controller.keep_alive_pending());
}

#[test]
fn restarting_print_does_not_double_keep_alive() {
    let rig = rig(Duration::from_millis(100));

    rig.controller.handle_event(&PrinterEvent::PrintStarted);
    rig.controller.handle_event(&PrinterEvent::PrintStarted);
    thread::sleep(Duration::from_millis(500));
    rig.controller.flush();

    assert_eq!(rig.transport.count("keepAlive"), 1);
    assert_eq!(rig.transport.count("fanOn"), 2);
}

#[test]
fn toggle_power_twice_restores_state() {
    let rig = rig(Duration::from_secs(180));

    rig.controller.toggle_power();
    assert!(rig.controller.is_power_on());
    assert_eq!(rig.relay.level(), Level::High);
    assert_eq!(rig.observer.states(), vec![true]);

    rig.controller.toggle_power();
    assert!(!rig.controller.is_power_on());
    assert_eq!(rig.relay.level(), Level::Low);
    assert_eq!(rig.relay.write_count(), 2);
    assert_eq!(rig.observer.states(), vec![true, false]);
}

#[test]
fn observer_can_read_state_while_notified() {
    let rig = rig(Duration::from_secs(180));
    let observer = Arc::new(ReadBackObserver::default());
    *observer.controller.lock().unwrap() = Arc::downgrade(&rig.controller);
    rig.controller.subscribe(observer.clone());

    let (done_tx, done_rx) = mpsc::channel();
    let controller = rig.controller.clone();
    thread::spawn(move || {
        controller.toggle_power();
        controller.toggle_power();
        done_tx.send(()).unwrap();
    });

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("toggle_power did not return");
    assert_eq!(*observer.seen.lock().unwrap(), vec![true, false]);
    assert_eq!(rig.observer.states(), vec![true, false]);
}

#[test]
fn repeated_power_on_notifies_every_time() {
    let rig = rig(Duration::from_secs(180));

    rig.controller.turn_power_on();
    rig.controller.turn_power_on();
    rig.controller.turn_power_off();

    assert_eq!(rig.relay.write_count(), 3);
    assert_eq!(rig.observer.states(), vec![true, true, false]);
}

#[test]
fn toggle_light_sends_white_then_fan() {
    let rig = rig(Duration::from_secs(180));

    rig.controller.toggle_light();
    rig.controller.flush();

    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn"]
    );
}

#[test]
fn relay_failure_keeps_previous_state() {
    let transport = Arc::new(RecordingTransport::new(HOST));
    let dispatcher = CommandDispatcher::spawn(transport).unwrap();
    let controller = EnclosureController::new(&Config::default(), dispatcher, Box::new(BrokenRelay));
    let observer = Arc::new(RecordingObserver::default());
    controller.subscribe(observer.clone());

    controller.toggle_power();

    assert!(!controller.is_power_on());
    assert!(observer.states().is_empty());
}

#[test]
fn unauthorized_command_changes_nothing() {
    let rig = rig(Duration::from_secs(180));
    let api = CommandApi::new(
        rig.controller.clone(),
        Box::new(TokenAuthorizer::new(Some("secret".to_string()))),
    );

    let result = api.handle(ApiCommand::TurnPowerOn, &Caller { token: None });
    assert_eq!(result, Err(ApiError::PermissionDenied));
    assert!(!rig.controller.is_power_on());
    assert_eq!(rig.relay.write_count(), 0);
    assert!(rig.observer.states().is_empty());

    let caller = Caller {
        token: Some("secret".to_string()),
    };
    assert_eq!(api.handle(ApiCommand::TurnPowerOn, &caller), Ok(None));
    assert_eq!(
        api.handle(ApiCommand::GetPowerState, &caller),
        Ok(Some(PowerState { is_power_on: true }))
    );
}

#[test]
fn empty_hostname_never_sends() {
    let config = Config::default();
    let transport = Arc::new(OutcomeTransport {
        inner: HttpTransport::new(String::new(), Duration::from_secs(1)).unwrap(),
        outcomes: Mutex::new(Vec::new()),
    });
    let dispatcher = CommandDispatcher::spawn(transport.clone()).unwrap();
    let controller = EnclosureController::new(&config, dispatcher, Box::new(MemoryPin::new()));

    for event in [
        PrinterEvent::PrintStarted,
        PrinterEvent::Progress(5.0),
        PrinterEvent::PrintPaused,
        PrinterEvent::PrintFailed,
        PrinterEvent::PrintDone,
    ] {
        controller.handle_event(&event);
    }
    controller.toggle_light();
    controller.keep_alive();
    controller.flush();

    let outcomes = transport.outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 9);
    assert!(outcomes.iter().all(|o| *o == SendOutcome::Disabled));
}

#[test]
fn unreachable_enclosure_is_reported_not_raised() {
    // Nothing listens on the discard port locally
    let transport = HttpTransport::new(
        "http://127.0.0.1:9".to_string(),
        Duration::from_secs(2),
    )
    .unwrap();

    match transport.send(&Command::KeepAlive) {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.url, "http://127.0.0.1:9/keepAlive");
            assert!(matches!(
                failure.kind,
                FailureKind::Connect | FailureKind::Timeout | FailureKind::Other
            ));
        }
        other => panic!("expected a failed send, got {:?}", other),
    }
}

#[test]
fn dispatcher_survives_failed_sends() {
    let transport = Arc::new(OutcomeTransport {
        inner: HttpTransport::new("http://127.0.0.1:9".to_string(), Duration::from_secs(2))
            .unwrap(),
        outcomes: Mutex::new(Vec::new()),
    });
    let dispatcher = CommandDispatcher::spawn(transport.clone()).unwrap();

    dispatcher.dispatch(Command::FanOn);
    dispatcher.flush();
    transport.set_hostname(String::new());
    dispatcher.dispatch(Command::KeepAlive);
    dispatcher.flush();

    let outcomes = transport.outcomes.lock().unwrap();
    assert!(matches!(outcomes[0], SendOutcome::Failed(_)));
    assert_eq!(outcomes[1], SendOutcome::Disabled);
}

#[test]
fn host_bridge_routes_events_commands_and_settings() {
    let rig = rig(Duration::from_secs(180));
    let api = CommandApi::new(
        rig.controller.clone(),
        Box::new(TokenAuthorizer::new(Some("secret".to_string()))),
    );
    let bridge = HostBridge::new(rig.controller.clone(), api, rig.transport.clone());

    let input = [
        r#"{"event": "PrintStarted"}"#,
        r#"{"event": "PrintProgress", "progress": 10}"#,
        "not json",
        "",
        r#"{"command": "togglePower", "token": "secret"}"#,
        r#"{"command": "turnPowerOff"}"#,
        r#"{"command": "getPowerState", "token": "secret"}"#,
        r#"{"command": "explode", "token": "secret"}"#,
        r#"{"settings": {"hostname": ""}}"#,
        r#"{"event": "PrintDone"}"#,
    ]
    .join("\n");

    let mut output = Vec::new();
    bridge.run(Cursor::new(input), &mut output).unwrap();

    let replies: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        replies,
        vec![
            serde_json::json!({"ok": true}),
            serde_json::json!({"ok": false, "error": "permission denied"}),
            serde_json::json!({"ok": true, "isPowerOn": true}),
            serde_json::json!({"ok": false, "error": "unknown command 'explode'"}),
        ]
    );

    // PrintDone arrives after the hostname was cleared
    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn", "keepAlive"]
    );
    assert!(!rig.controller.keep_alive_pending());
    assert_eq!(rig.observer.states(), vec![true]);
}

#[test]
fn host_bridge_skips_lines_that_are_not_utf8() {
    let rig = rig(Duration::from_secs(180));
    let api = CommandApi::new(rig.controller.clone(), Box::new(TokenAuthorizer::new(None)));
    let bridge = HostBridge::new(rig.controller.clone(), api, rig.transport.clone());

    let mut input = b"{\"event\": \"PrintStarted\"}\n".to_vec();
    input.extend_from_slice(b"\xff\xfe{\"event\": \"PrintFailed\"}\n");
    input.extend_from_slice(b"{\"event\": \"PrintDone\"}\n");

    let mut output = Vec::new();
    bridge.run(Cursor::new(input), &mut output).unwrap();

    assert!(output.is_empty());
    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn", "ledOn?r=200&g=1023&b=200"]
    );
    assert!(!rig.controller.keep_alive_pending());
}

#[test]
fn host_bridge_shuts_down_when_feed_fails() {
    let rig = rig(Duration::from_secs(180));
    let api = CommandApi::new(rig.controller.clone(), Box::new(TokenAuthorizer::new(None)));
    let bridge = HostBridge::new(rig.controller.clone(), api, rig.transport.clone());

    let feed = Cursor::new(b"{\"event\": \"PrintStarted\"}\n".to_vec()).chain(BrokenFeed);
    let err = bridge
        .run(BufReader::new(feed), Vec::new())
        .unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert!(!rig.controller.keep_alive_pending());
    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn"]
    );
}

#[test]
fn held_buttons_drive_light_and_power() {
    let rig = rig(Duration::from_secs(180));
    let light_button = MemoryPin::new();
    let power_button = MemoryPin::new();

    let watchers = watch_buttons(
        &rig.controller,
        Some(Box::new(light_button.clone()) as Box<dyn InputPin>),
        Some(Box::new(power_button.clone()) as Box<dyn InputPin>),
        Duration::from_millis(100),
    )
    .unwrap();

    // Held well past the threshold, still fires once
    light_button.set(Level::High);
    power_button.set(Level::High);
    thread::sleep(Duration::from_millis(500));
    light_button.set(Level::Low);
    power_button.set(Level::Low);
    thread::sleep(Duration::from_millis(150));

    for watcher in watchers {
        watcher.stop();
    }
    rig.controller.flush();

    assert!(rig.controller.is_power_on());
    assert_eq!(rig.observer.states(), vec![true]);
    assert_eq!(
        rig.transport.sent(),
        vec!["ledOn?r=1023&g=1023&b=1023", "fanOn"]
    );
}

#[test]
fn tap_shorter_than_hold_does_nothing() {
    let rig = rig(Duration::from_secs(180));
    let power_button = MemoryPin::new();

    let watchers = watch_buttons(
        &rig.controller,
        None,
        Some(Box::new(power_button.clone()) as Box<dyn InputPin>),
        Duration::from_millis(2000),
    )
    .unwrap();

    power_button.set(Level::High);
    thread::sleep(Duration::from_millis(200));
    power_button.set(Level::Low);
    thread::sleep(Duration::from_millis(100));

    for watcher in watchers {
        watcher.stop();
    }

    assert!(!rig.controller.is_power_on());
    assert_eq!(rig.relay.write_count(), 0);
}
