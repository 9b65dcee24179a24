//! Protocol scenarios driven through the engine with synthetic time

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use provd::inactivity::Watchdog;
use provd::sim::Sim;
use provd::{
    ActivationStatus, Capabilities, Config, Engine, Event, Indicate, LinkFailure, LinkState,
    ProvisionState,
};
use provd_proto::{AccessPoint, Connectivity, Envelope, Status, StorageState};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

#[derive(Default)]
struct Wire {
    chunks: Mutex<Vec<Vec<u8>>>,
}

impl Indicate for Wire {
    fn indicate(&self, chunk: &[u8]) {
        self.chunks.lock().unwrap().push(chunk.to_vec());
    }
}

impl Wire {
    fn count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn config() -> Config {
    Config {
        capabilities: Capabilities::all(),
        ..Config::default()
    }
}

/// Engine plus a peer that confirms every indication and decodes responses
struct Harness {
    engine: Engine<Arc<Wire>>,
    events: UnboundedReceiver<Event>,
    wire: Arc<Wire>,
    sim: Sim,
    now: Instant,
    auto_confirm: bool,
    confirmed: usize,
    /// Chunks before this index belong to a dropped session
    session_start: usize,
    seen: usize,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(config())
    }

    fn with_config(config: Config) -> Self {
        let sim = Sim::new();
        let wire = Arc::new(Wire::default());
        let (engine, events) = Engine::new(&config, sim.services(), wire.clone());
        Self {
            engine,
            events,
            wire,
            sim,
            now: Instant::now(),
            auto_confirm: true,
            confirmed: 0,
            session_start: 0,
            seen: 0,
        }
    }

    fn send(&mut self, event: Event) {
        self.engine.handle_event(event, self.now);
        self.settle();
    }

    /// Write raw bytes the way a central does, in 20 byte fragments
    fn write(&mut self, bytes: &[u8]) {
        for fragment in bytes.chunks(20) {
            self.engine.handle_event(Event::Write(fragment.to_vec()), self.now);
        }
        self.settle();
    }

    fn request(&mut self, id: i64, msg_type: &str, data: Option<Value>) {
        let bytes = provd_proto::encode(&Envelope::request(id, msg_type, data));
        self.write(&bytes);
    }

    /// Deliver queued engine events and peer confirmations until quiet
    fn settle(&mut self) {
        loop {
            if let Ok(event) = self.events.try_recv() {
                self.engine.handle_event(event, self.now);
                continue;
            }
            if self.auto_confirm && self.confirmed < self.wire.count() {
                self.confirmed += 1;
                self.engine.handle_event(Event::Confirm, self.now);
                continue;
            }
            break;
        }
    }

    fn confirm_all(&mut self) {
        self.auto_confirm = true;
        self.settle();
    }

    /// Peer drops the subscription; unconfirmed chunks are never confirmed
    fn disconnect(&mut self) {
        self.engine.handle_event(Event::Unsubscribed, self.now);
        self.confirmed = self.wire.count();
        self.session_start = self.wire.count();
        self.seen = 0;
        self.settle();
    }

    /// Let time pass, running every timer that falls due on the way
    fn advance(&mut self, by: Duration) {
        let target = self.now + by;
        while let Some(deadline) = self.engine.next_deadline().filter(|d| *d <= target) {
            self.now = self.now.max(deadline);
            self.engine.on_timer(self.now);
            self.settle();
        }
        self.now = target;
    }

    fn session_bytes(&self) -> Vec<u8> {
        self.wire.chunks.lock().unwrap()[self.session_start..].concat()
    }

    /// Responses completed since the last call
    fn responses(&mut self) -> Vec<Envelope> {
        let bytes = self.session_bytes();
        let all: Vec<Envelope> = serde_json::Deserializer::from_slice(&bytes)
            .into_iter::<Envelope>()
            .map_while(Result::ok)
            .collect();
        let new = all[self.seen..].to_vec();
        self.seen = all.len();
        new
    }

    fn statuses(&mut self) -> Vec<Status> {
        self.responses().iter().map(|r| r.status).collect()
    }
}

fn ap(ssid: &str, strength: u8) -> AccessPoint {
    AccessPoint {
        ssid: ssid.to_string(),
        strength,
        wep: false,
        psk: true,
        eap: false,
    }
}

#[test]
fn get_access_points_in_confirmed_batches() {
    let mut h = Harness::new();
    h.sim.with(|s| {
        s.access_points = vec![ap("home", 70), ap("home", 40), ap("cafe", 30), ap("office", 55)];
        s.scan_batch_size = 2;
    });

    h.write(br#"{"version":1,"id":1,"type":"getAccessPoints"}"#);

    let bytes = String::from_utf8(h.session_bytes()).unwrap();
    assert!(bytes.starts_with(r#"{"version":1,"id":1,"type":"getAccessPoints","status":1}"#));

    let responses = h.responses();
    let summary: Vec<(Status, Option<Value>)> =
        responses.iter().map(|r| (r.status, r.data.clone())).collect();
    assert_eq!(
        summary,
        vec![
            (Status::Intermediate, None),
            (Status::Intermediate, Some(json!([ap("home", 70)]))),
            (Status::Intermediate, Some(json!([ap("cafe", 30), ap("office", 55)]))),
            (Status::Success, None),
        ]
    );
    assert!(responses.iter().all(|r| r.id == json!(1) && r.msg_type == "getAccessPoints"));
}

#[test]
fn next_batch_waits_for_delivery() {
    let mut h = Harness::new();
    h.sim.with(|s| s.access_points = vec![ap("home", 70)]);
    h.auto_confirm = false;

    h.request(1, "getAccessPoints", None);
    assert_eq!(h.wire.count(), 1);
    h.advance(Duration::from_secs(10));
    assert_eq!(h.wire.count(), 1, "no batch before the first reply is confirmed");

    h.confirm_all();
    assert_eq!(
        h.statuses(),
        vec![Status::Intermediate, Status::Intermediate, Status::Success]
    );
}

#[test]
fn new_request_cancels_scan() {
    let mut h = Harness::new();
    h.sim.with(|s| {
        s.access_points = vec![ap("home", 70), ap("cafe", 30)];
        s.scan_batch_size = 1;
    });
    h.auto_confirm = false;

    h.request(1, "getAccessPoints", None);
    h.request(2, "version", None);
    h.confirm_all();

    let responses = h.responses();
    let summary: Vec<(&str, Status)> = responses
        .iter()
        .map(|r| (r.msg_type.as_str(), r.status))
        .collect();
    // The in-flight reply drains, nothing follows it
    assert_eq!(
        summary,
        vec![("getAccessPoints", Status::Intermediate), ("version", Status::Success)]
    );
}

#[test]
fn disconnect_cancels_scan_and_flushes() {
    let mut h = Harness::new();
    h.sim.with(|s| s.access_points = vec![ap("home", 70)]);
    h.auto_confirm = false;

    h.request(1, "getAccessPoints", None);
    h.disconnect();
    h.confirm_all();
    assert!(h.session_bytes().is_empty());

    h.send(Event::Subscribed);
    h.request(2, "version", None);
    let responses = h.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].msg_type, "version");
}

#[test]
fn connect_ap_auth_failure() {
    let mut h = Harness::new();
    h.request(
        3,
        "connectAP",
        Some(json!({"ssid": "home", "psk": "wrongpassword"})),
    );
    assert_eq!(h.statuses(), vec![Status::Intermediate]);

    h.advance(ms(500));
    let r = h.responses();
    assert_eq!(r.len(), 1);
    assert_eq!(r[0].data, Some(json!({"state": "activating"})));

    h.sim.with(|s| s.wifi.link = LinkState::Failed(LinkFailure::Auth));
    h.advance(ms(500));
    let r = h.responses();
    assert_eq!(r.len(), 1);
    assert_eq!(r[0].status, Status::ErrAuth);
    assert_eq!(r[0].id, json!(3));

    h.advance(Duration::from_secs(60));
    assert!(h.responses().is_empty());
    assert_eq!(h.sim.with(|s| s.removed_profiles.clone()), vec!["wifi-home".to_string()]);
    assert!(h.sim.with(|s| s.profiles.is_empty()));
}

#[test]
fn connect_ap_success_needs_our_profile() {
    let mut h = Harness::new();
    h.request(1, "connectAP", Some(json!({"ssid": "home", "psk": "password1"})));

    // Another profile is up with full connectivity
    h.sim.with(|s| {
        s.wifi = ActivationStatus {
            link: LinkState::Activated,
            active_profile: Some("wifi-office".to_string()),
            connectivity: Connectivity::Full,
        }
    });
    h.advance(Duration::from_secs(5));
    assert!(h.statuses().iter().all(|s| *s == Status::Intermediate));

    h.sim.with(|s| s.wifi.active_profile = Some("wifi-home".to_string()));
    h.advance(ms(500));
    assert_eq!(h.statuses(), vec![Status::Success]);
    assert!(h.sim.with(|s| s.removed_profiles.is_empty()));
}

#[test]
fn connect_ap_timeout_is_no_connection() {
    let mut h = Harness::new();
    h.request(1, "connectAP", Some(json!({"ssid": "home"})));
    h.advance(Duration::from_secs(31));
    let statuses = h.statuses();
    assert_eq!(statuses.last(), Some(&Status::ErrNoConn));
    assert_eq!(statuses.iter().filter(|s| s.is_terminal()).count(), 1);
    assert_eq!(h.sim.with(|s| s.removed_profiles.len()), 1);
}

#[test]
fn connect_ap_validation() {
    let mut h = Harness::new();

    // Missing body: logged and ignored
    h.request(1, "connectAP", None);
    assert!(h.responses().is_empty());

    h.request(2, "connectAP", Some(json!({"ssid": "home", "psk": "short"})));
    assert_eq!(h.statuses(), vec![Status::ErrInvalid]);

    h.request(3, "connectAP", Some(json!({"ssid": "home", "psk": "password1"})));
    h.request(4, "connectAP", Some(json!({"ssid": "cafe"})));
    let r = h.responses();
    assert_eq!(r[0].status, Status::Intermediate);
    assert_eq!((r[1].id.clone(), r[1].status), (json!(4), Status::ErrInvalid));
}

#[test]
fn connect_lte() {
    let mut h = Harness::new();
    h.request(1, "connectLTE", Some(json!({"apn": "internet"})));
    assert_eq!(h.statuses(), vec![Status::Intermediate]);

    h.sim.with(|s| {
        s.lte = ActivationStatus {
            link: LinkState::Activated,
            active_profile: Some("lte".to_string()),
            connectivity: Connectivity::Full,
        }
    });
    h.advance(ms(500));
    assert_eq!(h.statuses(), vec![Status::Success]);

    h.request(2, "getLTEInfo", None);
    let r = h.responses();
    assert_eq!(r[0].data.as_ref().unwrap()["apn"], json!("internet"));

    h.request(3, "getLTEStatus", None);
    let r = h.responses();
    assert_eq!(r[0].data, Some(json!({"status": 2, "state": "activated"})));

    h.sim.with(|s| s.lte.link = LinkState::Failed(LinkFailure::NoSim));
    h.request(4, "getLTEStatus", None);
    let r = h.responses();
    assert_eq!(r[0].data, Some(json!({"status": -8, "state": "failed"})));
}

#[test]
fn fragments_join_within_idle_timeout() {
    let mut h = Harness::new();
    h.write(br#"{"vers"#);
    h.advance(ms(1500));
    h.write(br#"ion":1,"id":9,"type":"version"}"#);

    let r = h.responses();
    assert_eq!(r.len(), 1);
    assert_eq!((r[0].id.clone(), r[0].status), (json!(9), Status::Success));
}

#[test]
fn fragments_dropped_after_idle_timeout() {
    let mut h = Harness::new();
    h.write(br#"{"vers"#);
    h.advance(Duration::from_secs(3));
    h.write(br#"ion":1,"id":9,"type":"version"}"#);
    h.advance(Duration::from_secs(3));

    assert_eq!(h.wire.count(), 0);

    // The link recovers for the next request
    h.request(10, "version", None);
    assert_eq!(h.statuses(), vec![Status::Success]);
}

#[test]
fn newer_version_is_refused_except_version_probe() {
    let mut h = Harness::new();
    h.write(br#"{"version":2,"id":5,"type":"getDeviceId"}"#);
    h.write(br#"{"version":2,"id":6,"type":"version"}"#);
    h.write(br#"{"version":0,"id":7,"type":"getDeviceId"}"#);

    let r = h.responses();
    assert_eq!(r.len(), 3);
    assert_eq!((r[0].id.clone(), r[0].status), (json!(5), Status::ErrInvalid));
    assert_eq!((r[1].id.clone(), r[1].status), (json!(6), Status::Success));
    assert_eq!(r[1].version, 1);
    assert_eq!(r[2].status, Status::Success);
    assert_eq!(r[2].data.as_ref().unwrap()["deviceId"], json!("c0:ee:40:00:00:01"));
}

#[test]
fn unknown_and_malformed_requests() {
    let mut h = Harness::new();
    h.request(1, "selfDestruct", None);
    assert_eq!(h.statuses(), vec![Status::ErrInvalid]);

    // No id: nothing to answer
    h.write(br#"{"version":1,"type":"version"}"#);
    assert!(h.responses().is_empty());

    h.request(2, "version", None);
    assert_eq!(h.statuses(), vec![Status::Success]);
}

#[test]
fn disabled_capabilities() {
    let mut h = Harness::with_config(Config::default());
    h.request(1, "connectLTE", Some(json!({"apn": "internet"})));
    h.request(2, "getStorageInfo", None);
    h.request(3, "extStorageSwap", None);
    h.request(4, "updateConfig", Some(json!({"a": 1})));
    assert_eq!(h.statuses(), vec![Status::ErrApiDisabled; 4]);

    h.request(5, "getDeviceCaps", None);
    let r = h.responses();
    assert_eq!(r[0].data, Some(json!({"isProvisioned": "False"})));
}

#[test]
fn device_caps_lists_optional_requests() {
    let mut h = Harness::new();
    h.request(1, "getDeviceCaps", None);
    let data = h.responses()[0].data.clone().unwrap();
    assert_eq!(data["isProvisioned"], json!("False"));
    let caps = data["deviceCaps"].as_array().unwrap();
    for name in ["getStorageInfo", "extStorageSwap", "connectLTE", "provisionEdge", "updateConfig"] {
        assert!(caps.contains(&json!(name)), "{name} missing");
    }
}

#[test]
fn storage_swap_busy_and_complete() {
    let mut h = Harness::new();
    h.sim.with(|s| s.storage_state = StorageState::Ready);

    h.request(1, "extStorageSwap", None);
    h.advance(ms(1500));
    h.request(2, "extStorageSwap", None);
    let r = h.responses();
    assert_eq!(r[0].data, Some(json!({"state": "ejecting"})));
    assert_eq!((r[1].id.clone(), r[1].status), (json!(2), Status::ErrInvalid));

    // The running swap keeps its report schedule
    h.advance(ms(500));
    let r = h.responses();
    assert_eq!(r.len(), 1);
    assert_eq!((r[0].id.clone(), r[0].data.clone()), (json!(1), Some(json!({"state": "ejecting"}))));

    h.send(Event::StorageStateChanged(StorageState::Stopping));
    h.send(Event::StorageStateChanged(StorageState::Stopped));
    h.send(Event::StorageStateChanged(StorageState::NotPresent));
    h.sim.with(|s| s.storage_state = StorageState::Ready);
    h.send(Event::StorageStateChanged(StorageState::Ready));

    let r = h.responses();
    let states: Vec<Value> = r.iter().filter_map(|r| r.data.clone()).collect();
    assert_eq!(states[0], json!({"state": "stopped"}));
    assert_eq!(states[1], json!({"state": "inserting"}));
    let last = r.last().unwrap();
    assert_eq!((last.id.clone(), last.status), (json!(1), Status::Success));
    assert_eq!(h.sim.with(|s| s.storage_calls.clone()), vec!["stop"]);
}

#[test]
fn storage_failure_aborts_swap() {
    let mut h = Harness::new();
    h.request(1, "extStorageSwap", None);
    h.send(Event::StorageStateChanged(StorageState::StopFailed));
    assert_eq!(h.statuses(), vec![Status::Intermediate, Status::ErrDevice]);
}

#[test]
fn disconnect_keeps_swap_running() {
    let mut h = Harness::new();
    h.sim.with(|s| s.storage_state = StorageState::NotPresent);
    h.request(1, "extStorageSwap", None);
    h.disconnect();

    h.send(Event::Subscribed);
    h.send(Event::StorageStateChanged(StorageState::Ready));
    let r = h.responses();
    assert_eq!(r.len(), 1);
    assert_eq!((r[0].msg_type.as_str(), r[0].status), ("extStorageSwap", Status::Success));
}

#[test]
fn provisioning_success_shuts_the_api_down() {
    let mut h = Harness::new();
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let calls = hook_calls.clone();
    let sim = h.sim.clone();
    let wire = h.wire.clone();
    let (engine, events) = Engine::new(&config(), sim.services(), wire);
    h.engine = engine.on_provisioned(move || {
        calls.fetch_add(1, Ordering::SeqCst);
    });
    h.events = events;

    h.request(
        1,
        "provisionURL",
        Some(json!({"url": "https://mgmt.example.net", "username": "u", "password": "p"})),
    );
    h.send(Event::ProvisionStateChanged(ProvisionState::Downloading));
    h.sim.with(|s| s.provisioned = true);
    h.send(Event::ProvisionStateChanged(ProvisionState::Success));

    let r = h.responses();
    assert_eq!(
        r.iter().map(|r| r.status).collect::<Vec<_>>(),
        vec![Status::Intermediate, Status::Intermediate, Status::Success]
    );
    assert_eq!(r[1].data, Some(json!({"state": "downloading"})));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert!(!h.engine.capabilities().provisioning);

    h.request(2, "provisionURL", Some(json!({"url": "x", "username": "u", "password": "p"})));
    assert_eq!(h.statuses(), vec![Status::ErrApiDisabled]);
}

#[test]
fn provisioning_failure_codes() {
    for (state, status) in [
        (ProvisionState::FailedAuth, Status::ErrAuth),
        (ProvisionState::FailedConnect, Status::ErrNotFound),
        (ProvisionState::FailedInvalid, Status::ErrBadConfig),
    ] {
        let mut h = Harness::new();
        h.request(
            1,
            "provisionEdge",
            Some(json!({"url": "https://edge.example.net", "company": "acme"})),
        );
        h.send(Event::ProvisionStateChanged(state));
        assert_eq!(h.statuses(), vec![Status::Intermediate, status]);
        assert!(h.engine.capabilities().provisioning);
    }
}

#[test]
fn provisioned_gateway_refuses_network_changes() {
    let mut h = Harness::new();
    h.sim.with(|s| s.provisioned = true);

    h.request(1, "getAccessPoints", None);
    h.request(2, "connectAP", Some(json!({"ssid": "home"})));
    h.request(3, "connectLTE", Some(json!({"apn": "internet"})));
    h.request(4, "provisionURL", Some(json!({"url": "x", "username": "u", "password": "p"})));
    assert_eq!(h.statuses(), vec![Status::ErrInvalid; 4]);

    h.request(5, "getDeviceCaps", None);
    assert_eq!(h.responses()[0].data.as_ref().unwrap()["isProvisioned"], json!("True"));
}

#[test]
fn saved_profiles() {
    let mut h = Harness::new();
    h.request(
        1,
        "updateAPS",
        Some(json!([{"ssid": "home", "psk": "password1"}, {"ssid": "cafe"}])),
    );
    h.request(2, "getAPS", None);
    let r = h.responses();
    assert_eq!(r[0].status, Status::Success);
    assert_eq!(r[1].data, Some(json!([{"ssid": "home"}, {"ssid": "cafe"}])));
}

#[test]
fn config_update_and_checks() {
    let mut h = Harness::new();
    h.request(1, "updateConfig", Some(json!({"ntp": "pool.ntp.org"})));
    h.request(2, "updateConfig", Some(json!("not an object")));
    h.request(3, "checkUpdate", None);
    h.request(4, "connCheck", None);
    let r = h.responses();
    assert_eq!(r[0].status, Status::Success);
    assert_eq!(r[1].status, Status::ErrBadConfig);
    assert_eq!(r[2].data.as_ref().unwrap()["available"], json!(false));
    assert_eq!(r[3].data, Some(json!({"connectivity": "unknown"})));
    assert_eq!(h.sim.with(|s| s.config_updates.len()), 1);
}

#[test]
fn inactivity_watchdog() {
    let mut h = Harness::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    h.send(Event::SetWatchdog(Some(Watchdog::new(Duration::from_secs(60), move || {
        f.fetch_add(1, Ordering::SeqCst);
    }))));

    h.advance(Duration::from_secs(59));
    h.request(1, "version", None);
    h.advance(Duration::from_secs(59));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    h.advance(Duration::from_secs(2));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    h.advance(Duration::from_secs(120));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // A disconnect clears the countdown
    h.request(2, "version", None);
    h.disconnect();
    h.advance(Duration::from_secs(120));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    h.send(Event::SetWatchdog(None));
    h.request(3, "version", None);
    h.advance(Duration::from_secs(120));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn watchdog_rearms_on_response_after_disconnect() {
    let mut h = Harness::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    h.send(Event::SetWatchdog(Some(Watchdog::new(Duration::from_secs(60), move || {
        f.fetch_add(1, Ordering::SeqCst);
    }))));

    h.request(1, "connectLTE", Some(json!({"apn": "internet"})));
    h.disconnect();

    // The activation outlives the session and its final response goes out
    h.sim.with(|s| {
        s.lte = ActivationStatus {
            link: LinkState::Activated,
            active_profile: Some("lte".to_string()),
            connectivity: Connectivity::Full,
        }
    });
    h.advance(ms(500));
    h.advance(Duration::from_secs(59));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    h.advance(Duration::from_secs(2));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn prescan_refreshes_access_points_without_responding() {
    let mut h = Harness::new();
    h.send(Event::Prescan);
    assert_eq!(h.sim.with(|s| s.scans_started), 1);
    assert!(h.responses().is_empty());

    let mut h = Harness::with_config(Config {
        capabilities: Capabilities {
            wifi: false,
            ..Capabilities::all()
        },
        ..Config::default()
    });
    h.send(Event::Prescan);
    assert_eq!(h.sim.with(|s| s.scans_started), 0);
}

/// Peer that confirms every indication through the engine's channel
#[derive(Default)]
struct AutoPeer {
    wire: Wire,
    handle: std::sync::OnceLock<provd::EngineHandle>,
}

impl Indicate for AutoPeer {
    fn indicate(&self, chunk: &[u8]) {
        self.wire.indicate(chunk);
        if let Some(handle) = self.handle.get() {
            handle.confirm();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn run_loop_handles_timers() {
    let sim = Sim::new();
    let peer = Arc::new(AutoPeer::default());
    let (engine, events) = Engine::new(&config(), sim.services(), peer.clone());
    let handle = engine.handle();
    peer.handle.set(handle.clone()).unwrap();
    let task = tokio::spawn(engine.run(events));

    handle.write(br#"{"vers"#);
    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.write(br#"ion":1,"id":1,"type":"version"}"#);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(peer.wire.count(), 0);

    handle.write(br#"{"version":1,"id":2,"type":"connectAP","data":{"ssid":"home"}}"#);
    tokio::time::sleep(ms(10)).await;
    assert!(peer.wire.count() > 1);

    sim.with(|s| {
        s.wifi = ActivationStatus {
            link: LinkState::Activated,
            active_profile: Some("wifi-home".to_string()),
            connectivity: Connectivity::Full,
        }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let bytes = peer.wire.chunks.lock().unwrap().concat();
    let responses: Vec<Envelope> = serde_json::Deserializer::from_slice(&bytes)
        .into_iter::<Envelope>()
        .map_while(Result::ok)
        .collect();
    let statuses: Vec<Status> = responses.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![Status::Intermediate, Status::Success]);

    assert!(handle.shutdown());
    task.await.unwrap();
}
