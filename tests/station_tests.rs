//! Behavioral tests for the station orchestrator.
//!
//! A fake supplicant records every call, a shared registry records
//! visibility changes, and events are injected directly into the station,
//! so every scenario runs deterministically without a D-Bus service.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wifimgr::{
    BssId, BssProperties, ConnectFailure, DhcpProvider, Error, NetworkConfig, NetworkHandle,
    NetworkSpec, Service, ServiceId, ServiceRegistry, ServiceState, Ssid, Station, StationEvent,
    Supplicant, SupplicantEvent, SupplicantState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    AddNetwork(Vec<u8>),
    RemoveNetwork(String),
    RemoveAllNetworks,
    SelectNetwork(String),
    Disconnect,
    Scan(Option<Vec<Ssid>>),
    FlushBss(u32),
}

#[derive(Default)]
struct SupplicantInner {
    calls: Vec<Call>,
    next_handle: u64,
    fail_disconnect: bool,
    fail_select: bool,
}

#[derive(Clone, Default)]
struct FakeSupplicant {
    inner: Arc<Mutex<SupplicantInner>>,
}

impl FakeSupplicant {
    fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.inner.lock().unwrap().calls)
    }

    fn fail_disconnect(&self, fail: bool) {
        self.inner.lock().unwrap().fail_disconnect = fail;
    }

    fn fail_select(&self, fail: bool) {
        self.inner.lock().unwrap().fail_select = fail;
    }
}

#[async_trait]
impl Supplicant for FakeSupplicant {
    async fn add_network(&self, config: &NetworkConfig) -> wifimgr::Result<NetworkHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::AddNetwork(config.ssid.clone()));
        inner.next_handle += 1;
        Ok(NetworkHandle::from(format!("/networks/{}", inner.next_handle)))
    }

    async fn remove_network(&self, handle: &NetworkHandle) -> wifimgr::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(Call::RemoveNetwork(handle.as_str().to_string()));
        Ok(())
    }

    async fn remove_all_networks(&self) -> wifimgr::Result<()> {
        self.inner.lock().unwrap().calls.push(Call::RemoveAllNetworks);
        Ok(())
    }

    async fn select_network(&self, handle: &NetworkHandle) -> wifimgr::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::SelectNetwork(handle.as_str().to_string()));
        if inner.fail_select {
            Err(Error::OperationFailed("select refused".into()))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self) -> wifimgr::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Disconnect);
        if inner.fail_disconnect {
            Err(Error::OperationFailed("disconnect refused".into()))
        } else {
            Ok(())
        }
    }

    async fn scan(&self, hidden_ssids: Option<Vec<Ssid>>) -> wifimgr::Result<()> {
        self.inner.lock().unwrap().calls.push(Call::Scan(hidden_ssids));
        Ok(())
    }

    async fn flush_bss(&self, max_age_seconds: u32) -> wifimgr::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(Call::FlushBss(max_age_seconds));
        Ok(())
    }
}

#[derive(Default)]
struct RegistryInner {
    present: HashSet<ServiceId>,
    deregistered: Vec<ServiceId>,
    updated: Vec<ServiceId>,
}

#[derive(Clone, Default)]
struct SharedRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SharedRegistry {
    fn has(&self, id: ServiceId) -> bool {
        self.inner.lock().unwrap().present.contains(&id)
    }

    fn deregistered(&self) -> Vec<ServiceId> {
        self.inner.lock().unwrap().deregistered.clone()
    }

    fn updates(&self, id: ServiceId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.updated.iter().filter(|&&u| u == id).count()
    }
}

impl ServiceRegistry for SharedRegistry {
    fn register_service(&mut self, id: ServiceId, _service: &Service) {
        self.inner.lock().unwrap().present.insert(id);
    }

    fn update_service(&mut self, id: ServiceId, _service: &Service) {
        self.inner.lock().unwrap().updated.push(id);
    }

    fn deregister_service(&mut self, id: ServiceId) {
        let mut inner = self.inner.lock().unwrap();
        inner.present.remove(&id);
        inner.deregistered.push(id);
    }

    fn has_service(&self, id: ServiceId) -> bool {
        self.has(id)
    }
}

#[derive(Default)]
struct DhcpInner {
    started: Vec<ServiceId>,
    stopped: Vec<ServiceId>,
}

#[derive(Clone, Default)]
struct FakeDhcp {
    inner: Arc<Mutex<DhcpInner>>,
}

impl FakeDhcp {
    fn started(&self) -> Vec<ServiceId> {
        self.inner.lock().unwrap().started.clone()
    }

    fn stopped(&self) -> Vec<ServiceId> {
        self.inner.lock().unwrap().stopped.clone()
    }
}

impl DhcpProvider for FakeDhcp {
    fn start(&mut self, service: ServiceId) {
        self.inner.lock().unwrap().started.push(service);
    }

    fn stop(&mut self, service: ServiceId) {
        self.inner.lock().unwrap().stopped.push(service);
    }
}

struct Harness {
    station: Station<FakeSupplicant, SharedRegistry, FakeDhcp>,
    _events: tokio::sync::mpsc::UnboundedReceiver<StationEvent>,
    supplicant: FakeSupplicant,
    registry: SharedRegistry,
    dhcp: FakeDhcp,
}

fn harness() -> Harness {
    let supplicant = FakeSupplicant::default();
    let registry = SharedRegistry::default();
    let dhcp = FakeDhcp::default();
    let (station, events) = Station::new(supplicant.clone(), registry.clone(), dhcp.clone());
    Harness {
        station,
        _events: events,
        supplicant,
        registry,
        dhcp,
    }
}

fn sup(event: SupplicantEvent) -> StationEvent {
    StationEvent::Supplicant(event)
}

fn open_spec(ssid: &str) -> NetworkSpec {
    NetworkSpec {
        ssid: Some(ssid.as_bytes().to_vec()),
        ..NetworkSpec::default()
    }
}

async fn add_bss(h: &mut Harness, path: &str, ssid: &str, last_octet: u8) -> BssId {
    let id = BssId::from(path);
    let properties = BssProperties {
        ssid: Some(ssid.as_bytes().to_vec()),
        bssid: Some(vec![0, 0, 0, 0, 0, last_octet]),
        signal: Some(-55),
        mode: Some("infrastructure".into()),
        ..BssProperties::default()
    };
    h.station
        .handle_event(sup(SupplicantEvent::BssAdded {
            id: id.clone(),
            properties,
        }))
        .await;
    id
}

fn service_state(h: &Harness, id: ServiceId) -> ServiceState {
    h.station.provider().service(id).unwrap().state()
}

fn service_failure(h: &Harness, id: ServiceId) -> Option<ConnectFailure> {
    h.station.provider().service(id).unwrap().failure()
}

/// Drives a full connection: start, one visible BSS, connect, attach,
/// completed, successful address configuration.
async fn connect_to_completion(h: &mut Harness, ssid: &str) -> (ServiceId, BssId) {
    h.station.start().await.unwrap();
    let bss = add_bss(h, &format!("/bss/{ssid}"), ssid, 1).await;
    let id = h.station.get_service(&open_spec(ssid)).unwrap();
    h.station.connect(id).await.unwrap();
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss.clone()))))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(SupplicantState::Completed)))
        .await;
    h.station
        .handle_event(StationEvent::DhcpComplete {
            service: id,
            success: true,
        })
        .await;
    (id, bss)
}

#[tokio::test]
async fn start_clears_supplicant_state_and_scans() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let calls = h.supplicant.calls();
    assert_eq!(calls[0], Call::RemoveAllNetworks);
    assert_eq!(calls[1], Call::FlushBss(0));
    assert_eq!(calls[2], Call::Scan(None));
    assert!(h.station.is_started());
}

#[tokio::test]
async fn scan_probes_hidden_remembered_networks() {
    let mut h = harness();
    let mut spec = open_spec("cloaked");
    spec.hidden = true;
    let id = h.station.get_service(&spec).unwrap();
    h.station
        .provider_mut()
        .service_mut(id)
        .unwrap()
        .make_favorite();

    h.station.start().await.unwrap();
    let probe = h
        .supplicant
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::Scan(hidden) => Some(hidden),
            _ => None,
        })
        .unwrap();
    let list = probe.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0], Ssid::from("cloaked"));
    assert!(list[1].is_empty());
}

#[tokio::test]
async fn full_connection_lifecycle() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();

    h.station.connect(id).await.unwrap();
    assert_eq!(h.station.pending(), Some(id));
    assert_eq!(service_state(&h, id), ServiceState::Associating);
    let calls = h.supplicant.calls();
    assert!(calls.contains(&Call::AddNetwork(b"net".to_vec())));
    assert!(calls.iter().any(|c| matches!(c, Call::SelectNetwork(_))));

    // A second identical request is already in flight.
    assert!(matches!(h.station.connect(id).await, Err(Error::InProgress)));

    // Attaching to the target BSS is the authoritative confirmation:
    // promotion, Configuring, and address configuration all follow.
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss))))
        .await;
    assert_eq!(h.station.current(), Some(id));
    assert_eq!(h.station.pending(), None);
    assert_eq!(service_state(&h, id), ServiceState::Configuring);
    assert_eq!(h.dhcp.started(), vec![id]);

    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(SupplicantState::Completed)))
        .await;
    assert_eq!(service_state(&h, id), ServiceState::Configuring);
    assert_eq!(h.dhcp.started(), vec![id]);

    h.station
        .handle_event(StationEvent::DhcpComplete {
            service: id,
            success: true,
        })
        .await;
    assert_eq!(service_state(&h, id), ServiceState::Connected);
}

#[tokio::test]
async fn connect_rejects_missing_passphrase() {
    let mut h = harness();
    h.station.start().await.unwrap();

    let mut spec = open_spec("secured");
    spec.security = Some("rsn".into());
    let id = h.station.get_service(&spec).unwrap();
    assert!(matches!(
        h.station.connect(id).await,
        Err(Error::InvalidArguments(_))
    ));
    assert_eq!(h.station.pending(), None);
}

#[tokio::test]
async fn reconnecting_the_current_service_is_a_noop() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;
    h.supplicant.take_calls();

    h.station.connect(id).await.unwrap();
    assert!(h.supplicant.calls().is_empty());
    assert_eq!(h.station.current(), Some(id));
    assert_eq!(service_state(&h, id), ServiceState::Connected);
}

#[tokio::test]
async fn supplicant_refusal_marks_the_attempt_failed() {
    let mut h = harness();
    h.station.start().await.unwrap();
    add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();

    h.supplicant.fail_select(true);
    assert!(h.station.connect(id).await.is_err());
    assert_eq!(h.station.pending(), None);
    assert_eq!(service_state(&h, id), ServiceState::Failure);
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::Unknown));
    // The half-added network is rolled back.
    assert!(h
        .supplicant
        .calls()
        .iter()
        .any(|c| matches!(c, Call::RemoveNetwork(_))));
}

#[tokio::test]
async fn disconnect_of_an_unrelated_service_is_a_noop() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let id = h.station.get_service(&open_spec("net")).unwrap();
    h.supplicant.take_calls();

    h.station.disconnect(id).await.unwrap();
    assert!(h.supplicant.calls().is_empty());
}

#[tokio::test]
async fn local_disconnect_waits_for_detach() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    h.station.disconnect(id).await.unwrap();
    // The supplicant accepted the call; the service stays current until
    // the detach is confirmed.
    assert_eq!(h.station.current(), Some(id));
    assert!(h.supplicant.calls().contains(&Call::Disconnect));

    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(None)))
        .await;
    assert_eq!(h.station.current(), None);
    assert_eq!(service_state(&h, id), ServiceState::Idle);
    assert_eq!(service_failure(&h, id), None);
    assert_eq!(h.dhcp.stopped(), vec![id]);
}

#[tokio::test]
async fn disconnect_failure_falls_back_to_network_removal() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;
    h.supplicant.take_calls();
    h.supplicant.fail_disconnect(true);

    h.station.disconnect(id).await.unwrap();
    // No detach signal will come; the station cleans up on its own.
    assert_eq!(h.station.current(), None);
    assert!(h
        .supplicant
        .calls()
        .iter()
        .any(|c| matches!(c, Call::RemoveNetwork(_))));
}

#[tokio::test]
async fn disconnecting_replaced_current_skips_supplicant() {
    let mut h = harness();
    let (current, _bss) = connect_to_completion(&mut h, "old").await;
    add_bss(&mut h, "/bss/new", "new", 2).await;
    let next = h.station.get_service(&open_spec("new")).unwrap();
    h.station.connect(next).await.unwrap();
    h.supplicant.take_calls();

    h.station.disconnect(current).await.unwrap();
    // The supplicant is already moving to the pending network; a
    // Disconnect now would kill that attempt.
    assert!(!h.supplicant.calls().contains(&Call::Disconnect));
    assert_eq!(h.station.current(), None);
    assert_eq!(h.station.pending(), Some(next));
}

#[tokio::test]
async fn new_connect_preempts_pending_attempt() {
    let mut h = harness();
    h.station.start().await.unwrap();
    add_bss(&mut h, "/bss/a", "a", 1).await;
    add_bss(&mut h, "/bss/b", "b", 2).await;
    let a = h.station.get_service(&open_spec("a")).unwrap();
    let b = h.station.get_service(&open_spec("b")).unwrap();

    h.station.connect(a).await.unwrap();
    h.station.connect(b).await.unwrap();
    assert_eq!(h.station.pending(), Some(b));
    assert_eq!(service_state(&h, a), ServiceState::Idle);
    assert!(h.supplicant.calls().contains(&Call::Disconnect));
}

#[tokio::test]
async fn pending_timeout_fails_the_attempt() {
    let mut h = harness();
    h.station.start().await.unwrap();
    add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();
    h.station.connect(id).await.unwrap();

    // First arming of the pending timer issues epoch 1.
    h.station.handle_event(StationEvent::PendingTimeout(1)).await;
    assert_eq!(h.station.pending(), None);
    assert_eq!(service_state(&h, id), ServiceState::Failure);
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::ConnectTimeout));
}

#[tokio::test]
async fn stale_pending_timeout_is_ignored() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();
    h.station.connect(id).await.unwrap();
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss))))
        .await;

    // The attempt already reached its target; the old firing must not
    // tear down the connection.
    h.station.handle_event(StationEvent::PendingTimeout(1)).await;
    assert_eq!(h.station.current(), Some(id));
    assert_ne!(service_state(&h, id), ServiceState::Failure);
}

#[tokio::test]
async fn unexpected_detach_fails_the_current_service() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    // Losing the association with no local disconnect in flight is
    // authoritative; the service fails right away.
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(None)))
        .await;
    assert_eq!(h.station.current(), None);
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::Unknown));
    assert_eq!(h.dhcp.stopped(), vec![id]);
}

#[tokio::test]
async fn link_state_regression_arms_reconnect_then_fails() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(
            SupplicantState::Disconnected,
        )))
        .await;
    // The supplicant may reassociate on its own; the service stays current.
    assert_eq!(h.station.current(), Some(id));
    assert_eq!(service_state(&h, id), ServiceState::Connected);

    h.station
        .handle_event(StationEvent::ReconnectTimeout(1))
        .await;
    assert_eq!(h.station.current(), None);
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::OutOfRange));
}

#[tokio::test]
async fn reconnect_timer_cancelled_when_link_recovers() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(
            SupplicantState::Disconnected,
        )))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(SupplicantState::Completed)))
        .await;
    h.station
        .handle_event(StationEvent::ReconnectTimeout(1))
        .await;
    assert_eq!(h.station.current(), Some(id));
    assert_eq!(service_state(&h, id), ServiceState::Connected);
}

#[tokio::test]
async fn roam_within_the_current_network_updates_the_registry() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;
    let second = add_bss(&mut h, "/bss/2", "net", 2).await;
    let before = h.registry.updates(id);

    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(second))))
        .await;
    assert_eq!(h.station.current(), Some(id));
    assert_eq!(service_state(&h, id), ServiceState::Connected);
    assert!(h.registry.updates(id) > before);
}

#[tokio::test]
async fn drop_during_handshake_suspects_the_passphrase() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = BssId::from("/bss/1");
    let mut props = BssProperties {
        ssid: Some(b"secured".to_vec()),
        bssid: Some(vec![0, 0, 0, 0, 0, 1]),
        signal: Some(-55),
        mode: Some("infrastructure".into()),
        ..BssProperties::default()
    };
    props.rsn = Some(wifimgr::SecurityProperties {
        key_mgmt: vec!["wpa-psk".into()],
    });
    h.station
        .handle_event(sup(SupplicantEvent::BssAdded {
            id: bss.clone(),
            properties: props,
        }))
        .await;

    let mut spec = open_spec("secured");
    spec.security = Some("rsn".into());
    spec.passphrase = Some("wrong password".into());
    let id = h.station.get_service(&spec).unwrap();

    h.station.connect(id).await.unwrap();
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss))))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(
            SupplicantState::FourWayHandshake,
        )))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(None)))
        .await;
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::BadPassphrase));
    assert_eq!(h.station.current(), None);
}

#[tokio::test]
async fn drop_during_eap_suspects_the_credentials() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = BssId::from("/bss/1");
    let mut props = BssProperties {
        ssid: Some(b"corp".to_vec()),
        bssid: Some(vec![0, 0, 0, 0, 0, 1]),
        signal: Some(-55),
        mode: Some("infrastructure".into()),
        ..BssProperties::default()
    };
    props.rsn = Some(wifimgr::SecurityProperties {
        key_mgmt: vec!["wpa-eap".into()],
    });
    h.station
        .handle_event(sup(SupplicantEvent::BssAdded {
            id: bss.clone(),
            properties: props,
        }))
        .await;

    let mut spec = open_spec("corp");
    spec.security = Some("802_1x".into());
    let id = h.station.get_service(&spec).unwrap();

    h.station.connect(id).await.unwrap();
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss))))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::EapEvent {
            status: "started".into(),
            parameter: String::new(),
        }))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(None)))
        .await;
    assert_eq!(
        service_failure(&h, id),
        Some(ConnectFailure::EapAuthentication)
    );
}

#[tokio::test]
async fn rekey_does_not_regress_a_connected_service() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(
            SupplicantState::FourWayHandshake,
        )))
        .await;
    assert_eq!(service_state(&h, id), ServiceState::Connected);

    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(SupplicantState::Completed)))
        .await;
    // Address configuration does not restart on rekey.
    assert_eq!(h.dhcp.started(), vec![id]);
}

#[tokio::test]
async fn dhcp_failure_tears_the_connection_down() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();
    h.station.connect(id).await.unwrap();
    h.station
        .handle_event(sup(SupplicantEvent::CurrentBssChanged(Some(bss))))
        .await;
    h.station
        .handle_event(sup(SupplicantEvent::StateChanged(SupplicantState::Completed)))
        .await;

    h.station
        .handle_event(StationEvent::DhcpComplete {
            service: id,
            success: false,
        })
        .await;
    assert_eq!(h.station.current(), None);
    assert_eq!(service_failure(&h, id), Some(ConnectFailure::Dhcp));
    assert!(h.supplicant.calls().contains(&Call::Disconnect));
}

#[tokio::test]
async fn losing_the_last_endpoint_keeps_a_connected_service() {
    let mut h = harness();
    let (id, bss) = connect_to_completion(&mut h, "net").await;

    h.station
        .handle_event(sup(SupplicantEvent::BssRemoved { id: bss }))
        .await;
    assert!(h.station.provider().service(id).is_some());
    assert!(!h.station.provider().service(id).unwrap().is_visible());
    assert_eq!(h.station.current(), Some(id));
}

#[tokio::test]
async fn losing_the_last_endpoint_drops_an_unused_service() {
    let mut h = harness();
    h.station.start().await.unwrap();
    let bss = add_bss(&mut h, "/bss/1", "net", 1).await;
    let id = h.station.get_service(&open_spec("net")).unwrap();
    assert!(h.registry.has(id));

    h.station
        .handle_event(sup(SupplicantEvent::BssRemoved { id: bss }))
        .await;
    assert!(h.station.provider().service(id).is_none());
    assert_eq!(h.registry.deregistered(), vec![id]);
}

#[tokio::test]
async fn resume_flushes_stale_entries_and_scans_when_idle() {
    let mut h = harness();
    h.station.start().await.unwrap();
    h.supplicant.take_calls();

    h.station.resume().await.unwrap();
    let calls = h.supplicant.calls();
    assert_eq!(calls[0], Call::FlushBss(10));
    assert!(calls.contains(&Call::Scan(None)));
}

#[tokio::test]
async fn resume_does_not_scan_while_connected() {
    let mut h = harness();
    let (_id, _bss) = connect_to_completion(&mut h, "net").await;
    h.supplicant.take_calls();

    h.station.resume().await.unwrap();
    let calls = h.supplicant.calls();
    assert_eq!(calls, vec![Call::FlushBss(10)]);
}

#[tokio::test]
async fn scan_timer_fires_once_per_arming() {
    let mut h = harness();
    h.station.start().await.unwrap();
    h.supplicant.take_calls();

    // Start armed epoch 1.
    h.station.handle_event(StationEvent::ScanTimer(1)).await;
    assert_eq!(
        h.supplicant
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Scan(_)))
            .count(),
        1
    );

    // The token was consumed; a duplicate firing does nothing.
    h.station.handle_event(StationEvent::ScanTimer(1)).await;
    assert_eq!(
        h.supplicant
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Scan(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn stop_tears_everything_down() {
    let mut h = harness();
    let (id, _bss) = connect_to_completion(&mut h, "net").await;

    h.station.stop().await.unwrap();
    assert!(!h.station.is_started());
    assert!(h.station.is_idle());
    assert!(h.supplicant.calls().contains(&Call::RemoveAllNetworks));
    // The service had no reason to stay: not remembered, no endpoints.
    assert!(h.station.provider().service(id).is_none());
    assert!(matches!(
        h.station.scan().await,
        Err(Error::OperationFailed(_))
    ));
}
