//! The connection orchestrator.
//!
//! [`Station`] owns the device-side view of one wireless interface: which
//! service is connected, which attempt is in flight, and what the
//! supplicant last reported. All mutation happens through a single ordered
//! [`StationEvent`] queue, so no handler ever observes a half-applied
//! transition. Timer firings carry epoch tokens and stale firings are
//! ignored, which makes cancellation a local bookkeeping operation.

use std::collections::{BTreeMap, HashMap};

use futures_timer::Delay;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::Result;
use crate::constants::timeouts;
use crate::endpoint::{BssProperties, Endpoint};
use crate::models::{
    BssId, Bssid, ConnectFailure, Error, SecurityMode, ServiceState, SupplicantState,
};
use crate::provider::{NetworkSpec, ServiceId, ServiceProvider, ServiceRegistry};
use crate::scan::{ScanScheduler, TimerEpoch};
use crate::supplicant::{DhcpProvider, NetworkHandle, Supplicant, SupplicantEvent};

/// Everything that can wake the station. Supplicant signals, collaborator
/// completions, and timer firings all land in one queue.
#[derive(Debug)]
pub enum StationEvent {
    Supplicant(SupplicantEvent),
    DhcpComplete { service: ServiceId, success: bool },
    LinkUp,
    LinkDown,
    ScanTimer(u64),
    PendingTimeout(u64),
    ReconnectTimeout(u64),
}

/// Orchestrator for one wireless interface.
pub struct Station<S, R, D> {
    supplicant: S,
    registry: R,
    dhcp: D,
    provider: ServiceProvider,
    events: mpsc::UnboundedSender<StationEvent>,

    started: bool,
    current: Option<ServiceId>,
    pending: Option<ServiceId>,
    /// Set while a locally requested teardown of the current service waits
    /// for the supplicant to confirm the detach.
    locally_disconnecting: Option<ServiceId>,

    supplicant_state: SupplicantState,
    supplicant_bss: Option<BssId>,
    handles: HashMap<ServiceId, NetworkHandle>,
    /// Supplicant BSS identifier to (hardware address, owning service).
    endpoints: HashMap<BssId, (Bssid, ServiceId)>,

    eap_in_progress: bool,
    certifications: BTreeMap<u32, String>,

    scan_scheduler: ScanScheduler,
    pending_timer: TimerEpoch,
    reconnect_timer: TimerEpoch,
    seen: u64,
}

impl<S, R, D> Station<S, R, D>
where
    S: Supplicant,
    R: ServiceRegistry,
    D: DhcpProvider,
{
    /// Builds a station and the receiving end of its event queue. The
    /// caller drives the queue, usually via [`Station::run`].
    pub fn new(
        supplicant: S,
        registry: R,
        dhcp: D,
    ) -> (Self, mpsc::UnboundedReceiver<StationEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let station = Self {
            supplicant,
            registry,
            dhcp,
            provider: ServiceProvider::new(),
            events,
            started: false,
            current: None,
            pending: None,
            locally_disconnecting: None,
            supplicant_state: SupplicantState::Unknown,
            supplicant_bss: None,
            handles: HashMap::new(),
            endpoints: HashMap::new(),
            eap_in_progress: false,
            certifications: BTreeMap::new(),
            scan_scheduler: ScanScheduler::new(),
            pending_timer: TimerEpoch::default(),
            reconnect_timer: TimerEpoch::default(),
            seen: 0,
        };
        (station, rx)
    }

    /// A sender for injecting events, used by the signal pump and by
    /// collaborators reporting completions.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<StationEvent> {
        self.events.clone()
    }

    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut ServiceProvider {
        &mut self.provider
    }

    pub fn current(&self) -> Option<ServiceId> {
        self.current
    }

    pub fn pending(&self) -> Option<ServiceId> {
        self.pending
    }

    pub fn current_bss(&self) -> Option<&BssId> {
        self.supplicant_bss.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True when no service is connected and no attempt is in flight.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_none()
    }

    /// Certificates observed during the current EAP exchange, innermost
    /// first.
    pub fn certifications(&self) -> impl Iterator<Item = (u32, &str)> {
        self.certifications.iter().map(|(d, s)| (*d, s.as_str()))
    }

    /// Resolves a caller's network description to a service handle.
    pub fn get_service(&mut self, spec: &NetworkSpec) -> Result<ServiceId> {
        self.provider.get_service(spec)
    }

    /// Brings the interface up: clears any networks and cached BSS entries
    /// left over in the supplicant, then starts the quick-scan burst.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            debug!("already started");
            return Ok(());
        }
        self.supplicant.remove_all_networks().await?;
        self.supplicant.flush_bss(0).await?;
        self.started = true;
        self.scan_scheduler.restart_fast();
        self.request_scan().await;
        info!("station started");
        Ok(())
    }

    /// Tears the interface down: disconnects, drops all supplicant state,
    /// and forgets every observed endpoint.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.scan_scheduler.cancel();
        self.clear_pending(ServiceState::Idle).await;
        if self.current.is_some() {
            if let Err(e) = self.supplicant.disconnect().await {
                warn!("disconnect during stop failed: {e}");
            }
            self.clear_current(ServiceState::Idle).await;
        }
        if let Err(e) = self.supplicant.remove_all_networks().await {
            warn!("failed to clear supplicant networks: {e}");
        }
        self.handles.clear();
        let observed: Vec<(Bssid, ServiceId)> = self.endpoints.drain().map(|(_, v)| v).collect();
        for (bssid, sid) in observed {
            self.provider
                .on_endpoint_removed(sid, bssid, false, &mut self.registry);
        }
        self.supplicant_state = SupplicantState::Unknown;
        self.supplicant_bss = None;
        info!("station stopped");
        Ok(())
    }

    /// Requests an immediate scan, resetting the periodic schedule.
    pub async fn scan(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::OperationFailed("interface is not started".into()));
        }
        self.request_scan().await;
        Ok(())
    }

    /// Handles a system resume: cached BSS entries are stale beyond a
    /// bounded age, and an idle station should look around immediately.
    pub async fn resume(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.supplicant
            .flush_bss(timeouts::MAX_BSS_RESUME_AGE_SECONDS)
            .await?;
        self.scan_scheduler.restart_fast();
        if self.is_idle() {
            self.request_scan().await;
        }
        Ok(())
    }

    /// Starts a connection attempt to a service. Only one attempt runs at
    /// a time; an earlier pending attempt is torn down first. The current
    /// service, if any, stays up until the supplicant actually moves.
    pub async fn connect(&mut self, id: ServiceId) -> Result<()> {
        if !self.started {
            return Err(Error::OperationFailed("interface is not started".into()));
        }
        if self.pending == Some(id) {
            return Err(Error::InProgress);
        }
        if self.current == Some(id) {
            debug!("{id} is already connected");
            return Ok(());
        }
        let config = {
            let service = self
                .provider
                .service(id)
                .ok_or_else(|| Error::InvalidArguments("no such service".into()))?;
            if service.security().requires_passphrase() && !service.has_passphrase() {
                return Err(Error::InvalidArguments("must specify passphrase".into()));
            }
            service.supplicant_config()
        };

        if self.pending.is_some() {
            info!("abandoning earlier attempt in favor of {id}");
            self.clear_pending(ServiceState::Idle).await;
            if let Err(e) = self.supplicant.disconnect().await {
                warn!("disconnect before new attempt failed: {e}");
            }
        }

        let handle = match self.supplicant.add_network(&config).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail_service(id, ConnectFailure::Unknown);
                return Err(e);
            }
        };
        if let Err(e) = self.supplicant.select_network(&handle).await {
            let _ = self.supplicant.remove_network(&handle).await;
            self.fail_service(id, ConnectFailure::Unknown);
            return Err(e);
        }
        self.handles.insert(id, handle);
        self.certifications.clear();
        self.eap_in_progress = false;
        self.pending = Some(id);
        self.arm_pending_timer();
        self.set_service_state(id, ServiceState::Associating);
        info!("connecting to {id}");
        Ok(())
    }

    /// Disconnects a service this station is connected or connecting to.
    /// Disconnecting any other service is a no-op.
    pub async fn disconnect(&mut self, id: ServiceId) -> Result<()> {
        if self.pending != Some(id) && self.current != Some(id) {
            debug!("{id} is neither current nor pending; nothing to disconnect");
            return Ok(());
        }
        self.disconnect_from(id).await;
        Ok(())
    }

    async fn disconnect_from(&mut self, id: ServiceId) {
        if self.pending == Some(id) {
            self.clear_pending(ServiceState::Idle).await;
            if let Err(e) = self.supplicant.disconnect().await {
                warn!("supplicant disconnect failed: {e}");
            }
            return;
        }
        if self.current != Some(id) {
            return;
        }
        if self.pending.is_some() {
            // The supplicant is already on its way to the pending network;
            // a Disconnect now would kill that attempt.
            self.clear_current(ServiceState::Idle).await;
            return;
        }
        self.locally_disconnecting = Some(id);
        if let Err(e) = self.supplicant.disconnect().await {
            warn!("supplicant disconnect failed: {e}; dropping the network instead");
            self.locally_disconnecting = None;
            self.clear_current(ServiceState::Idle).await;
        }
        // On success the detach is confirmed by a current-BSS change.
    }

    /// Drives the event queue until all senders are gone.
    pub async fn run(&mut self, events: &mut mpsc::UnboundedReceiver<StationEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: StationEvent) {
        match event {
            StationEvent::Supplicant(ev) => self.handle_supplicant_event(ev).await,
            StationEvent::DhcpComplete { service, success } => {
                self.handle_dhcp_complete(service, success).await;
            }
            StationEvent::LinkUp => debug!("link is up"),
            StationEvent::LinkDown => self.handle_link_down(),
            StationEvent::ScanTimer(epoch) => {
                if self.scan_scheduler.accept(epoch) {
                    self.request_scan().await;
                }
            }
            StationEvent::PendingTimeout(epoch) => {
                if self.pending_timer.accept(epoch) {
                    self.handle_pending_timeout().await;
                }
            }
            StationEvent::ReconnectTimeout(epoch) => {
                if self.reconnect_timer.accept(epoch) {
                    self.handle_reconnect_timeout().await;
                }
            }
        }
    }

    async fn handle_supplicant_event(&mut self, event: SupplicantEvent) {
        match event {
            SupplicantEvent::BssAdded { id, properties } => self.handle_bss_added(id, properties),
            SupplicantEvent::BssRemoved { id } => self.handle_bss_removed(id).await,
            SupplicantEvent::CurrentBssChanged(bss) => self.handle_current_bss(bss).await,
            SupplicantEvent::StateChanged(state) => self.handle_supplicant_state(state),
            SupplicantEvent::ScanDone { success } => {
                debug!("scan done (success: {success})");
            }
            SupplicantEvent::Certification { depth, subject } => {
                info!("certificate at depth {depth}: {subject}");
                self.certifications.insert(depth, subject);
            }
            SupplicantEvent::EapEvent { status, parameter } => {
                self.handle_eap_event(&status, &parameter);
            }
        }
    }

    fn handle_bss_added(&mut self, id: BssId, properties: BssProperties) {
        self.seen += 1;
        let endpoint = match Endpoint::from_properties(&properties, self.seen) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!("ignoring BSS {id}: {e}");
                return;
            }
        };
        let bssid = endpoint.bssid();
        let sid = self.provider.on_endpoint_added(endpoint, &mut self.registry);
        self.endpoints.insert(id, (bssid, sid));
        // Results are arriving; the quick-scan burst has done its job.
        self.scan_scheduler.end_fast();
    }

    async fn handle_bss_removed(&mut self, id: BssId) {
        let Some((bssid, sid)) = self.endpoints.remove(&id) else {
            return;
        };
        let in_use = self.current == Some(sid) || self.pending == Some(sid);
        let dropped = self
            .provider
            .on_endpoint_removed(sid, bssid, in_use, &mut self.registry);
        if dropped {
            if let Some(handle) = self.handles.remove(&sid) {
                if let Err(e) = self.supplicant.remove_network(&handle).await {
                    warn!("failed to remove network {handle}: {e}");
                }
            }
        }
    }

    async fn handle_current_bss(&mut self, bss: Option<BssId>) {
        debug!(
            "current BSS is now {}",
            bss.as_ref().map_or("(none)", BssId::as_str)
        );
        self.supplicant_bss = bss.clone();
        match bss {
            Some(id) => self.handle_bss_attached(id).await,
            None => self.handle_bss_detached().await,
        }
    }

    async fn handle_bss_attached(&mut self, id: BssId) {
        self.reconnect_timer.cancel();
        let Some(&(bssid, sid)) = self.endpoints.get(&id) else {
            warn!("supplicant attached to unknown BSS {id}");
            return;
        };
        if self.pending == Some(sid) {
            // The attempt reached its target.
            self.pending = None;
            self.pending_timer.cancel();
            if self.current != Some(sid) {
                self.clear_current(ServiceState::Idle).await;
                self.current = Some(sid);
            }
            debug!("{sid} is now current at {bssid}");
            self.begin_configuring(sid);
        } else if self.current == Some(sid) {
            // Intra-network roam; the connection is unaffected but the
            // registry entry reflects the new endpoint.
            debug!("roamed within {sid} to {bssid}");
            if let Some(service) = self.provider.service(sid) {
                self.registry.update_service(sid, service);
            }
        } else {
            // Unsolicited move; accept it with the same promotion.
            info!("supplicant moved to {sid} at {bssid} on its own");
            self.clear_current(ServiceState::Idle).await;
            self.current = Some(sid);
            self.begin_configuring(sid);
        }
    }

    /// The link is confirmed; hand the service to address configuration.
    fn begin_configuring(&mut self, id: ServiceId) {
        self.advance_service_state(id, ServiceState::Configuring);
        if self
            .provider
            .service(id)
            .is_some_and(|s| s.state() == ServiceState::Configuring)
        {
            self.dhcp.start(id);
        }
    }

    async fn handle_bss_detached(&mut self) {
        if let Some(id) = self.current {
            if self.locally_disconnecting == Some(id) {
                // The teardown we asked for has completed.
                self.clear_current(ServiceState::Idle).await;
                return;
            }
            if self.pending.is_some() {
                // Detached from the old network while a new attempt runs.
                self.clear_current(ServiceState::Idle).await;
                return;
            }
            // Detaching is authoritative; classify and tear down now.
            let failure = self
                .suspect_credentials(id)
                .unwrap_or(ConnectFailure::Unknown);
            warn!("supplicant detached from {id}: {failure}");
            self.fail_service(id, failure);
            self.clear_current(ServiceState::Idle).await;
            return;
        }
        if let Some(id) = self.pending {
            if let Some(failure) = self.suspect_credentials(id) {
                warn!("attempt to {id} failed: {failure}");
                self.fail_service(id, failure);
                self.clear_pending(ServiceState::Idle).await;
                if let Err(e) = self.supplicant.disconnect().await {
                    warn!("disconnect after failed attempt also failed: {e}");
                }
            } else {
                debug!("detached mid-attempt; the supplicant will retry");
            }
        }
    }

    /// Classifies an attempt that died at the supplicant. A drop during
    /// the 4-way handshake on a PSK network points at the passphrase; a
    /// drop with an EAP exchange open points at the credentials.
    fn suspect_credentials(&self, id: ServiceId) -> Option<ConnectFailure> {
        let service = self.provider.service(id)?;
        match service.security() {
            SecurityMode::WpaPsk | SecurityMode::RsnPsk
                if self.supplicant_state == SupplicantState::FourWayHandshake =>
            {
                Some(ConnectFailure::BadPassphrase)
            }
            SecurityMode::Eap8021x if self.eap_in_progress => {
                Some(ConnectFailure::EapAuthentication)
            }
            _ => None,
        }
    }

    fn handle_supplicant_state(&mut self, state: SupplicantState) {
        let old = std::mem::replace(&mut self.supplicant_state, state.clone());
        debug!("supplicant state {old} -> {state}");
        let Some(sid) = self.pending.or(self.current) else {
            return;
        };
        match &state {
            SupplicantState::Completed => {
                // Link is up; move on to address configuration. Revisits
                // during key rotation change only the raw state.
                let advanced = self.advance_service_state(sid, ServiceState::Configuring);
                if advanced && self.current == Some(sid) {
                    self.dhcp.start(sid);
                }
                self.reconnect_timer.cancel();
            }
            s if s.is_associating() => {
                self.advance_service_state(sid, ServiceState::Associating);
            }
            SupplicantState::Disconnected => {
                if self.current == Some(sid)
                    && self.locally_disconnecting.is_none()
                    && self
                        .provider
                        .service(sid)
                        .is_some_and(|s| s.state().is_connected())
                {
                    self.arm_reconnect_timer();
                }
            }
            _ => {}
        }
    }

    async fn handle_dhcp_complete(&mut self, service: ServiceId, success: bool) {
        if self.current != Some(service) {
            debug!("stale address-configuration result for {service}");
            return;
        }
        if success {
            info!("{service} acquired an address");
            self.reconnect_timer.cancel();
            self.advance_service_state(service, ServiceState::Connected);
        } else {
            warn!("{service} failed address configuration");
            self.fail_service(service, ConnectFailure::Dhcp);
            if let Err(e) = self.supplicant.disconnect().await {
                warn!("disconnect after address failure also failed: {e}");
            }
            self.clear_current(ServiceState::Idle).await;
        }
    }

    fn handle_link_down(&mut self) {
        let Some(id) = self.current else {
            return;
        };
        if self.locally_disconnecting.is_none()
            && self
                .provider
                .service(id)
                .is_some_and(|s| s.state().is_connected())
        {
            warn!("link went down under {id}");
            self.arm_reconnect_timer();
        }
    }

    async fn handle_pending_timeout(&mut self) {
        let Some(id) = self.pending else {
            return;
        };
        warn!("attempt to {id} timed out");
        self.fail_service(id, ConnectFailure::ConnectTimeout);
        self.clear_pending(ServiceState::Idle).await;
        if let Err(e) = self.supplicant.disconnect().await {
            warn!("disconnect after timeout failed: {e}");
        }
    }

    async fn handle_reconnect_timeout(&mut self) {
        let Some(id) = self.current else {
            return;
        };
        warn!("gave up waiting for the supplicant to reattach to {id}");
        self.fail_service(id, ConnectFailure::OutOfRange);
        if let Err(e) = self.supplicant.disconnect().await {
            warn!("disconnect after reconnect timeout failed: {e}");
        }
        self.clear_current(ServiceState::Idle).await;
    }

    fn handle_eap_event(&mut self, status: &str, parameter: &str) {
        match (status, parameter) {
            ("started", _) => {
                info!("EAP authentication starting");
                self.eap_in_progress = true;
            }
            ("completion", "success") => {
                info!("EAP authentication succeeded");
                self.eap_in_progress = false;
            }
            ("completion", "failure") => {
                // Keep the exchange marked open so the detach that follows
                // is classified as a credential failure.
                warn!("EAP authentication failed");
            }
            _ => debug!("EAP event {status}/{parameter}"),
        }
    }

    async fn request_scan(&mut self) {
        if !self.started {
            return;
        }
        if self.is_idle() {
            let hidden = self.provider.hidden_probe_list();
            if let Err(e) = self.supplicant.scan(hidden).await {
                warn!("scan request failed: {e}");
            }
        } else {
            debug!("deferring scan while a service is active");
        }
        self.arm_scan_timer();
    }

    fn arm_scan_timer(&mut self) {
        let (epoch, interval) = self.scan_scheduler.arm();
        let tx = self.events.clone();
        tokio::spawn(async move {
            Delay::new(interval).await;
            let _ = tx.send(StationEvent::ScanTimer(epoch));
        });
    }

    fn arm_pending_timer(&mut self) {
        let epoch = self.pending_timer.arm();
        let tx = self.events.clone();
        tokio::spawn(async move {
            Delay::new(timeouts::pending_timeout()).await;
            let _ = tx.send(StationEvent::PendingTimeout(epoch));
        });
    }

    fn arm_reconnect_timer(&mut self) {
        if self.reconnect_timer.is_armed() {
            return;
        }
        let epoch = self.reconnect_timer.arm();
        let tx = self.events.clone();
        tokio::spawn(async move {
            Delay::new(timeouts::reconnect_timeout()).await;
            let _ = tx.send(StationEvent::ReconnectTimeout(epoch));
        });
    }

    /// Drops the pending attempt and its supplicant network. The service
    /// keeps a failure state if one was just recorded.
    async fn clear_pending(&mut self, state: ServiceState) {
        let Some(id) = self.pending.take() else {
            return;
        };
        self.pending_timer.cancel();
        if let Some(handle) = self.handles.remove(&id) {
            if let Err(e) = self.supplicant.remove_network(&handle).await {
                warn!("failed to remove network {handle}: {e}");
            }
        }
        self.set_service_state_keeping_failure(id, state);
    }

    /// Drops the current service and its supplicant network, stopping
    /// address configuration and the reconnect timer.
    async fn clear_current(&mut self, state: ServiceState) {
        let Some(id) = self.current.take() else {
            return;
        };
        self.reconnect_timer.cancel();
        if self.locally_disconnecting == Some(id) {
            self.locally_disconnecting = None;
        }
        self.dhcp.stop(id);
        if let Some(handle) = self.handles.remove(&id) {
            if let Err(e) = self.supplicant.remove_network(&handle).await {
                warn!("failed to remove network {handle}: {e}");
            }
        }
        self.set_service_state_keeping_failure(id, state);
        if self.started {
            self.scan_scheduler.restart_fast();
        }
    }

    fn set_service_state(&mut self, id: ServiceId, state: ServiceState) {
        if let Some(service) = self.provider.service_mut(id) {
            service.set_state(state);
            self.registry.update_service(id, service);
        }
    }

    fn set_service_state_keeping_failure(&mut self, id: ServiceId, state: ServiceState) {
        if let Some(service) = self.provider.service_mut(id) {
            if service.state() != ServiceState::Failure {
                service.set_state(state);
            }
            self.registry.update_service(id, service);
        }
    }

    /// Moves a service forward in the connection sequence. Transitions
    /// that would regress are ignored; returns whether the state changed.
    fn advance_service_state(&mut self, id: ServiceId, target: ServiceState) -> bool {
        if let Some(service) = self.provider.service_mut(id) {
            if service.state().progress() < target.progress() {
                service.set_state(target);
                self.registry.update_service(id, service);
                return true;
            }
        }
        false
    }

    fn fail_service(&mut self, id: ServiceId, failure: ConnectFailure) {
        if let Some(service) = self.provider.service_mut(id) {
            service.set_failure(failure);
            self.registry.update_service(id, service);
        }
    }
}
