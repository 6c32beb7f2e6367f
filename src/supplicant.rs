//! The seam between the management core and wpa_supplicant.
//!
//! [`Supplicant`] abstracts the D-Bus calls the core issues; the production
//! implementation lives in [`crate::proxies`], and tests substitute a fake.
//! Inbound supplicant signals are decomposed into [`SupplicantEvent`]s and
//! delivered through the station's single ordered event queue, so handler
//! code never races with itself.

use async_trait::async_trait;

use crate::Result;
use crate::endpoint::BssProperties;
use crate::models::{BssId, NetworkMode, SecurityMode, Ssid, SupplicantState};
use crate::provider::ServiceId;

/// Handle under which the supplicant knows a registered network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkHandle(String);

impl NetworkHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NetworkHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NetworkHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network parameters passed to the supplicant's `AddNetwork`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ssid: Vec<u8>,
    pub mode: NetworkMode,
    pub security: SecurityMode,
    pub passphrase: Option<String>,
    /// Request active probing for this SSID (hidden networks).
    pub scan_ssid: bool,
    /// Background-scan parameter string, e.g. `simple:30:-50:180`.
    pub bgscan: String,
}

/// Calls the management core issues against the supplicant.
#[async_trait]
pub trait Supplicant: Send + Sync {
    async fn add_network(&self, config: &NetworkConfig) -> Result<NetworkHandle>;
    async fn remove_network(&self, handle: &NetworkHandle) -> Result<()>;
    async fn remove_all_networks(&self) -> Result<()>;
    async fn select_network(&self, handle: &NetworkHandle) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;

    /// Requests a scan. `hidden_ssids`, when present, lists SSIDs to probe
    /// actively in addition to the broadcast probe.
    async fn scan(&self, hidden_ssids: Option<Vec<Ssid>>) -> Result<()>;

    /// Drops cached BSS entries older than `max_age_seconds`; zero drops
    /// everything.
    async fn flush_bss(&self, max_age_seconds: u32) -> Result<()>;
}

/// One supplicant signal, decomposed into a single state change.
///
/// A `PropertiesChanged` payload carrying both a current-BSS move and a
/// state transition is split into two events, current-BSS first.
#[derive(Debug, Clone)]
pub enum SupplicantEvent {
    BssAdded {
        id: BssId,
        properties: BssProperties,
    },
    BssRemoved {
        id: BssId,
    },
    /// The BSS the supplicant considers itself attached to changed;
    /// `None` means detached.
    CurrentBssChanged(Option<BssId>),
    StateChanged(SupplicantState),
    ScanDone {
        success: bool,
    },
    /// One certificate observed during an EAP exchange.
    Certification {
        depth: u32,
        subject: String,
    },
    EapEvent {
        status: String,
        parameter: String,
    },
}

/// Address-configuration collaborator. Completion is reported back through
/// the station event queue as a `DhcpComplete` event.
pub trait DhcpProvider: Send {
    fn start(&mut self, service: ServiceId);
    fn stop(&mut self, service: ServiceId);
}
