//! Logical network services.
//!
//! A [`Service`] represents one logical network (ESS): every endpoint
//! sharing the same (SSID, mode, security) identity aggregates into one
//! service. The service owns its endpoint set and its own connection-state
//! machine; the station decides when states change.

use std::collections::HashMap;

use crate::Result;
use crate::constants::{bgscan, ieee80211};
use crate::endpoint::Endpoint;
use crate::models::{Bssid, ConnectFailure, Error, NetworkMode, SecurityMode, ServiceState, Ssid};
use crate::supplicant::NetworkConfig;

/// Identity key of a service: endpoints matching on all three fields
/// aggregate into the same service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub ssid: Ssid,
    pub mode: NetworkMode,
    pub security: SecurityMode,
}

impl ServiceKey {
    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self {
            ssid: endpoint.ssid().clone(),
            mode: endpoint.mode(),
            security: endpoint.security(),
        }
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}/{})", self.ssid, self.mode, self.security)
    }
}

/// One logical network and its connection-state machine.
#[derive(Debug)]
pub struct Service {
    key: ServiceKey,
    endpoints: HashMap<Bssid, Endpoint>,
    hidden: bool,
    favorite: bool,
    state: ServiceState,
    failure: Option<ConnectFailure>,
    passphrase: Option<String>,
}

impl Service {
    pub fn new(key: ServiceKey, hidden: bool) -> Self {
        Self {
            key,
            endpoints: HashMap::new(),
            hidden,
            favorite: false,
            state: ServiceState::Idle,
            failure: None,
            passphrase: None,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn ssid(&self) -> &Ssid {
        &self.key.ssid
    }

    pub fn mode(&self) -> NetworkMode {
        self.key.mode
    }

    pub fn security(&self) -> SecurityMode {
        self.key.security
    }

    /// A service is visible iff it currently has at least one endpoint.
    pub fn is_visible(&self) -> bool {
        !self.endpoints.is_empty()
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Inserts or wholesale-replaces the record for the endpoint's BSSID.
    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.bssid(), endpoint);
    }

    pub fn remove_endpoint(&mut self, bssid: Bssid) -> Option<Endpoint> {
        self.endpoints.remove(&bssid)
    }

    pub fn has_endpoint(&self, bssid: Bssid) -> bool {
        self.endpoints.contains_key(&bssid)
    }

    pub fn endpoint(&self, bssid: Bssid) -> Option<&Endpoint> {
        self.endpoints.get(&bssid)
    }

    /// The representative endpoint: strongest signal, ties broken by BSSID
    /// ordering so the choice is deterministic.
    pub fn best_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints
            .values()
            .max_by_key(|ep| (ep.signal_dbm(), std::cmp::Reverse(ep.bssid())))
    }

    /// Display signal strength, taken from the representative endpoint.
    pub fn signal_dbm(&self) -> Option<i16> {
        self.best_endpoint().map(Endpoint::signal_dbm)
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn set_state(&mut self, state: ServiceState) {
        if state != ServiceState::Failure {
            self.failure = None;
        }
        self.state = state;
    }

    /// Marks the service failed with a recorded reason.
    pub fn set_failure(&mut self, failure: ConnectFailure) {
        self.failure = Some(failure);
        self.state = ServiceState::Failure;
    }

    pub fn failure(&self) -> Option<ConnectFailure> {
        self.failure
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn favorite(&self) -> bool {
        self.favorite
    }

    pub fn make_favorite(&mut self) {
        self.favorite = true;
    }

    pub fn clear_favorite(&mut self) {
        self.favorite = false;
    }

    /// Validates and stores a passphrase for later connection attempts.
    pub fn set_passphrase(&mut self, passphrase: &str) -> Result<()> {
        validate_passphrase(self.key.security, passphrase)?;
        self.passphrase = Some(passphrase.to_string());
        Ok(())
    }

    pub fn has_passphrase(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Builds the network configuration handed to the supplicant's
    /// `AddNetwork`. Hidden services request active SSID probing, and
    /// every network carries a background-scan parameter string.
    pub fn supplicant_config(&self) -> NetworkConfig {
        NetworkConfig {
            ssid: self.key.ssid.as_bytes().to_vec(),
            mode: self.key.mode,
            security: self.key.security,
            passphrase: self.passphrase.clone(),
            scan_ssid: self.hidden,
            bgscan: format!(
                "{}:{}:{}:{}",
                bgscan::METHOD,
                bgscan::SHORT_INTERVAL_SECONDS,
                bgscan::SIGNAL_THRESHOLD_DBM,
                bgscan::LONG_INTERVAL_SECONDS
            ),
        }
    }
}

/// Validates a passphrase against the format rules of a security mode.
///
/// Open and 802.1x networks accept no passphrase requirements here; WEP and
/// WPA/RSN enforce the IEEE 802.11 key grammars.
pub fn validate_passphrase(security: SecurityMode, passphrase: &str) -> Result<()> {
    match security {
        SecurityMode::Wep => validate_wep_key(passphrase),
        SecurityMode::WpaPsk | SecurityMode::RsnPsk => validate_wpa_passphrase(passphrase),
        SecurityMode::None | SecurityMode::Eap8021x => Ok(()),
    }
}

/// Strips a `N:` key-index prefix (N in 0-3), if present.
fn strip_key_index(key: &str) -> Option<&str> {
    let bytes = key.as_bytes();
    if bytes.len() >= 2 && (b'0'..=b'3').contains(&bytes[0]) && bytes[1] == b':' {
        Some(&key[2..])
    } else {
        None
    }
}

fn strip_hex_base(key: &str) -> Option<&str> {
    key.strip_prefix("0x").or_else(|| key.strip_prefix("0X"))
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// WEP key grammar: a 5/13-character ASCII key or a 10/26-digit hex key,
/// optionally preceded by a `N:` key index and (for hex) a `0x` base
/// marker. Dispatch is by total length, so ASCII keys that happen to
/// contain `:` are still accepted.
fn validate_wep_key(key: &str) -> Result<()> {
    let valid = match key.len() {
        ieee80211::WEP40_ASCII_LEN | ieee80211::WEP104_ASCII_LEN => true,
        ieee80211::WEP40_HEX_LEN | ieee80211::WEP104_HEX_LEN => is_hex(key),
        // "N:" + ASCII key.
        7 | 15 => strip_key_index(key).is_some(),
        // "0x" + hex key, or "N:" + hex key.
        12 | 28 => match strip_hex_base(key).or_else(|| strip_key_index(key)) {
            Some(rest) => is_hex(rest),
            None => false,
        },
        // "N:0x" + hex key.
        14 | 30 => match strip_key_index(key).and_then(strip_hex_base) {
            Some(rest) => is_hex(rest),
            None => false,
        },
        _ => false,
    };
    if valid { Ok(()) } else { Err(Error::InvalidPassphrase) }
}

/// Splits a validated WEP key into its key index and the material handed
/// to the supplicant: ASCII keys quoted, hex keys raw.
pub(crate) fn wep_key_material(key: &str) -> (u8, String) {
    let (index, rest) = match key.len() {
        7 | 14 | 15 | 30 => match strip_key_index(key) {
            Some(rest) => (key.as_bytes()[0] - b'0', rest),
            None => (0, key),
        },
        12 | 28 if strip_hex_base(key).is_none() => match strip_key_index(key) {
            Some(rest) => (key.as_bytes()[0] - b'0', rest),
            None => (0, key),
        },
        _ => (0, key),
    };
    let rest = strip_hex_base(rest).unwrap_or(rest);
    match rest.len() {
        ieee80211::WEP40_ASCII_LEN | ieee80211::WEP104_ASCII_LEN => (index, format!("\"{rest}\"")),
        _ => (index, rest.to_string()),
    }
}

/// WPA passphrase grammar: 8-63 ASCII characters, or exactly 64 hex digits
/// naming the raw pre-shared key.
fn validate_wpa_passphrase(passphrase: &str) -> Result<()> {
    let len = passphrase.len();
    let valid = if len == ieee80211::WPA_HEX_LEN {
        is_hex(passphrase)
    } else {
        (ieee80211::WPA_ASCII_MIN_LEN..=ieee80211::WPA_ASCII_MAX_LEN).contains(&len)
    };
    if valid { Ok(()) } else { Err(Error::InvalidPassphrase) }
}
