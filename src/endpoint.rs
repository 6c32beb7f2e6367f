//! Endpoint records and the BSS property parser.
//!
//! The supplicant reports each visible access point (BSS) as a property
//! bag. This module resolves that bag into an immutable [`Endpoint`]
//! snapshot, including the security-policy precedence rules. A bag with a
//! missing BSSID or SSID is a parse failure for that single update; the
//! caller drops the update with a logged diagnostic.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::models::{Bssid, Error, NetworkMode, SecurityMode, Ssid};

/// Key-management advertisement from an RSN or WPA information element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityProperties {
    /// Key management method names, e.g. `wpa-psk`, `wpa-eap`.
    pub key_mgmt: Vec<String>,
}

impl SecurityProperties {
    fn advertises_eap(&self) -> bool {
        self.key_mgmt.iter().any(|m| m.ends_with("eap"))
    }

    fn advertises_psk(&self) -> bool {
        self.key_mgmt.iter().any(|m| m.ends_with("psk"))
    }
}

/// Raw discovery properties for one BSS, as decoded from the supplicant's
/// `BSSAdded` signal payload.
#[derive(Debug, Clone, Default)]
pub struct BssProperties {
    pub ssid: Option<Vec<u8>>,
    pub bssid: Option<Vec<u8>>,
    /// Observed signal strength in dBm.
    pub signal: Option<i16>,
    pub mode: Option<String>,
    /// The WEP privacy capability bit.
    pub privacy: bool,
    pub rsn: Option<SecurityProperties>,
    pub wpa: Option<SecurityProperties>,
}

/// Immutable snapshot of one observed access point.
///
/// Never mutated field-by-field: when the supplicant re-reports a BSSID,
/// the owning service replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    ssid: Ssid,
    bssid: Bssid,
    signal_dbm: i16,
    mode: NetworkMode,
    security: SecurityMode,
    /// Sequence marker of the update that produced this record.
    seen: u64,
}

impl Endpoint {
    /// Resolves raw BSS properties into an endpoint record.
    ///
    /// Security precedence, evaluated once per update:
    /// 1. RSN or WPA advertises an 802.1x method -> `Eap8021x`
    /// 2. RSN advertises PSK -> `RsnPsk`
    /// 3. WPA advertises PSK -> `WpaPsk`
    /// 4. privacy bit set -> `Wep`
    /// 5. otherwise -> `None`
    pub fn from_properties(props: &BssProperties, seen: u64) -> Result<Self> {
        let ssid_bytes = props
            .ssid
            .as_ref()
            .ok_or_else(|| Error::InvalidArguments("BSS properties missing SSID".into()))?;
        if ssid_bytes.len() > Ssid::MAX_LEN {
            return Err(Error::InvalidArguments(format!(
                "SSID of {} bytes exceeds maximum",
                ssid_bytes.len()
            )));
        }

        let bssid_bytes = props
            .bssid
            .as_ref()
            .ok_or_else(|| Error::InvalidArguments("BSS properties missing BSSID".into()))?;
        let bssid = Bssid::from_bytes(bssid_bytes).ok_or_else(|| {
            Error::InvalidArguments(format!("BSSID of {} bytes is malformed", bssid_bytes.len()))
        })?;

        let mode_str = props
            .mode
            .as_deref()
            .ok_or_else(|| Error::InvalidArguments("BSS properties missing Mode".into()))?;
        let mode = NetworkMode::from_supplicant(mode_str)
            .ok_or_else(|| Error::NotSupported(format!("network mode {mode_str:?}")))?;

        Ok(Self {
            ssid: Ssid::new(ssid_bytes.clone()),
            bssid,
            signal_dbm: props.signal.unwrap_or(0),
            mode,
            security: Self::resolve_security(props),
            seen,
        })
    }

    fn resolve_security(props: &BssProperties) -> SecurityMode {
        let rsn = props.rsn.as_ref();
        let wpa = props.wpa.as_ref();
        if rsn.is_some_and(SecurityProperties::advertises_eap)
            || wpa.is_some_and(SecurityProperties::advertises_eap)
        {
            SecurityMode::Eap8021x
        } else if rsn.is_some_and(SecurityProperties::advertises_psk) {
            SecurityMode::RsnPsk
        } else if wpa.is_some_and(SecurityProperties::advertises_psk) {
            SecurityMode::WpaPsk
        } else if props.privacy {
            SecurityMode::Wep
        } else {
            SecurityMode::None
        }
    }

    pub fn ssid(&self) -> &Ssid {
        &self.ssid
    }

    pub fn bssid(&self) -> Bssid {
        self.bssid
    }

    pub fn signal_dbm(&self) -> i16 {
        self.signal_dbm
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    pub fn security(&self) -> SecurityMode {
        self.security
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}
