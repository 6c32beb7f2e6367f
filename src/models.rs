use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Errors that can occur during wireless management operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A request was missing a field or carried a malformed one.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The SSID length is outside 1-32 bytes.
    #[error("invalid network name")]
    InvalidNetworkName,

    /// The passphrase does not match the format required by the security mode.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// The requested mode or security string is not recognized.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// An equivalent connection attempt is already pending.
    #[error("operation already in progress")]
    InProgress,

    /// A supplicant call failed without a more specific classification.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// A disconnect was requested while no session exists. Benign.
    #[error("not connected")]
    NotConnected,
}

/// Connection state of a service, ordered by progress toward full
/// connectivity. `Failure` is terminal rather than part of the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Idle,
    Associating,
    Configuring,
    Connected,
    Portal,
    Online,
    Failure,
}

impl ServiceState {
    /// Progress rank used to suppress regressions driven by raw supplicant
    /// state notifications. `Idle` and `Failure` rank lowest.
    pub fn progress(self) -> u8 {
        match self {
            Self::Idle | Self::Failure => 0,
            Self::Associating => 1,
            Self::Configuring => 2,
            Self::Connected => 3,
            Self::Portal => 4,
            Self::Online => 5,
        }
    }

    /// True for states at or past link-and-address establishment.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Portal | Self::Online)
    }
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Associating => write!(f, "associating"),
            Self::Configuring => write!(f, "configuring"),
            Self::Connected => write!(f, "connected"),
            Self::Portal => write!(f, "portal"),
            Self::Online => write!(f, "online"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Reason recorded when a service enters `ServiceState::Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectFailure {
    Unknown,
    BadPassphrase,
    EapAuthentication,
    Dhcp,
    OutOfRange,
    ConnectTimeout,
}

impl Display for ConnectFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::BadPassphrase => write!(f, "bad passphrase"),
            Self::EapAuthentication => write!(f, "EAP authentication failed"),
            Self::Dhcp => write!(f, "DHCP failed"),
            Self::OutOfRange => write!(f, "out of range"),
            Self::ConnectTimeout => write!(f, "connect timed out"),
        }
    }
}

/// wpa_supplicant's own session state, as reported in its `State` property.
///
/// Tracked independently of the service state machine because supplicant
/// transitions arrive asynchronously and may be coalesced or revisit
/// earlier phases during key rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplicantState {
    Disconnected,
    Inactive,
    Scanning,
    Associating,
    Authenticating,
    Associated,
    FourWayHandshake,
    GroupHandshake,
    Completed,
    InterfaceDisabled,
    /// Initial state before the first notification arrives.
    Unknown,
    /// A state string this crate does not recognize.
    Other(String),
}

impl SupplicantState {
    pub fn parse(s: &str) -> Self {
        match s {
            "disconnected" => Self::Disconnected,
            "inactive" => Self::Inactive,
            "scanning" => Self::Scanning,
            "associating" => Self::Associating,
            "authenticating" => Self::Authenticating,
            "associated" => Self::Associated,
            "4way_handshake" => Self::FourWayHandshake,
            "group_handshake" => Self::GroupHandshake,
            "completed" => Self::Completed,
            "interface_disabled" => Self::InterfaceDisabled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Position in the forward connection sequence, or `None` for states
    /// outside it.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Disconnected | Self::Inactive => Some(0),
            Self::Scanning => Some(1),
            Self::Associating => Some(2),
            Self::Authenticating | Self::Associated => Some(3),
            Self::FourWayHandshake => Some(4),
            Self::GroupHandshake => Some(5),
            Self::Completed => Some(6),
            _ => None,
        }
    }

    /// True for the phases between starting association and completion.
    pub fn is_associating(&self) -> bool {
        matches!(
            self,
            Self::Associating
                | Self::Authenticating
                | Self::Associated
                | Self::FourWayHandshake
                | Self::GroupHandshake
        )
    }
}

impl Display for SupplicantState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Inactive => write!(f, "inactive"),
            Self::Scanning => write!(f, "scanning"),
            Self::Associating => write!(f, "associating"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Associated => write!(f, "associated"),
            Self::FourWayHandshake => write!(f, "4way_handshake"),
            Self::GroupHandshake => write!(f, "group_handshake"),
            Self::Completed => write!(f, "completed"),
            Self::InterfaceDisabled => write!(f, "interface_disabled"),
            Self::Unknown => write!(f, "unknown"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Network topology mode. AP mode is intentionally unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkMode {
    /// Infrastructure (station connected to an access point).
    Managed,
    /// IBSS / peer-to-peer.
    AdHoc,
}

impl NetworkMode {
    /// Parses the `Mode` string reported in supplicant BSS properties.
    pub fn from_supplicant(s: &str) -> Option<Self> {
        match s {
            "infrastructure" => Some(Self::Managed),
            "ad-hoc" => Some(Self::AdHoc),
            _ => None,
        }
    }

    /// Parses the mode string accepted by the selection request surface.
    pub fn from_request(s: &str) -> Option<Self> {
        match s {
            "managed" => Some(Self::Managed),
            "adhoc" | "ad-hoc" => Some(Self::AdHoc),
            _ => None,
        }
    }

    /// The mode string passed in supplicant network configuration.
    pub fn as_supplicant(self) -> &'static str {
        match self {
            Self::Managed => "infrastructure",
            Self::AdHoc => "ad-hoc",
        }
    }
}

impl Display for NetworkMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::AdHoc => write!(f, "adhoc"),
        }
    }
}

/// Security policy of an endpoint or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityMode {
    None,
    Wep,
    WpaPsk,
    RsnPsk,
    Eap8021x,
}

impl SecurityMode {
    /// Parses the security string accepted by the selection request surface.
    pub fn from_request(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "wep" => Some(Self::Wep),
            "wpa" => Some(Self::WpaPsk),
            "rsn" => Some(Self::RsnPsk),
            "802_1x" => Some(Self::Eap8021x),
            _ => None,
        }
    }

    /// Whether connecting requires a passphrase from the caller.
    pub fn requires_passphrase(self) -> bool {
        matches!(self, Self::Wep | Self::WpaPsk | Self::RsnPsk)
    }
}

impl Display for SecurityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Wep => write!(f, "wep"),
            Self::WpaPsk => write!(f, "wpa"),
            Self::RsnPsk => write!(f, "rsn"),
            Self::Eap8021x => write!(f, "802_1x"),
        }
    }
}

/// A BSSID: the 6-byte hardware identity of one access point transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bssid([u8; 6]);

impl Bssid {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    /// Parses a 6-byte slice, as delivered in BSS properties.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(octets))
    }

    /// Parses the conventional colon-separated form, e.g. `00:11:22:aa:bb:cc`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *octet = u8::from_str_radix(part, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(octets))
    }
}

impl Display for Bssid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// An SSID: a raw byte sequence of 0-32 bytes, not necessarily valid text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ssid(Vec<u8>);

impl Ssid {
    pub const MAX_LEN: usize = 32;

    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Ssid {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Ssid {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Prints the SSID with non-printable bytes replaced by `?`, so raw SSIDs
/// are always safe to log.
impl Display for Ssid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            let c = if (0x20..0x7f).contains(&b) {
                b as char
            } else {
                '?'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Opaque identifier under which the supplicant reports a BSS. Distinct
/// from the BSSID: the supplicant names BSS objects by its own paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BssId(String);

impl BssId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BssId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BssId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for BssId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
