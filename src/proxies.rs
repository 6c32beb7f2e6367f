//! D-Bus proxy traits for wpa_supplicant and the adapter built on them.
//!
//! The `zbus::proxy` macro generates proxy implementations that handle
//! D-Bus communication automatically. [`DbusSupplicant`] wraps the
//! interface proxy behind the [`Supplicant`] trait, and [`pump_signals`]
//! converts the supplicant's signal streams into ordered station events.
//!
//! # wpa_supplicant D-Bus structure
//!
//! - `/fi/w1/wpa_supplicant1` - Root object (interface management)
//! - `/fi/w1/wpa_supplicant1/Interfaces/*` - One object per managed NIC
//! - `/fi/w1/wpa_supplicant1/Interfaces/*/BSSs/*` - Observed BSS objects
//! - `/fi/w1/wpa_supplicant1/Interfaces/*/Networks/*` - Configured networks

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;
use zbus::{Connection, proxy};
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::Result;
use crate::endpoint::{BssProperties, SecurityProperties};
use crate::models::{BssId, NetworkMode, SecurityMode, Ssid, SupplicantState};
use crate::service::wep_key_material;
use crate::station::StationEvent;
use crate::supplicant::{NetworkConfig, NetworkHandle, Supplicant, SupplicantEvent};

/// Proxy for the wpa_supplicant root object.
#[proxy(
    interface = "fi.w1.wpa_supplicant1",
    default_service = "fi.w1.wpa_supplicant1",
    default_path = "/fi/w1/wpa_supplicant1"
)]
pub trait Supplicant1 {
    /// Returns the object path of the interface managing a NIC.
    fn get_interface(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    /// Asks the supplicant to take over a NIC.
    fn create_interface(
        &self,
        args: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;
}

/// Proxy for one managed interface.
#[proxy(
    interface = "fi.w1.wpa_supplicant1.Interface",
    default_service = "fi.w1.wpa_supplicant1"
)]
pub trait SupplicantInterface {
    /// Registers a network and returns its object path.
    fn add_network(&self, args: HashMap<&str, Value<'_>>) -> zbus::Result<OwnedObjectPath>;

    fn remove_network(&self, network: OwnedObjectPath) -> zbus::Result<()>;

    fn remove_all_networks(&self) -> zbus::Result<()>;

    /// Marks a registered network as the one to associate with.
    fn select_network(&self, network: OwnedObjectPath) -> zbus::Result<()>;

    fn disconnect(&self) -> zbus::Result<()>;

    fn scan(&self, args: HashMap<&str, Value<'_>>) -> zbus::Result<()>;

    /// Drops cached BSS entries older than `age` seconds (0 drops all).
    #[zbus(name = "FlushBSS")]
    fn flush_bss(&self, age: u32) -> zbus::Result<()>;

    /// Session state string, e.g. "scanning" or "completed".
    #[zbus(property)]
    fn state(&self) -> zbus::Result<String>;

    /// Path of the attached BSS ("/" when detached).
    #[zbus(property, name = "CurrentBSS")]
    fn current_bss(&self) -> zbus::Result<OwnedObjectPath>;

    /// Signal emitted when a BSS becomes visible.
    #[zbus(signal, name = "BSSAdded")]
    fn bss_added(&self, path: OwnedObjectPath, properties: HashMap<String, OwnedValue>);

    /// Signal emitted when a BSS ages out.
    #[zbus(signal, name = "BSSRemoved")]
    fn bss_removed(&self, path: OwnedObjectPath);

    /// Signal emitted when a scan finishes.
    #[zbus(signal)]
    fn scan_done(&self, success: bool);

    /// Signal carrying changed interface properties, notably `State` and
    /// `CurrentBSS`.
    #[zbus(signal)]
    fn properties_changed(&self, properties: HashMap<String, OwnedValue>);

    /// Signal emitted per certificate during an EAP exchange.
    #[zbus(signal)]
    fn certification(&self, properties: HashMap<String, OwnedValue>);

    /// Signal reporting EAP state machine progress.
    #[zbus(signal, name = "EAP")]
    fn eap(&self, status: String, parameter: String);
}

/// [`Supplicant`] implementation backed by the real D-Bus service.
pub struct DbusSupplicant {
    proxy: SupplicantInterfaceProxy<'static>,
}

impl DbusSupplicant {
    /// Binds to the supplicant object managing `interface_name`.
    pub async fn connect(connection: &Connection, interface_name: &str) -> Result<Self> {
        let root = Supplicant1Proxy::new(connection).await?;
        let path = root.get_interface(interface_name).await?;
        debug!("supplicant manages {interface_name} at {path}");
        let proxy = SupplicantInterfaceProxy::builder(connection)
            .path(path)?
            .build()
            .await?;
        Ok(Self { proxy })
    }

    pub fn proxy(&self) -> &SupplicantInterfaceProxy<'static> {
        &self.proxy
    }
}

#[async_trait]
impl Supplicant for DbusSupplicant {
    async fn add_network(&self, config: &NetworkConfig) -> Result<NetworkHandle> {
        let path = self.proxy.add_network(network_args(config)).await?;
        Ok(NetworkHandle::from(path.to_string()))
    }

    async fn remove_network(&self, handle: &NetworkHandle) -> Result<()> {
        let path = OwnedObjectPath::try_from(handle.as_str().to_string())
            .map_err(zbus::Error::from)?;
        self.proxy.remove_network(path).await?;
        Ok(())
    }

    async fn remove_all_networks(&self) -> Result<()> {
        self.proxy.remove_all_networks().await?;
        Ok(())
    }

    async fn select_network(&self, handle: &NetworkHandle) -> Result<()> {
        let path = OwnedObjectPath::try_from(handle.as_str().to_string())
            .map_err(zbus::Error::from)?;
        self.proxy.select_network(path).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.proxy.disconnect().await?;
        Ok(())
    }

    async fn scan(&self, hidden_ssids: Option<Vec<Ssid>>) -> Result<()> {
        self.proxy.scan(scan_args(hidden_ssids.as_deref())).await?;
        Ok(())
    }

    async fn flush_bss(&self, max_age_seconds: u32) -> Result<()> {
        self.proxy.flush_bss(max_age_seconds).await?;
        Ok(())
    }
}

/// Builds the `AddNetwork` argument dictionary for a network config.
fn network_args(config: &NetworkConfig) -> HashMap<&'static str, Value<'static>> {
    let mut args: HashMap<&'static str, Value<'static>> = HashMap::new();
    args.insert("ssid", Value::from(config.ssid.clone()));
    args.insert(
        "mode",
        Value::from(match config.mode {
            NetworkMode::Managed => 0u32,
            NetworkMode::AdHoc => 1u32,
        }),
    );
    args.insert("scan_ssid", Value::from(u32::from(config.scan_ssid)));
    args.insert("bgscan", Value::from(config.bgscan.clone()));
    match config.security {
        SecurityMode::None => {
            args.insert("key_mgmt", Value::from("NONE"));
        }
        SecurityMode::Wep => {
            args.insert("key_mgmt", Value::from("NONE"));
            args.insert("auth_alg", Value::from("OPEN SHARED"));
            if let Some(key) = &config.passphrase {
                let (index, material) = wep_key_material(key);
                let field = match index {
                    0 => "wep_key0",
                    1 => "wep_key1",
                    2 => "wep_key2",
                    _ => "wep_key3",
                };
                args.insert("wep_tx_keyidx", Value::from(u32::from(index)));
                args.insert(field, Value::from(material));
            }
        }
        SecurityMode::WpaPsk | SecurityMode::RsnPsk => {
            args.insert("key_mgmt", Value::from("WPA-PSK"));
            args.insert(
                "proto",
                Value::from(if config.security == SecurityMode::RsnPsk {
                    "RSN"
                } else {
                    "WPA"
                }),
            );
            if let Some(passphrase) = &config.passphrase {
                args.insert("psk", Value::from(passphrase.clone()));
            }
        }
        SecurityMode::Eap8021x => {
            args.insert("key_mgmt", Value::from("WPA-EAP"));
        }
    }
    args
}

/// Builds the `Scan` argument dictionary. The SSIDs entry is present only
/// when hidden networks need active probing.
fn scan_args(hidden_ssids: Option<&[Ssid]>) -> HashMap<&'static str, Value<'static>> {
    let mut args: HashMap<&'static str, Value<'static>> = HashMap::new();
    args.insert("Type", Value::from("active"));
    if let Some(ssids) = hidden_ssids {
        let list: Vec<Vec<u8>> = ssids.iter().map(|s| s.as_bytes().to_vec()).collect();
        args.insert("SSIDs", Value::from(list));
    }
    args
}

fn take<T: TryFrom<OwnedValue>>(dict: &mut HashMap<String, OwnedValue>, key: &str) -> Option<T> {
    dict.remove(key).and_then(|v| T::try_from(v).ok())
}

/// Decodes the property dictionary of a `BSSAdded` signal.
pub(crate) fn decode_bss_properties(mut dict: HashMap<String, OwnedValue>) -> BssProperties {
    BssProperties {
        ssid: take(&mut dict, "SSID"),
        bssid: take(&mut dict, "BSSID"),
        signal: take(&mut dict, "Signal"),
        mode: take(&mut dict, "Mode"),
        privacy: take(&mut dict, "Privacy").unwrap_or(false),
        rsn: take(&mut dict, "RSN").map(decode_security),
        wpa: take(&mut dict, "WPA").map(decode_security),
    }
}

fn decode_security(mut dict: HashMap<String, OwnedValue>) -> SecurityProperties {
    SecurityProperties {
        key_mgmt: take(&mut dict, "KeyMgmt").unwrap_or_default(),
    }
}

fn bss_path_to_id(path: &OwnedObjectPath) -> Option<BssId> {
    // The supplicant reports "/" for no BSS.
    if path.as_str() == "/" {
        None
    } else {
        Some(BssId::from(path.as_str()))
    }
}

/// Forwards supplicant signals into the station event queue until either
/// side goes away.
///
/// A `PropertiesChanged` payload carrying both `CurrentBSS` and `State` is
/// split into two events with the BSS change first, so state handlers
/// always observe the BSS the state refers to.
pub async fn pump_signals(
    proxy: SupplicantInterfaceProxy<'static>,
    events: mpsc::UnboundedSender<StationEvent>,
) -> Result<()> {
    let mut bss_added = proxy.receive_bss_added().await?;
    let mut bss_removed = proxy.receive_bss_removed().await?;
    let mut scan_done = proxy.receive_scan_done().await?;
    let mut properties_changed = proxy.receive_properties_changed().await?;
    let mut certification = proxy.receive_certification().await?;
    let mut eap = proxy.receive_eap().await?;

    let send = |event: SupplicantEvent| events.send(StationEvent::Supplicant(event)).is_ok();

    loop {
        let alive = tokio::select! {
            Some(signal) = bss_added.next() => {
                let args = signal.args()?;
                match bss_path_to_id(&args.path) {
                    Some(id) => send(SupplicantEvent::BssAdded {
                        id,
                        properties: decode_bss_properties(args.properties),
                    }),
                    None => true,
                }
            }
            Some(signal) = bss_removed.next() => {
                let args = signal.args()?;
                match bss_path_to_id(&args.path) {
                    Some(id) => send(SupplicantEvent::BssRemoved { id }),
                    None => true,
                }
            }
            Some(signal) = scan_done.next() => {
                let args = signal.args()?;
                send(SupplicantEvent::ScanDone { success: args.success })
            }
            Some(signal) = properties_changed.next() => {
                let mut props = signal.args()?.properties;
                let mut alive = true;
                if let Some(path) = take::<OwnedObjectPath>(&mut props, "CurrentBSS") {
                    alive = send(SupplicantEvent::CurrentBssChanged(bss_path_to_id(&path)));
                }
                if let Some(state) = take::<String>(&mut props, "State") {
                    alive &= send(SupplicantEvent::StateChanged(SupplicantState::parse(&state)));
                }
                alive
            }
            Some(signal) = certification.next() => {
                let mut props = signal.args()?.properties;
                let depth: u32 = take(&mut props, "depth").unwrap_or(0);
                match take::<String>(&mut props, "subject") {
                    Some(subject) => send(SupplicantEvent::Certification { depth, subject }),
                    None => true,
                }
            }
            Some(signal) = eap.next() => {
                let args = signal.args()?;
                send(SupplicantEvent::EapEvent {
                    status: args.status,
                    parameter: args.parameter,
                })
            }
            else => break,
        };
        if !alive {
            debug!("station event queue closed; stopping signal pump");
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(security: SecurityMode, passphrase: Option<&str>) -> NetworkConfig {
        NetworkConfig {
            ssid: b"net".to_vec(),
            mode: NetworkMode::Managed,
            security,
            passphrase: passphrase.map(str::to_string),
            scan_ssid: false,
            bgscan: "simple:30:-50:180".into(),
        }
    }

    fn as_str<'a>(args: &'a HashMap<&str, Value<'_>>, key: &str) -> Option<&'a str> {
        match args.get(key) {
            Some(Value::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[test]
    fn open_network_args() {
        let args = network_args(&config(SecurityMode::None, None));
        assert_eq!(as_str(&args, "key_mgmt"), Some("NONE"));
        assert_eq!(as_str(&args, "bgscan"), Some("simple:30:-50:180"));
        assert_eq!(args.get("mode"), Some(&Value::from(0u32)));
        assert_eq!(args.get("scan_ssid"), Some(&Value::from(0u32)));
        assert!(!args.contains_key("psk"));
    }

    #[test]
    fn rsn_network_args_carry_proto_and_psk() {
        let args = network_args(&config(SecurityMode::RsnPsk, Some("secure password")));
        assert_eq!(as_str(&args, "key_mgmt"), Some("WPA-PSK"));
        assert_eq!(as_str(&args, "proto"), Some("RSN"));
        assert_eq!(as_str(&args, "psk"), Some("secure password"));
    }

    #[test]
    fn wep_network_args_place_key_by_index() {
        let args = network_args(&config(SecurityMode::Wep, Some("2:abcde")));
        assert_eq!(as_str(&args, "key_mgmt"), Some("NONE"));
        assert_eq!(args.get("wep_tx_keyidx"), Some(&Value::from(2u32)));
        assert_eq!(as_str(&args, "wep_key2"), Some("\"abcde\""));
    }

    #[test]
    fn hidden_service_sets_scan_ssid() {
        let mut hidden = config(SecurityMode::None, None);
        hidden.scan_ssid = true;
        let args = network_args(&hidden);
        assert_eq!(args.get("scan_ssid"), Some(&Value::from(1u32)));
    }

    #[test]
    fn scan_args_include_ssids_only_when_probing() {
        let plain = scan_args(None);
        assert_eq!(as_str(&plain, "Type"), Some("active"));
        assert!(!plain.contains_key("SSIDs"));

        let probing = scan_args(Some(&[Ssid::from("cloaked"), Ssid::default()]));
        assert!(probing.contains_key("SSIDs"));
    }

    #[test]
    fn decodes_bss_property_dictionary() {
        let mut security: HashMap<String, Value<'_>> = HashMap::new();
        security.insert("KeyMgmt".into(), Value::from(vec!["wpa-psk".to_string()]));

        let mut dict: HashMap<String, OwnedValue> = HashMap::new();
        dict.insert(
            "SSID".into(),
            OwnedValue::try_from(Value::from(b"net".to_vec())).unwrap(),
        );
        dict.insert(
            "BSSID".into(),
            OwnedValue::try_from(Value::from(vec![0u8, 1, 2, 3, 4, 5])).unwrap(),
        );
        dict.insert(
            "Signal".into(),
            OwnedValue::try_from(Value::from(-55i16)).unwrap(),
        );
        dict.insert(
            "Mode".into(),
            OwnedValue::try_from(Value::from("infrastructure")).unwrap(),
        );
        dict.insert(
            "Privacy".into(),
            OwnedValue::try_from(Value::from(true)).unwrap(),
        );
        dict.insert(
            "RSN".into(),
            OwnedValue::try_from(Value::from(security)).unwrap(),
        );

        let props = decode_bss_properties(dict);
        assert_eq!(props.ssid.as_deref(), Some(b"net".as_slice()));
        assert_eq!(props.bssid.as_deref(), Some([0u8, 1, 2, 3, 4, 5].as_slice()));
        assert_eq!(props.signal, Some(-55));
        assert_eq!(props.mode.as_deref(), Some("infrastructure"));
        assert!(props.privacy);
        assert_eq!(
            props.rsn,
            Some(SecurityProperties {
                key_mgmt: vec!["wpa-psk".into()],
            })
        );
        assert_eq!(props.wpa, None);
    }
}
