//! Wireless network management core built on wpa_supplicant's D-Bus API.
//!
//! This crate implements the station side of a connection-manager daemon:
//!
//! - Parsing scan results (BSSes) into endpoint records
//! - Grouping endpoints into logical services by SSID, mode, and security
//! - Driving the supplicant connection protocol with an explicit state
//!   machine for current and pending services
//! - Scheduling scans, bounding connection attempts, and classifying
//!   failures (bad passphrase, EAP, address configuration, link loss)
//!
//! # Example
//!
//! ```no_run
//! use wifimgr::{DbusSupplicant, NetworkSpec, Station, StationEvent, pump_signals};
//! # use wifimgr::{DhcpProvider, Service, ServiceId, ServiceRegistry};
//! # struct Registry;
//! # impl ServiceRegistry for Registry {
//! #     fn register_service(&mut self, _: ServiceId, _: &Service) {}
//! #     fn update_service(&mut self, _: ServiceId, _: &Service) {}
//! #     fn deregister_service(&mut self, _: ServiceId) {}
//! #     fn has_service(&self, _: ServiceId) -> bool { false }
//! # }
//! # struct Dhcp;
//! # impl DhcpProvider for Dhcp {
//! #     fn start(&mut self, _: ServiceId) {}
//! #     fn stop(&mut self, _: ServiceId) {}
//! # }
//!
//! # async fn example() -> wifimgr::Result<()> {
//! let connection = zbus::Connection::system().await?;
//! let supplicant = DbusSupplicant::connect(&connection, "wlan0").await?;
//! let pump_proxy = supplicant.proxy().clone();
//!
//! let (mut station, mut events) = Station::new(supplicant, Registry, Dhcp);
//! tokio::spawn(pump_signals(pump_proxy, station.event_sender()));
//!
//! station.start().await?;
//! let id = station.get_service(&NetworkSpec {
//!     ssid: Some(b"MyNetwork".to_vec()),
//!     security: Some("rsn".into()),
//!     passphrase: Some("password123".into()),
//!     ..NetworkSpec::default()
//! })?;
//! station.connect(id).await?;
//! station.run(&mut events).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Event ordering
//!
//! Everything that can change connection state arrives through one ordered
//! queue: supplicant signals, collaborator completions, and timer firings.
//! Timers are cancelled by epoch bookkeeping rather than by killing tasks,
//! so a firing that lost a race with cancellation is simply ignored.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. Add a logging
//! implementation like `env_logger` to see output.

pub mod constants;
pub mod endpoint;
pub mod models;
pub mod provider;
pub mod proxies;
pub mod scan;
pub mod service;
pub mod station;
pub mod supplicant;

pub use endpoint::{BssProperties, Endpoint, SecurityProperties};
pub use models::{
    BssId, Bssid, ConnectFailure, Error, NetworkMode, SecurityMode, ServiceState, Ssid,
    SupplicantState,
};
pub use provider::{NetworkSpec, ServiceId, ServiceProvider, ServiceRegistry};
pub use proxies::{DbusSupplicant, pump_signals};
pub use scan::ScanScheduler;
pub use service::{Service, ServiceKey, validate_passphrase};
pub use station::{Station, StationEvent};
pub use supplicant::{
    DhcpProvider, NetworkConfig, NetworkHandle, Supplicant, SupplicantEvent,
};

/// A specialized `Result` type for wireless management operations.
pub type Result<T> = std::result::Result<T, Error>;
