//! Service aggregation and the network-selection surface.
//!
//! The [`ServiceProvider`] owns every [`Service`], keyed by small opaque
//! [`ServiceId`] handles so the rest of the crate never holds references
//! into the service table. Visibility changes are mirrored into a
//! [`ServiceRegistry`], the daemon-side catalog of selectable networks.

use std::collections::HashMap;

use log::debug;

use crate::Result;
use crate::endpoint::Endpoint;
use crate::models::{Bssid, Error, NetworkMode, SecurityMode, Ssid};
use crate::service::{Service, ServiceKey};

/// Opaque handle to a service owned by a [`ServiceProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u64);

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service-{}", self.0)
    }
}

/// The daemon-side catalog of selectable networks.
///
/// The provider registers a service when it first becomes usable, updates
/// it when its visible properties change, and deregisters it when it is
/// neither visible nor remembered.
pub trait ServiceRegistry {
    fn register_service(&mut self, id: ServiceId, service: &Service);
    fn update_service(&mut self, id: ServiceId, service: &Service);
    fn deregister_service(&mut self, id: ServiceId);
    fn has_service(&self, id: ServiceId) -> bool;
}

/// A caller's description of the network it wants a service for.
#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub ssid: Option<Vec<u8>>,
    /// Mode string, `managed` when absent.
    pub mode: Option<String>,
    /// Security string, `none` when absent.
    pub security: Option<String>,
    pub hidden: bool,
    pub passphrase: Option<String>,
}

/// Owner of all services; groups endpoints into them by identity key.
#[derive(Debug, Default)]
pub struct ServiceProvider {
    services: HashMap<ServiceId, Service>,
    by_key: HashMap<ServiceKey, ServiceId>,
    next_id: u64,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    pub fn service_mut(&mut self, id: ServiceId) -> Option<&mut Service> {
        self.services.get_mut(&id)
    }

    pub fn find_by_key(&self, key: &ServiceKey) -> Option<ServiceId> {
        self.by_key.get(key).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.services.keys().copied()
    }

    fn insert(&mut self, service: Service) -> ServiceId {
        self.next_id += 1;
        let id = ServiceId(self.next_id);
        self.by_key.insert(service.key().clone(), id);
        self.services.insert(id, service);
        id
    }

    /// Resolves a caller's network description to a service, creating one
    /// if no existing service matches the identity key.
    ///
    /// The created service is not registered yet; registration happens when
    /// its first endpoint appears.
    pub fn get_service(&mut self, spec: &NetworkSpec) -> Result<ServiceId> {
        let ssid_bytes = spec
            .ssid
            .as_ref()
            .ok_or_else(|| Error::InvalidArguments("must specify SSID".into()))?;
        if ssid_bytes.is_empty() || ssid_bytes.len() > Ssid::MAX_LEN {
            return Err(Error::InvalidNetworkName);
        }

        let mode = match spec.mode.as_deref() {
            None => NetworkMode::Managed,
            Some(s) => NetworkMode::from_request(s)
                .ok_or_else(|| Error::NotSupported(format!("network mode {s:?}")))?,
        };
        let security = match spec.security.as_deref() {
            None => SecurityMode::None,
            Some(s) => SecurityMode::from_request(s)
                .ok_or_else(|| Error::NotSupported(format!("security mode {s:?}")))?,
        };

        let key = ServiceKey {
            ssid: Ssid::new(ssid_bytes.clone()),
            mode,
            security,
        };
        let id = match self.by_key.get(&key) {
            Some(&id) => id,
            None => {
                debug!("creating service for {key}");
                self.insert(Service::new(key, spec.hidden))
            }
        };

        if let Some(service) = self.services.get_mut(&id) {
            if spec.hidden {
                service.set_hidden(true);
            }
            if let Some(passphrase) = &spec.passphrase {
                service.set_passphrase(passphrase)?;
            }
        }
        Ok(id)
    }

    /// Routes a newly parsed endpoint to its service, creating the service
    /// on first sight of the identity key. First visibility registers the
    /// service; later updates only refresh it.
    pub fn on_endpoint_added<R: ServiceRegistry>(
        &mut self,
        endpoint: Endpoint,
        registry: &mut R,
    ) -> ServiceId {
        let key = ServiceKey::for_endpoint(&endpoint);
        let id = match self.by_key.get(&key) {
            Some(&id) => id,
            None => {
                debug!("new service {key} from endpoint {}", endpoint.bssid());
                self.insert(Service::new(key, false))
            }
        };
        if let Some(service) = self.services.get_mut(&id) {
            let first_endpoint = !service.is_visible();
            service.add_endpoint(endpoint);
            if first_endpoint && !registry.has_service(id) {
                registry.register_service(id, service);
            } else {
                registry.update_service(id, service);
            }
        }
        id
    }

    /// Removes an endpoint from its service. A service left with no
    /// endpoints survives only if it is remembered (favorite) or in use;
    /// otherwise it is deregistered and dropped. Returns true if the
    /// service itself was removed.
    pub fn on_endpoint_removed<R: ServiceRegistry>(
        &mut self,
        id: ServiceId,
        bssid: Bssid,
        in_use: bool,
        registry: &mut R,
    ) -> bool {
        let Some(service) = self.services.get_mut(&id) else {
            return false;
        };
        if service.remove_endpoint(bssid).is_none() {
            return false;
        }
        if service.is_visible() || service.favorite() || in_use {
            registry.update_service(id, service);
            return false;
        }
        let key = service.key().clone();
        debug!("dropping service {key} with no remaining endpoints");
        registry.deregister_service(id);
        self.by_key.remove(&key);
        self.services.remove(&id);
        true
    }

    /// SSIDs to probe actively in the next scan: one entry per hidden
    /// remembered service, and a single trailing broadcast entry. `None`
    /// when no hidden service needs probing.
    pub fn hidden_probe_list(&self) -> Option<Vec<Ssid>> {
        let mut ssids: Vec<Ssid> = self
            .services
            .values()
            .filter(|s| s.hidden() && s.favorite())
            .map(|s| s.ssid().clone())
            .collect();
        if ssids.is_empty() {
            return None;
        }
        ssids.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        ssids.push(Ssid::default());
        Some(ssids)
    }
}
